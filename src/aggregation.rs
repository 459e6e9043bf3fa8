use polars::prelude::*;
use tracing::debug;

use crate::error::{ReportError, Result};
use crate::schema::{enriched, hourly, require_columns, transfer, utilization as util_cols};

/// Mean transfer duration for one hour of the day.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyAverage {
    pub hour: i32,
    pub avg_duration: f64,
}

/// Share of the fleet that moved at least once.
#[derive(Debug, Clone, PartialEq)]
pub struct UtilizationSummary {
    pub used_entities: usize,
    pub total_entities: u32,
    pub utilization_pct: f64,
}

/// Mean duration for one (date, hour, vehicle, flow type) combination.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    pub date: String,
    pub hour: i32,
    pub entity_id: String,
    pub flow_type: String,
    pub avg_duration: f64,
}

/// Day-level figures fed into the weekly report.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub avg_duration: Option<f64>,
    pub utilization_pct: f64,
    pub transfer_count: u64,
}

/// Columns the cross-tabulation groups on, in output order.
pub const PIVOT_KEYS: [&str; 4] = [
    enriched::DATE,
    enriched::HOUR,
    transfer::OHT_ID,
    enriched::TYPE,
];

/// Round half-to-even at two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Average `EXECUTE PERIOD` per observed hour, ascending. Hours without
/// transfers are absent rather than zero.
pub fn hourly_average(frame: &DataFrame) -> Result<Vec<HourlyAverage>> {
    require_columns(frame, &[enriched::HOUR, transfer::EXECUTE_PERIOD])?;

    let grouped = frame
        .clone()
        .lazy()
        .select([
            col(enriched::HOUR).cast(DataType::Int32),
            col(transfer::EXECUTE_PERIOD).cast(DataType::Float64),
        ])
        .filter(col(enriched::HOUR).is_not_null())
        .group_by([col(enriched::HOUR)])
        .agg([col(transfer::EXECUTE_PERIOD)
            .mean()
            .alias(hourly::AVG_EXECUTE_PERIOD)])
        .sort([enriched::HOUR], SortMultipleOptions::default())
        .collect()?;

    let hours = grouped.column(enriched::HOUR)?.i32()?;
    let means = grouped.column(hourly::AVG_EXECUTE_PERIOD)?.f64()?;

    let rows: Vec<HourlyAverage> = hours
        .into_iter()
        .zip(means.into_iter())
        .filter_map(|(h, m)| match (h, m) {
            (Some(hour), Some(avg_duration)) => Some(HourlyAverage { hour, avg_duration }),
            _ => None,
        })
        .collect();
    debug!(hours = rows.len(), "computed hourly averages");
    Ok(rows)
}

/// Distinct vehicles seen today against the configured fleet size.
pub fn utilization(frame: &DataFrame, total_entities: u32) -> Result<UtilizationSummary> {
    if total_entities == 0 {
        return Err(ReportError::Config(
            "fleet size must be greater than zero".to_string(),
        ));
    }
    require_columns(frame, &[transfer::OHT_ID])?;

    let used_entities = frame
        .column(transfer::OHT_ID)?
        .as_materialized_series()
        .drop_nulls()
        .n_unique()?;
    let utilization_pct = round2(used_entities as f64 / total_entities as f64 * 100.0);

    Ok(UtilizationSummary {
        used_entities,
        total_entities,
        utilization_pct,
    })
}

/// Mean duration cross-tabulated by date, hour, vehicle and flow type.
pub fn pivot(frame: &DataFrame) -> Result<Vec<PivotRow>> {
    let mut required: Vec<&str> = PIVOT_KEYS.to_vec();
    required.push(transfer::EXECUTE_PERIOD);
    require_columns(frame, &required)?;

    let not_null = PIVOT_KEYS
        .iter()
        .map(|k| col(*k).is_not_null())
        .reduce(|acc, e| acc.and(e))
        .unwrap_or_else(|| lit(true));

    let grouped = frame
        .clone()
        .lazy()
        .select([
            col(enriched::DATE).cast(DataType::String),
            col(enriched::HOUR).cast(DataType::Int32),
            col(transfer::OHT_ID).cast(DataType::String),
            col(enriched::TYPE).cast(DataType::String),
            col(transfer::EXECUTE_PERIOD).cast(DataType::Float64),
        ])
        .filter(not_null)
        .group_by(PIVOT_KEYS.iter().map(|k| col(*k)).collect::<Vec<_>>())
        .agg([col(transfer::EXECUTE_PERIOD).mean()])
        .sort(PIVOT_KEYS, SortMultipleOptions::default())
        .collect()?;

    let dates = grouped.column(enriched::DATE)?.str()?;
    let hours = grouped.column(enriched::HOUR)?.i32()?;
    let ids = grouped.column(transfer::OHT_ID)?.str()?;
    let types = grouped.column(enriched::TYPE)?.str()?;
    let means = grouped.column(transfer::EXECUTE_PERIOD)?.f64()?;

    let mut rows = Vec::with_capacity(grouped.height());
    for i in 0..grouped.height() {
        if let (Some(date), Some(hour), Some(id), Some(ty), Some(mean)) = (
            dates.get(i),
            hours.get(i),
            ids.get(i),
            types.get(i),
            means.get(i),
        ) {
            rows.push(PivotRow {
                date: date.to_string(),
                hour,
                entity_id: id.to_string(),
                flow_type: ty.to_string(),
                avg_duration: mean,
            });
        }
    }
    debug!(groups = rows.len(), "computed pivot source");
    Ok(rows)
}

/// Collapse the filtered day into the figures the weekly report tracks.
pub fn daily_summary(frame: &DataFrame, utilization: &UtilizationSummary) -> Result<DailySummary> {
    require_columns(frame, &[transfer::EXECUTE_PERIOD])?;
    let durations = frame
        .column(transfer::EXECUTE_PERIOD)?
        .cast(&DataType::Float64)?;
    let avg_duration = durations.f64()?.mean();

    Ok(DailySummary {
        avg_duration,
        utilization_pct: utilization.utilization_pct,
        transfer_count: frame.height() as u64,
    })
}

// ── Sheet materialization ───────────────────────────────────────────────────

pub fn hourly_frame(rows: &[HourlyAverage]) -> Result<DataFrame> {
    let hours: Vec<i32> = rows.iter().map(|r| r.hour).collect();
    let means: Vec<f64> = rows.iter().map(|r| r.avg_duration).collect();
    let df = DataFrame::new(vec![
        Series::new(hourly::HOUR.into(), hours).into(),
        Series::new(hourly::AVG_EXECUTE_PERIOD.into(), means).into(),
    ])?;
    Ok(df)
}

pub fn utilization_frame(summary: &UtilizationSummary) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new(util_cols::USED_OHTS.into(), [summary.used_entities as u64]).into(),
        Series::new(util_cols::TOTAL_OHTS.into(), [summary.total_entities]).into(),
        Series::new(util_cols::UTILIZATION_PCT.into(), [summary.utilization_pct]).into(),
    ])?;
    Ok(df)
}

pub fn pivot_frame(rows: &[PivotRow]) -> Result<DataFrame> {
    let dates: Vec<&str> = rows.iter().map(|r| r.date.as_str()).collect();
    let hours: Vec<i32> = rows.iter().map(|r| r.hour).collect();
    let ids: Vec<&str> = rows.iter().map(|r| r.entity_id.as_str()).collect();
    let types: Vec<&str> = rows.iter().map(|r| r.flow_type.as_str()).collect();
    let means: Vec<f64> = rows.iter().map(|r| r.avg_duration).collect();
    let df = DataFrame::new(vec![
        Series::new(enriched::DATE.into(), dates).into(),
        Series::new(enriched::HOUR.into(), hours).into(),
        Series::new(transfer::OHT_ID.into(), ids).into(),
        Series::new(enriched::TYPE.into(), types).into(),
        Series::new(transfer::EXECUTE_PERIOD.into(), means).into(),
    ])?;
    Ok(df)
}
