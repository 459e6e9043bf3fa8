use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{info, warn};

use crate::aggregation::DailySummary;
use crate::error::Result;
use crate::schema::{require_columns, weekly};

/// Date key of a weekly data row. Dates that fail to parse are kept
/// verbatim and sort after every real date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDate {
    Day(NaiveDate),
    Unparsed(String),
}

impl ReportDate {
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"] {
            if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
                return ReportDate::Day(d);
            }
        }
        for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
                return ReportDate::Day(ts.date());
            }
        }
        ReportDate::Unparsed(raw.to_string())
    }

    pub fn day(&self) -> Option<NaiveDate> {
        match self {
            ReportDate::Day(d) => Some(*d),
            ReportDate::Unparsed(_) => None,
        }
    }

    fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ReportDate::Day(a), ReportDate::Day(b)) => a.cmp(b),
            (ReportDate::Day(_), ReportDate::Unparsed(_)) => Ordering::Less,
            (ReportDate::Unparsed(_), ReportDate::Day(_)) => Ordering::Greater,
            (ReportDate::Unparsed(_), ReportDate::Unparsed(_)) => Ordering::Equal,
        }
    }
}

impl fmt::Display for ReportDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportDate::Day(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            ReportDate::Unparsed(raw) => f.write_str(raw),
        }
    }
}

/// One day of the rolling report.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyRow {
    pub date: ReportDate,
    pub avg_duration: Option<f64>,
    /// Percentage text such as `"72.46%"`.
    pub utilization: Option<String>,
    pub failure: Option<String>,
    pub transfer_count: Option<i64>,
}

/// Trailing aggregate over every data row.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklySummary {
    pub avg_duration: Option<f64>,
    pub utilization: Option<String>,
    pub failure: Option<String>,
    pub transfer_count: i64,
}

/// Rolling report: data rows in date order followed by the summary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeeklyReport {
    pub rows: Vec<WeeklyRow>,
    pub summary: Option<WeeklySummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Inserted(WeeklyReport),
    /// The day was already in the report; nothing changed.
    AlreadyPresent(WeeklyReport),
}

impl MergeOutcome {
    pub fn report(&self) -> &WeeklyReport {
        match self {
            MergeOutcome::Inserted(r) | MergeOutcome::AlreadyPresent(r) => r,
        }
    }

    pub fn into_report(self) -> WeeklyReport {
        match self {
            MergeOutcome::Inserted(r) | MergeOutcome::AlreadyPresent(r) => r,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, MergeOutcome::Inserted(_))
    }
}

pub fn format_pct(value: f64, decimals: usize) -> String {
    format!("{value:.decimals$}%")
}

/// Numeric value of a percentage string; `None` if it does not parse.
pub fn parse_pct(text: &str) -> Option<f64> {
    let s = text.trim();
    let s = s.strip_suffix('%').unwrap_or(s).trim();
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Recompute the trailing aggregate from the data rows.
pub fn summarize(rows: &[WeeklyRow]) -> WeeklySummary {
    let avg_duration = mean(
        rows.iter()
            .filter_map(|r| r.avg_duration)
            .filter(|v| v.is_finite()),
    );
    let utilization = mean(
        rows.iter()
            .filter_map(|r| r.utilization.as_deref().and_then(parse_pct)),
    )
    .map(|v| format_pct(v, 2));
    let failure = mean(
        rows.iter()
            .filter_map(|r| r.failure.as_deref().and_then(parse_pct)),
    )
    .map(|v| format_pct(v, 5));
    let transfer_count = rows.iter().map(|r| r.transfer_count.unwrap_or(0)).sum();

    WeeklySummary {
        avg_duration,
        utilization,
        failure,
        transfer_count,
    }
}

/// Insert `day` into the report unless it is already there.
pub fn upsert(report: WeeklyReport, day: NaiveDate, today: &DailySummary) -> MergeOutcome {
    if report.rows.iter().any(|r| r.date.day() == Some(day)) {
        info!(%day, "weekly report already has this date; skipping");
        return MergeOutcome::AlreadyPresent(report);
    }

    let mut rows = report.rows;
    rows.push(WeeklyRow {
        date: ReportDate::Day(day),
        avg_duration: today.avg_duration,
        utilization: Some(format_pct(today.utilization_pct, 2)),
        failure: None,
        transfer_count: Some(today.transfer_count as i64),
    });
    rows.sort_by(|a, b| a.date.sort_cmp(&b.date));

    let summary = summarize(&rows);
    info!(%day, days = rows.len(), "weekly report updated");
    MergeOutcome::Inserted(WeeklyReport {
        rows,
        summary: Some(summary),
    })
}

impl WeeklyReport {
    /// Read the persisted sheet. The row whose date cell is the summary
    /// marker becomes `summary`; unreadable numbers become absent values.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        require_columns(df, &[weekly::DATE])?;

        let dates = text_cells(df, weekly::DATE)?;
        let avgs = text_cells(df, weekly::AVG_EXECUTE_PERIOD)?;
        let utils = text_cells(df, weekly::UTILIZATION)?;
        let failures = text_cells(df, weekly::FAILURE)?;
        let counts = text_cells(df, weekly::TRANSFER_COUNT)?;

        let mut report = WeeklyReport::default();
        for i in 0..df.height() {
            let raw_date = dates[i].clone().unwrap_or_default();
            let avg_duration = avgs[i].as_deref().and_then(|s| parse_number(s, "average"));
            let utilization = utils[i].clone();
            let failure = failures[i].clone();
            let transfer_count = counts[i]
                .as_deref()
                .and_then(|s| parse_number(s, "transfer count"))
                .map(|v| v.round() as i64);

            if raw_date.trim() == weekly::SUMMARY_MARKER {
                report.summary = Some(WeeklySummary {
                    avg_duration,
                    utilization,
                    failure,
                    transfer_count: transfer_count.unwrap_or(0),
                });
                continue;
            }
            report.rows.push(WeeklyRow {
                date: ReportDate::parse(&raw_date),
                avg_duration,
                utilization,
                failure,
                transfer_count,
            });
        }
        Ok(report)
    }

    /// Tabular form: data rows, then the summary row last.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let n = self.rows.len() + usize::from(self.summary.is_some());
        let mut dates: Vec<String> = Vec::with_capacity(n);
        let mut avgs: Vec<Option<f64>> = Vec::with_capacity(n);
        let mut utils: Vec<Option<String>> = Vec::with_capacity(n);
        let mut failures: Vec<Option<String>> = Vec::with_capacity(n);
        let mut counts: Vec<Option<i64>> = Vec::with_capacity(n);

        for row in &self.rows {
            dates.push(row.date.to_string());
            avgs.push(row.avg_duration);
            utils.push(row.utilization.clone());
            failures.push(row.failure.clone());
            counts.push(row.transfer_count);
        }
        if let Some(summary) = &self.summary {
            dates.push(weekly::SUMMARY_MARKER.to_string());
            avgs.push(summary.avg_duration);
            utils.push(summary.utilization.clone());
            failures.push(summary.failure.clone());
            counts.push(Some(summary.transfer_count));
        }

        let df = DataFrame::new(vec![
            Series::new(weekly::DATE.into(), dates).into(),
            Series::new(weekly::AVG_EXECUTE_PERIOD.into(), avgs).into(),
            Series::new(weekly::UTILIZATION.into(), utils).into(),
            Series::new(weekly::FAILURE.into(), failures).into(),
            Series::new(weekly::TRANSFER_COUNT.into(), counts).into(),
        ])?;
        Ok(df)
    }
}

/// Cells of an optional column as trimmed text; empty cells become `None`.
fn text_cells(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let Ok(column) = df.column(name) else {
        return Ok(vec![None; df.height()]);
    };
    let casted = column.cast(&DataType::String)?;
    let cells = casted
        .str()?
        .into_iter()
        .map(|v| {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .collect();
    Ok(cells)
}

fn parse_number(text: &str, what: &str) -> Option<f64> {
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            warn!(value = text, "ignoring unreadable weekly {what}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(date: &str, avg: f64, util: &str, count: i64) -> WeeklyRow {
        WeeklyRow {
            date: ReportDate::parse(date),
            avg_duration: Some(avg),
            utilization: Some(util.to_string()),
            failure: None,
            transfer_count: Some(count),
        }
    }

    fn today(avg: f64, util: f64, count: u64) -> DailySummary {
        DailySummary {
            avg_duration: Some(avg),
            utilization_pct: util,
            transfer_count: count,
        }
    }

    #[test]
    fn first_insert_into_empty_report() {
        let out = upsert(WeeklyReport::default(), day("2024-01-01"), &today(30.0, 50.0, 10));
        assert!(out.is_inserted());
        let report = out.into_report();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].utilization.as_deref(), Some("50.00%"));
        assert_eq!(report.rows[0].failure, None);
        assert_eq!(
            report.summary,
            Some(WeeklySummary {
                avg_duration: Some(30.0),
                utilization: Some("50.00%".into()),
                failure: None,
                transfer_count: 10,
            })
        );
        assert_eq!(report.to_frame().unwrap().height(), 2);
    }

    #[test]
    fn second_upsert_of_same_day_is_noop() {
        let once = upsert(WeeklyReport::default(), day("2024-01-01"), &today(30.0, 50.0, 10))
            .into_report();
        let twice = upsert(once.clone(), day("2024-01-01"), &today(99.0, 1.0, 1));
        assert!(!twice.is_inserted());
        assert_eq!(twice.into_report(), once);
    }

    #[test]
    fn rolling_utilization_is_mean_of_rows() {
        let report = WeeklyReport {
            rows: vec![
                row("2024-01-01", 10.0, "10.00%", 1),
                row("2024-01-02", 20.0, "20.00%", 2),
            ],
            summary: None,
        };
        let out = upsert(report, day("2024-01-03"), &today(30.0, 30.0, 3)).into_report();
        let summary = out.summary.unwrap();
        assert_eq!(summary.utilization.as_deref(), Some("20.00%"));
        assert_eq!(summary.avg_duration, Some(20.0));
        assert_eq!(summary.transfer_count, 6);
    }

    #[test]
    fn rows_sorted_with_unparsed_dates_last() {
        let report = WeeklyReport {
            rows: vec![
                row("2024-01-05", 1.0, "1%", 1),
                row("garbage", 1.0, "1%", 1),
                row("2024-01-02", 1.0, "1%", 1),
                row("???", 1.0, "1%", 1),
            ],
            summary: None,
        };
        let out = upsert(report, day("2024-01-03"), &today(1.0, 1.0, 1)).into_report();
        let order: Vec<String> = out.rows.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(
            order,
            vec!["2024-01-02", "2024-01-03", "2024-01-05", "garbage", "???"]
        );
    }

    #[test]
    fn malformed_percentages_are_skipped() {
        let rows = vec![
            row("2024-01-01", 1.0, "oops", 1),
            row("2024-01-02", 3.0, "40.00%", 1),
        ];
        let summary = summarize(&rows);
        assert_eq!(summary.utilization.as_deref(), Some("40.00%"));
        assert_eq!(summary.avg_duration, Some(2.0));
    }

    #[test]
    fn utilization_absent_when_nothing_parses() {
        let rows = vec![row("2024-01-01", 1.0, "n/a", 1)];
        assert_eq!(summarize(&rows).utilization, None);
    }

    #[test]
    fn failure_averages_only_present_values() {
        let mut rows = vec![
            row("2024-01-01", 1.0, "1%", 1),
            row("2024-01-02", 1.0, "1%", 1),
            row("2024-01-03", 1.0, "1%", 1),
        ];
        assert_eq!(summarize(&rows).failure, None);

        rows[0].failure = Some("0.5%".into());
        rows[2].failure = Some("0.25%".into());
        assert_eq!(summarize(&rows).failure.as_deref(), Some("0.37500%"));
    }

    #[test]
    fn missing_counts_sum_as_zero() {
        let mut rows = vec![row("2024-01-01", 1.0, "1%", 4), row("2024-01-02", 1.0, "1%", 4)];
        rows[1].transfer_count = None;
        assert_eq!(summarize(&rows).transfer_count, 4);
    }

    #[test]
    fn frame_round_trip_keeps_summary_last() {
        let report = upsert(
            WeeklyReport {
                rows: vec![row("2024-01-02", 12.0, "40.00%", 7)],
                summary: None,
            },
            day("2024-01-01"),
            &today(8.0, 20.0, 3),
        )
        .into_report();

        let df = report.to_frame().unwrap();
        let dates: Vec<Option<&str>> = df
            .column(weekly::DATE)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(dates, vec![Some("2024-01-01"), Some("2024-01-02"), Some("Weekly Avg")]);

        let back = WeeklyReport::from_frame(&df).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn from_frame_reads_string_cells() {
        let df = df!(
            weekly::DATE => ["2024-01-01 00:00:00", "Weekly Avg"],
            weekly::AVG_EXECUTE_PERIOD => ["15.5", "15.5"],
            weekly::UTILIZATION => ["40.00%", "40.00%"],
            weekly::TRANSFER_COUNT => ["12", "12"]
        )
        .unwrap();
        let report = WeeklyReport::from_frame(&df).unwrap();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].date, ReportDate::Day(day("2024-01-01")));
        assert_eq!(report.rows[0].avg_duration, Some(15.5));
        assert_eq!(report.rows[0].failure, None);
        assert_eq!(report.summary.map(|s| s.transfer_count), Some(12));
    }

    #[test]
    fn existing_day_detected_after_reload() {
        let df = df!(
            weekly::DATE => ["2024-01-01", "Weekly Avg"],
            weekly::UTILIZATION => ["40.00%", "40.00%"]
        )
        .unwrap();
        let report = WeeklyReport::from_frame(&df).unwrap();
        let out = upsert(report.clone(), day("2024-01-01"), &today(1.0, 1.0, 1));
        assert_eq!(out, MergeOutcome::AlreadyPresent(report));
    }
}
