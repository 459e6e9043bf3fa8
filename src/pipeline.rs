use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDate};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use tracing::{info, warn};

use crate::aggregation::{
    self, DailySummary, HourlyAverage, PivotRow, UtilizationSummary,
};
use crate::config::PipelineConfig;
use crate::enrichment::{coerce_durations, enrich};
use crate::error::{ReportError, Result};
use crate::schema::sheet;
use crate::shelf::ShelfIndex;
use crate::weekly::{self, MergeOutcome, WeeklyReport};
use crate::workbook::{read_csv_as_strings, Workbook};

static DATE_IN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})-?(\d{2})-?(\d{2})").unwrap());

/// Rows that were recovered locally instead of failing the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataQuality {
    /// Rows dropped for a non-numeric duration.
    pub dropped_durations: usize,
    /// Rows kept with null Date/Hour.
    pub unparsed_timestamps: usize,
}

/// An aggregation step that could not run on this day's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedStep {
    pub step: &'static str,
    pub reason: String,
}

/// Everything derived from one day's transfer log.
///
/// `hourly` and `pivot` are `None` when their input columns are missing;
/// the reason is listed in `skipped`.
#[derive(Debug, Clone)]
pub struct DailyReport {
    pub processed: DataFrame,
    pub hourly: Option<Vec<HourlyAverage>>,
    pub utilization: UtilizationSummary,
    pub pivot: Option<Vec<PivotRow>>,
    pub summary: DailySummary,
    pub data_quality: DataQuality,
    pub skipped: Vec<SkippedStep>,
}

impl DailyReport {
    /// Enrich, filter and aggregate a raw transfer frame.
    pub fn build(raw: &DataFrame, index: &ShelfIndex, fleet_size: u32) -> Result<Self> {
        let enriched = enrich(raw, index)?;
        let coerced = coerce_durations(enriched.frame)?;
        let processed = coerced.frame;

        let mut skipped = Vec::new();
        let hourly = schema_step(
            sheet::HOURLY_ADT,
            aggregation::hourly_average(&processed),
            &mut skipped,
        )?;
        let utilization = aggregation::utilization(&processed, fleet_size)?;
        let pivot = schema_step(sheet::PIVOT_SOURCE, aggregation::pivot(&processed), &mut skipped)?;
        let summary = aggregation::daily_summary(&processed, &utilization)?;

        info!(
            transfers = processed.height(),
            hours = hourly.as_ref().map_or(0, Vec::len),
            used = utilization.used_entities,
            "aggregated daily transfers"
        );
        Ok(Self {
            processed,
            hourly,
            utilization,
            pivot,
            summary,
            data_quality: DataQuality {
                dropped_durations: coerced.dropped_rows,
                unparsed_timestamps: enriched.unparsed_timestamps,
            },
            skipped,
        })
    }

    /// Write the dated sheets. Skipped steps get no sheet.
    pub fn write_sheets(&self, workbook: &mut Workbook, date_tag: &str) -> Result<()> {
        let mut processed = self.processed.clone();
        workbook.write_sheet(&sheet::tagged(date_tag, sheet::PROCESSED), &mut processed)?;
        if let Some(pivot) = &self.pivot {
            workbook.write_sheet(
                &sheet::tagged(date_tag, sheet::PIVOT_SOURCE),
                &mut aggregation::pivot_frame(pivot)?,
            )?;
        }
        if let Some(hourly) = &self.hourly {
            workbook.write_sheet(
                &sheet::tagged(date_tag, sheet::HOURLY_ADT),
                &mut aggregation::hourly_frame(hourly)?,
            )?;
        }
        workbook.write_sheet(
            &sheet::tagged(date_tag, sheet::UTILIZATION),
            &mut aggregation::utilization_frame(&self.utilization)?,
        )?;
        Ok(())
    }
}

/// A missing-column error only aborts its own step.
fn schema_step<T>(
    step: &'static str,
    result: Result<T>,
    skipped: &mut Vec<SkippedStep>,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ReportError::Schema(reason)) => {
            warn!(step, %reason, "aggregation step skipped");
            skipped.push(SkippedStep { step, reason });
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeeklyStatus {
    Inserted,
    AlreadyPresent,
    /// Daily sheets were written but the weekly sheet was not updated.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub input: PathBuf,
    pub day: NaiveDate,
    pub date_tag: String,
    pub workbook: PathBuf,
    pub transfers: usize,
    pub utilization: UtilizationSummary,
    pub data_quality: DataQuality,
    pub skipped: Vec<SkippedStep>,
    pub weekly: WeeklyStatus,
}

/// First file in `dir` whose name starts with `prefix` and ends in `.csv`,
/// by name order.
pub fn find_transfer_file(dir: &Path, prefix: &str) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| ReportError::NotFound(format!("data directory {}: {e}", dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let is_csv = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
            name.starts_with(prefix) && is_csv
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next().ok_or_else(|| {
        ReportError::NotFound(format!(
            "no file starting with '{prefix}' in {}",
            dir.display()
        ))
    })
}

/// Report day for an input file: the first valid `YYYYMMDD` or
/// `YYYY-MM-DD` in its name, otherwise the day before `today`.
pub fn report_day(file_name: &str, today: NaiveDate) -> NaiveDate {
    DATE_IN_NAME
        .captures_iter(file_name)
        .find_map(|caps| {
            let y = caps[1].parse::<i32>().ok()?;
            let m = caps[2].parse::<u32>().ok()?;
            let d = caps[3].parse::<u32>().ok()?;
            NaiveDate::from_ymd_opt(y, m, d)
        })
        .unwrap_or_else(|| today - Duration::days(1))
}

pub fn date_tag(day: NaiveDate) -> String {
    day.format("%Y%m%d").to_string()
}

/// Merge today's summary into the workbook's weekly sheet and keep that
/// sheet last.
pub fn update_weekly(
    workbook: &mut Workbook,
    day: NaiveDate,
    summary: &DailySummary,
) -> Result<MergeOutcome> {
    let existing = match workbook.read_sheet(sheet::WEEKLY_REPORT) {
        Ok(Some(df)) => WeeklyReport::from_frame(&df).unwrap_or_else(|e| {
            warn!(error = %e, "weekly report unreadable; starting a new one");
            WeeklyReport::default()
        }),
        Ok(None) => WeeklyReport::default(),
        Err(e) => {
            warn!(error = %e, "weekly report unreadable; starting a new one");
            WeeklyReport::default()
        }
    };

    let outcome = weekly::upsert(existing, day, summary);
    if let MergeOutcome::Inserted(report) = &outcome {
        workbook.write_sheet(sheet::WEEKLY_REPORT, &mut report.to_frame()?)?;
    }
    workbook.move_to_end(sheet::WEEKLY_REPORT)?;
    Ok(outcome)
}

/// Run one daily batch with today's local date.
pub fn run(config: &PipelineConfig) -> Result<RunReport> {
    run_on(config, Local::now().date_naive())
}

pub fn run_on(config: &PipelineConfig, today: NaiveDate) -> Result<RunReport> {
    config.validate()?;
    let index = ShelfIndex::from_json_file(&config.shelf_reference)?;
    info!(shelves = index.len(), "loaded shelf reference");

    let input = find_transfer_file(&config.data_dir, &config.transfer_prefix)?;
    let file_name = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let day = report_day(file_name, today);
    let tag = date_tag(day);
    info!(input = %input.display(), %day, "processing transfer log");

    let raw = read_csv_as_strings(&input)?;
    let daily = DailyReport::build(&raw, &index, config.fleet_size)?;

    let mut workbook = Workbook::open(config.workbook_path())?;
    daily.write_sheets(&mut workbook, &tag)?;

    let weekly = match update_weekly(&mut workbook, day, &daily.summary) {
        Ok(MergeOutcome::Inserted(_)) => WeeklyStatus::Inserted,
        Ok(MergeOutcome::AlreadyPresent(_)) => WeeklyStatus::AlreadyPresent,
        Err(e) => {
            warn!(error = %e, "weekly report not updated");
            WeeklyStatus::Failed(e.to_string())
        }
    };
    info!(workbook = %workbook.root().display(), "all results saved");

    Ok(RunReport {
        input,
        day,
        date_tag: tag,
        workbook: workbook.root().to_path_buf(),
        transfers: daily.processed.height(),
        utilization: daily.utilization,
        data_quality: daily.data_quality,
        skipped: daily.skipped,
        weekly,
    })
}
