use std::path::PathBuf;

use chrono::NaiveDate;
use pyo3::prelude::*;
use pyo3_polars::PyDataFrame;

use crate::aggregation;
use crate::config::DEFAULT_FLEET_SIZE;
use crate::enrichment;
use crate::error::ReportError;
use crate::shelf::ShelfIndex;
use crate::weekly::{self, WeeklyReport};
use crate::workbook::read_csv_as_strings;

#[pyclass]
pub struct ReportModel {
    base_path: PathBuf,
    fleet_size: u32,
    shelf_index: Option<ShelfIndex>,
}

#[pymethods]
impl ReportModel {
    #[new]
    #[pyo3(signature = (base_path, fleet_size=DEFAULT_FLEET_SIZE))]
    fn new(base_path: String, fleet_size: u32) -> PyResult<Self> {
        if fleet_size == 0 {
            return Err(ReportError::Config("fleet_size must be greater than zero".into()).into());
        }
        Ok(Self {
            base_path: PathBuf::from(base_path),
            fleet_size,
            shelf_index: None,
        })
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load the shelf reference JSON (list or mapping shape).
    /// Returns the normalized SHELF_NAME / Area / Bay table.
    #[pyo3(signature = (filename=None))]
    fn load_shelf_index(&mut self, filename: Option<&str>) -> PyResult<PyDataFrame> {
        let path = self.base_path.join(filename.unwrap_or("FabShelf.json"));
        let index = ShelfIndex::from_json_file(&path)?;
        let df = index.to_frame()?;
        self.shelf_index = Some(index);
        Ok(PyDataFrame(df))
    }

    /// Load a transfer log CSV with every column as strings.
    fn load_transfers(&self, filename: &str) -> PyResult<PyDataFrame> {
        let df = read_csv_as_strings(&self.base_path.join(filename))?;
        Ok(PyDataFrame(df))
    }

    // ── Enrichment ──────────────────────────────────────────────────────────

    /// Add bay/area, Type, Date and Hour columns.
    /// Returns `(frame, unparsed_timestamp_count)`.
    fn enrich(&self, transfers: PyDataFrame) -> PyResult<(PyDataFrame, usize)> {
        let index = self.index()?;
        let out = enrichment::enrich(&transfers.0, index)?;
        Ok((PyDataFrame(out.frame), out.unparsed_timestamps))
    }

    /// Parse EXECUTE PERIOD and drop non-numeric rows.
    /// Returns `(frame, dropped_row_count)`.
    #[staticmethod]
    fn coerce_durations(df: PyDataFrame) -> PyResult<(PyDataFrame, usize)> {
        let out = enrichment::coerce_durations(df.0)?;
        Ok((PyDataFrame(out.frame), out.dropped_rows))
    }

    // ── Aggregation ─────────────────────────────────────────────────────────

    #[staticmethod]
    fn hourly_average(df: PyDataFrame) -> PyResult<PyDataFrame> {
        let rows = aggregation::hourly_average(&df.0)?;
        Ok(PyDataFrame(aggregation::hourly_frame(&rows)?))
    }

    fn utilization(&self, df: PyDataFrame) -> PyResult<PyDataFrame> {
        let summary = aggregation::utilization(&df.0, self.fleet_size)?;
        Ok(PyDataFrame(aggregation::utilization_frame(&summary)?))
    }

    #[staticmethod]
    fn pivot(df: PyDataFrame) -> PyResult<PyDataFrame> {
        let rows = aggregation::pivot(&df.0)?;
        Ok(PyDataFrame(aggregation::pivot_frame(&rows)?))
    }

    // ── Weekly report ───────────────────────────────────────────────────────

    /// Merge a processed day into the weekly report.
    ///
    /// `report` is the persisted weekly sheet (or None for a new report).
    /// Returns `(report, inserted)`; `inserted` is False when `day` was
    /// already present and the report is returned unchanged.
    #[pyo3(signature = (processed, day, report=None))]
    fn upsert_weekly(
        &self,
        processed: PyDataFrame,
        day: NaiveDate,
        report: Option<PyDataFrame>,
    ) -> PyResult<(PyDataFrame, bool)> {
        let existing = match report {
            Some(df) => WeeklyReport::from_frame(&df.0)?,
            None => WeeklyReport::default(),
        };
        let util = aggregation::utilization(&processed.0, self.fleet_size)?;
        let summary = aggregation::daily_summary(&processed.0, &util)?;

        let outcome = weekly::upsert(existing, day, &summary);
        let inserted = outcome.is_inserted();
        let df = outcome.report().to_frame()?;
        Ok((PyDataFrame(df), inserted))
    }

    // ── Properties ──────────────────────────────────────────────────────────

    #[getter]
    fn fleet_size(&self) -> u32 {
        self.fleet_size
    }

    #[getter]
    fn shelf_index_df(&self) -> PyResult<Option<PyDataFrame>> {
        match &self.shelf_index {
            Some(index) => Ok(Some(PyDataFrame(index.to_frame()?))),
            None => Ok(None),
        }
    }
}

impl ReportModel {
    fn index(&self) -> Result<&ShelfIndex, ReportError> {
        self.shelf_index
            .as_ref()
            .ok_or_else(|| ReportError::NotFound("shelf index not loaded".into()))
    }
}
