//! Daily OHT transfer report: shelf enrichment, hourly/fleet aggregates
//! and an idempotent rolling weekly summary.

pub mod aggregation;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod pipeline;
pub mod schema;
pub mod shelf;
pub mod weekly;
pub mod workbook;

#[cfg(feature = "python")]
mod model;

pub use config::PipelineConfig;
pub use error::{ReportError, Result};
pub use shelf::{ShelfEntry, ShelfIndex};
pub use weekly::{MergeOutcome, WeeklyReport};

#[cfg(feature = "python")]
mod python {
    use pyo3::prelude::*;
    use pyo3::types::PyModule;

    use crate::model::ReportModel;
    use crate::schema;

    /// Export schema constants as Python submodules
    fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
        // Transfer
        let transfer = PyModule::new(m.py(), "transfer")?;
        transfer.add("COMMAND_SOURCE", schema::transfer::COMMAND_SOURCE)?;
        transfer.add("COMMAND_DESTINATION", schema::transfer::COMMAND_DESTINATION)?;
        transfer.add("CREATE_TIME", schema::transfer::CREATE_TIME)?;
        transfer.add("EXECUTE_PERIOD", schema::transfer::EXECUTE_PERIOD)?;
        transfer.add("OHT_ID", schema::transfer::OHT_ID)?;
        m.add_submodule(&transfer)?;

        // Enriched
        let enriched = PyModule::new(m.py(), "enriched")?;
        enriched.add("SRC_BAY", schema::enriched::SRC_BAY)?;
        enriched.add("SOURCE_AREA", schema::enriched::SOURCE_AREA)?;
        enriched.add("DEST_BAY", schema::enriched::DEST_BAY)?;
        enriched.add("DEST_AREA", schema::enriched::DEST_AREA)?;
        enriched.add("TYPE", schema::enriched::TYPE)?;
        enriched.add("DATE", schema::enriched::DATE)?;
        enriched.add("HOUR", schema::enriched::HOUR)?;
        m.add_submodule(&enriched)?;

        // Weekly
        let weekly = PyModule::new(m.py(), "weekly")?;
        weekly.add("DATE", schema::weekly::DATE)?;
        weekly.add("AVG_EXECUTE_PERIOD", schema::weekly::AVG_EXECUTE_PERIOD)?;
        weekly.add("UTILIZATION", schema::weekly::UTILIZATION)?;
        weekly.add("FAILURE", schema::weekly::FAILURE)?;
        weekly.add("TRANSFER_COUNT", schema::weekly::TRANSFER_COUNT)?;
        weekly.add("SUMMARY_MARKER", schema::weekly::SUMMARY_MARKER)?;
        m.add_submodule(&weekly)?;

        // Sheets
        let sheet = PyModule::new(m.py(), "sheet")?;
        sheet.add("PROCESSED", schema::sheet::PROCESSED)?;
        sheet.add("PIVOT_SOURCE", schema::sheet::PIVOT_SOURCE)?;
        sheet.add("HOURLY_ADT", schema::sheet::HOURLY_ADT)?;
        sheet.add("UTILIZATION", schema::sheet::UTILIZATION)?;
        sheet.add("WEEKLY_REPORT", schema::sheet::WEEKLY_REPORT)?;
        m.add_submodule(&sheet)?;

        Ok(())
    }

    #[pymodule]
    fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_class::<ReportModel>()?;
        add_schema_exports(m)?;
        Ok(())
    }
}
