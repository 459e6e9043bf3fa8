/// Column-name constants for the OHT report.
/// Single source of truth - exported to Python via PyO3.

// ── Raw transfer columns ────────────────────────────────────────────────────
pub mod transfer {
    pub const COMMAND_SOURCE: &str = "COMMAND SOURCE";
    pub const COMMAND_DESTINATION: &str = "COMMAND DESTINATION";
    pub const CREATE_TIME: &str = "CREATE TIME";
    pub const EXECUTE_PERIOD: &str = "EXECUTE PERIOD";
    pub const OHT_ID: &str = "OHT ID";
}

// ── Derived columns added by enrichment ─────────────────────────────────────
pub mod enriched {
    pub const SRC_BAY: &str = "SRC_BAY";
    pub const SOURCE_AREA: &str = "SOURCE_Area";
    pub const DEST_BAY: &str = "DEST_BAY";
    pub const DEST_AREA: &str = "DEST_Area";
    pub const TYPE: &str = "Type";
    pub const DATE: &str = "Date";
    pub const HOUR: &str = "Hour";
}

// ── Flow classification values ──────────────────────────────────────────────
pub mod flow {
    pub const NOT_APPLICABLE: &str = "N/A";
    /// Areas that take part in FAB-to-FAB classification.
    pub const FAB_AREAS: [i64; 2] = [1, 2];
}

// ── Shelf reference columns ─────────────────────────────────────────────────
pub mod shelf {
    pub const SHELF_NAME: &str = "SHELF_NAME";
    pub const AREA: &str = "Area";
    pub const BAY: &str = "Bay";
}

// ── Hourly average sheet ────────────────────────────────────────────────────
pub mod hourly {
    pub const HOUR: &str = "Hour";
    pub const AVG_EXECUTE_PERIOD: &str = "Avg_EXECUTE_PERIOD";
}

// ── Utilization sheet ───────────────────────────────────────────────────────
pub mod utilization {
    pub const USED_OHTS: &str = "Used OHTs";
    pub const TOTAL_OHTS: &str = "Total OHTs";
    pub const UTILIZATION_PCT: &str = "Utilization (%)";
}

// ── Weekly report sheet ─────────────────────────────────────────────────────
pub mod weekly {
    pub const DATE: &str = "Date";
    pub const AVG_EXECUTE_PERIOD: &str = "Avg_EXECUTE_PERIOD";
    pub const UTILIZATION: &str = "Utilization (%)";
    pub const FAILURE: &str = "Failure (%)";
    pub const TRANSFER_COUNT: &str = "Transfer Count";
    /// Date-column text of the trailing aggregate row in the persisted sheet.
    pub const SUMMARY_MARKER: &str = "Weekly Avg";
}

// ── Sheet names ─────────────────────────────────────────────────────────────
pub mod sheet {
    pub const PROCESSED: &str = "Processed";
    pub const PIVOT_SOURCE: &str = "PivotSource";
    pub const HOURLY_ADT: &str = "HourlyADT";
    pub const UTILIZATION: &str = "Utilization";
    pub const WEEKLY_REPORT: &str = "Weekly_Report";

    pub fn tagged(date_tag: &str, suffix: &str) -> String {
        format!("{date_tag}_{suffix}")
    }
}

/// Fail with a schema error naming every column of `required` missing from `df`.
pub fn require_columns(
    df: &polars::prelude::DataFrame,
    required: &[&str],
) -> crate::error::Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| df.column(name).is_err())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(crate::error::ReportError::missing_columns(&missing))
    }
}
