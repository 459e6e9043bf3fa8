use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ReportError, Result};

/// Number of OHT vehicles in the fleet.
pub const DEFAULT_FLEET_SIZE: u32 = 69;

/// Settings for one daily run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory searched for the transfer log.
    pub data_dir: PathBuf,
    /// Directory holding the report workbook.
    pub output_dir: PathBuf,
    /// Shelf reference JSON.
    pub shelf_reference: PathBuf,
    /// File-name prefix of the transfer log.
    pub transfer_prefix: String,
    pub workbook_name: String,
    pub fleet_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            shelf_reference: PathBuf::from("data/FabShelf.json"),
            transfer_prefix: "TransferTime".to_string(),
            workbook_name: "OHT_Daily_Report".to_string(),
            fleet_size: DEFAULT_FLEET_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; omitted keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReportError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ReportError::Config(format!("invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fleet_size == 0 {
            return Err(ReportError::Config(
                "fleet_size must be greater than zero".to_string(),
            ));
        }
        if self.transfer_prefix.trim().is_empty() {
            return Err(ReportError::Config(
                "transfer_prefix must not be empty".to_string(),
            ));
        }
        if self.workbook_name.trim().is_empty() {
            return Err(ReportError::Config(
                "workbook_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn workbook_path(&self) -> PathBuf {
        self.output_dir.join(&self.workbook_name)
    }
}
