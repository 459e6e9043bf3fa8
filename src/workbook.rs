use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ReportError, Result};

const MANIFEST: &str = "manifest.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    sheets: Vec<String>,
}

/// Multi-sheet tabular artifact stored as a directory: one CSV per sheet
/// plus `manifest.json` recording sheet order.
#[derive(Debug)]
pub struct Workbook {
    root: PathBuf,
    sheets: Vec<String>,
}

impl Workbook {
    /// Open an existing workbook, or start an empty one at `root`.
    /// Nothing is written until a sheet is written or [`Workbook::save`] is called.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let manifest_path = root.join(MANIFEST);
        let sheets = if manifest_path.exists() {
            let text = fs::read_to_string(&manifest_path)?;
            serde_json::from_str::<Manifest>(&text)?.sheets
        } else {
            Vec::new()
        };
        debug!(path = %root.display(), sheets = sheets.len(), "opened workbook");
        Ok(Self { root, sheets })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sheet_names(&self) -> &[String] {
        &self.sheets
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s == name)
    }

    fn sheet_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.csv"))
    }

    /// Read a sheet with every column as strings. `None` if the sheet is
    /// not part of the workbook.
    pub fn read_sheet(&self, name: &str) -> Result<Option<DataFrame>> {
        if !self.has_sheet(name) {
            return Ok(None);
        }
        let path = self.sheet_path(name);
        if !path.exists() {
            return Err(ReportError::NotFound(format!(
                "sheet '{name}' listed in manifest but {} is missing",
                path.display()
            )));
        }
        read_csv_as_strings(&path).map(Some)
    }

    /// Write a sheet, replacing one of the same name in place or appending
    /// a new one at the end. The manifest is saved afterwards.
    pub fn write_sheet(&mut self, name: &str, df: &mut DataFrame) -> Result<()> {
        validate_sheet_name(name)?;
        fs::create_dir_all(&self.root)?;

        let mut file = File::create(self.sheet_path(name))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)?;

        if !self.has_sheet(name) {
            self.sheets.push(name.to_string());
        }
        debug!(sheet = name, rows = df.height(), "wrote sheet");
        self.save()
    }

    /// Place `name` after every other sheet. Returns false if absent.
    pub fn move_to_end(&mut self, name: &str) -> Result<bool> {
        let Some(pos) = self.sheets.iter().position(|s| s == name) else {
            return Ok(false);
        };
        let sheet = self.sheets.remove(pos);
        self.sheets.push(sheet);
        self.save()?;
        Ok(true)
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let manifest = Manifest {
            sheets: self.sheets.clone(),
        };
        fs::write(
            self.root.join(MANIFEST),
            serde_json::to_string_pretty(&manifest)?,
        )?;
        Ok(())
    }
}

fn validate_sheet_name(name: &str) -> Result<()> {
    let bad = name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.');
    if bad {
        return Err(ReportError::Config(format!("invalid sheet name '{name}'")));
    }
    Ok(())
}

/// Read a CSV file with all columns as String dtype.
/// Trims whitespace from column names.
pub fn read_csv_as_strings(path: &Path) -> Result<DataFrame> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;
    Ok(df)
}
