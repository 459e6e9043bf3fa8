use std::collections::HashMap;
use std::path::Path;

use polars::prelude::*;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ReportError, Result};
use crate::schema::shelf;

/// One row of the shelf reference table.
#[derive(Debug, Clone, PartialEq)]
pub struct ShelfEntry {
    pub shelf_name: String,
    pub area: Option<i64>,
    pub bay: Option<String>,
}

/// Shelf name → (area, bay) lookup, built once per run.
///
/// Unknown shelves are not an error: some locations carry no area/bay
/// metadata and simply resolve to `(None, None)`.
#[derive(Debug, Clone, Default)]
pub struct ShelfIndex {
    entries: HashMap<String, ShelfEntry>,
}

impl ShelfIndex {
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = ShelfEntry>,
    {
        let mut map = HashMap::new();
        for entry in entries {
            if map.contains_key(&entry.shelf_name) {
                return Err(ReportError::Config(format!(
                    "duplicate shelf name '{}' in reference data",
                    entry.shelf_name
                )));
            }
            map.insert(entry.shelf_name.clone(), entry);
        }
        Ok(Self { entries: map })
    }

    /// Build from either accepted JSON shape:
    ///
    /// list:    `[{"SHELF_NAME": "A1", "Area": 1, "Bay": "X"}, ...]`
    /// mapping: `{"A1": {"Area": 1, "Bay": "X"}, ...}`
    pub fn from_json(value: &Value) -> Result<Self> {
        let entries = match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| entry_from_record(i, item))
                .collect::<Result<Vec<_>>>()?,
            Value::Object(map) => map
                .iter()
                .map(|(name, attrs)| entry_from_mapping(name, attrs))
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(ReportError::Config(format!(
                    "shelf reference must be a list or a mapping, got {}",
                    json_kind(other)
                )))
            }
        };
        debug!(shelves = entries.len(), "parsed shelf reference");
        Self::from_entries(entries)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ReportError::Config(format!("shelf reference is not valid JSON: {e}")))?;
        Self::from_json(&value)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReportError::Config(format!(
                "shelf reference not found at {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn lookup(&self, shelf_name: &str) -> Option<&ShelfEntry> {
        self.entries.get(shelf_name)
    }

    /// Total lookup returning `(bay, area)`; unknown names give `(None, None)`.
    pub fn bay_area(&self, shelf_name: &str) -> (Option<&str>, Option<i64>) {
        match self.lookup(shelf_name) {
            Some(entry) => (entry.bay.as_deref(), entry.area),
            None => (None, None),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The index as a `SHELF_NAME / Area / Bay` frame, sorted by shelf name.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut sorted: Vec<&ShelfEntry> = self.entries.values().collect();
        sorted.sort_by(|a, b| a.shelf_name.cmp(&b.shelf_name));

        let names: Vec<&str> = sorted.iter().map(|e| e.shelf_name.as_str()).collect();
        let areas: Vec<Option<i64>> = sorted.iter().map(|e| e.area).collect();
        let bays: Vec<Option<&str>> = sorted.iter().map(|e| e.bay.as_deref()).collect();

        let df = DataFrame::new(vec![
            Series::new(shelf::SHELF_NAME.into(), names).into(),
            Series::new(shelf::AREA.into(), areas).into(),
            Series::new(shelf::BAY.into(), bays).into(),
        ])?;
        Ok(df)
    }
}

fn entry_from_record(row: usize, item: &Value) -> Result<ShelfEntry> {
    let obj = item.as_object().ok_or_else(|| {
        ReportError::Config(format!(
            "shelf reference row {row} is {}, expected an object",
            json_kind(item)
        ))
    })?;
    let name = obj
        .get(shelf::SHELF_NAME)
        .and_then(scalar_text)
        .ok_or_else(|| {
            ReportError::Config(format!(
                "shelf reference row {row} has no '{}'",
                shelf::SHELF_NAME
            ))
        })?;
    attributes(name, obj)
}

fn entry_from_mapping(name: &str, attrs: &Value) -> Result<ShelfEntry> {
    let obj = attrs.as_object().ok_or_else(|| {
        ReportError::Config(format!(
            "attributes of shelf '{name}' are {}, expected an object",
            json_kind(attrs)
        ))
    })?;
    attributes(name.to_string(), obj)
}

/// An entry must carry an `Area` or `Bay` key, even if its value is null.
fn attributes(shelf_name: String, obj: &Map<String, Value>) -> Result<ShelfEntry> {
    if !obj.contains_key(shelf::AREA) && !obj.contains_key(shelf::BAY) {
        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        return Err(ReportError::Config(format!(
            "shelf '{shelf_name}' has neither '{}' nor '{}' (keys: {keys:?})",
            shelf::AREA,
            shelf::BAY
        )));
    }
    let area = match obj.get(shelf::AREA) {
        None | Some(Value::Null) => None,
        Some(v) => Some(area_code(v).ok_or_else(|| {
            ReportError::Config(format!("shelf '{shelf_name}' has non-integer area {v}"))
        })?),
    };
    let bay = obj.get(shelf::BAY).and_then(scalar_text);
    Ok(ShelfEntry {
        shelf_name,
        area,
        bay,
    })
}

fn area_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
