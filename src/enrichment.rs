use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use polars::prelude::*;
use tracing::{debug, warn};

use crate::error::Result;
use crate::schema::{enriched, flow, require_columns, transfer};
use crate::shelf::ShelfIndex;

/// Flow classification of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    Fab { source: i64, dest: i64 },
    NotApplicable,
}

impl FlowType {
    /// `Fab` only when both areas are known FAB areas.
    pub fn classify(source: Option<i64>, dest: Option<i64>) -> Self {
        match (source, dest) {
            (Some(s), Some(d)) if flow::FAB_AREAS.contains(&s) && flow::FAB_AREAS.contains(&d) => {
                FlowType::Fab { source: s, dest: d }
            }
            _ => FlowType::NotApplicable,
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowType::Fab { source, dest } => write!(f, "FAB{source}->FAB{dest}"),
            FlowType::NotApplicable => f.write_str(flow::NOT_APPLICABLE),
        }
    }
}

/// Ordered field list: derived columns placed right after an anchor column.
///
/// Output order is computed from the input column list every time, so
/// adding a derived field means adding data here, not splicing indices.
#[derive(Debug, Clone, Default)]
pub struct FieldOrder {
    anchors: Vec<(&'static str, Vec<&'static str>)>,
}

impl FieldOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_after(mut self, anchor: &'static str, fields: &[&'static str]) -> Self {
        self.anchors.push((anchor, fields.to_vec()));
        self
    }

    /// Placement used for enriched transfer frames.
    pub fn canonical() -> Self {
        Self::new()
            .insert_after(
                transfer::COMMAND_SOURCE,
                &[enriched::SRC_BAY, enriched::SOURCE_AREA],
            )
            .insert_after(
                transfer::COMMAND_DESTINATION,
                &[enriched::DEST_BAY, enriched::DEST_AREA, enriched::TYPE],
            )
            .insert_after(transfer::CREATE_TIME, &[enriched::DATE, enriched::HOUR])
    }

    /// Final column order for `input` given the set of derived fields that
    /// were actually produced. Input columns sharing a produced name are
    /// replaced, not duplicated.
    pub fn materialize(&self, input: &[&str], produced: &HashSet<&str>) -> Vec<String> {
        let mut out = Vec::with_capacity(input.len() + produced.len());
        for &name in input {
            if produced.contains(name) {
                continue;
            }
            out.push(name.to_string());
            for (anchor, fields) in &self.anchors {
                if *anchor == name {
                    out.extend(
                        fields
                            .iter()
                            .filter(|f| produced.contains(*f))
                            .map(|f| f.to_string()),
                    );
                }
            }
        }
        out
    }
}

/// Result of [`enrich`].
#[derive(Debug, Clone)]
pub struct Enriched {
    pub frame: DataFrame,
    /// Rows whose creation time could not be parsed (Date/Hour left null).
    pub unparsed_timestamps: usize,
}

/// Result of [`coerce_durations`].
#[derive(Debug, Clone)]
pub struct Coerced {
    pub frame: DataFrame,
    pub dropped_rows: usize,
}

/// Add bay/area, flow type and calendar columns to a raw transfer frame.
pub fn enrich(frame: &DataFrame, index: &ShelfIndex) -> Result<Enriched> {
    require_columns(
        frame,
        &[transfer::COMMAND_SOURCE, transfer::COMMAND_DESTINATION],
    )?;

    let sources = text_values(frame, transfer::COMMAND_SOURCE)?;
    let dests = text_values(frame, transfer::COMMAND_DESTINATION)?;

    let mut src_bay = Vec::with_capacity(frame.height());
    let mut src_area = Vec::with_capacity(frame.height());
    let mut dest_bay = Vec::with_capacity(frame.height());
    let mut dest_area = Vec::with_capacity(frame.height());
    let mut flow_type = Vec::with_capacity(frame.height());

    for (src, dst) in sources.iter().zip(dests.iter()) {
        let (sb, sa) = resolve(index, src.as_deref());
        let (db, da) = resolve(index, dst.as_deref());
        flow_type.push(FlowType::classify(sa, da).to_string());
        src_bay.push(sb);
        src_area.push(sa);
        dest_bay.push(db);
        dest_area.push(da);
    }

    let mut derived: HashMap<&'static str, Column> = HashMap::new();
    derived.insert(
        enriched::SRC_BAY,
        Series::new(enriched::SRC_BAY.into(), src_bay).into(),
    );
    derived.insert(
        enriched::SOURCE_AREA,
        Series::new(enriched::SOURCE_AREA.into(), src_area).into(),
    );
    derived.insert(
        enriched::DEST_BAY,
        Series::new(enriched::DEST_BAY.into(), dest_bay).into(),
    );
    derived.insert(
        enriched::DEST_AREA,
        Series::new(enriched::DEST_AREA.into(), dest_area).into(),
    );
    derived.insert(
        enriched::TYPE,
        Series::new(enriched::TYPE.into(), flow_type).into(),
    );

    let mut unparsed_timestamps = 0;
    if frame.column(transfer::CREATE_TIME).is_ok() {
        let times = text_values(frame, transfer::CREATE_TIME)?;
        let mut dates: Vec<Option<String>> = Vec::with_capacity(times.len());
        let mut hours: Vec<Option<i32>> = Vec::with_capacity(times.len());
        for raw in &times {
            match raw.as_deref().and_then(parse_timestamp) {
                Some(ts) => {
                    dates.push(Some(ts.format("%Y-%m-%d").to_string()));
                    hours.push(Some(ts.hour() as i32));
                }
                None => {
                    unparsed_timestamps += 1;
                    dates.push(None);
                    hours.push(None);
                }
            }
        }
        derived.insert(
            enriched::DATE,
            Series::new(enriched::DATE.into(), dates).into(),
        );
        derived.insert(
            enriched::HOUR,
            Series::new(enriched::HOUR.into(), hours).into(),
        );
    } else {
        debug!("no '{}' column, skipping calendar fields", transfer::CREATE_TIME);
    }

    if unparsed_timestamps > 0 {
        warn!(
            rows = unparsed_timestamps,
            "creation time could not be parsed; Date/Hour left empty"
        );
    }

    let produced: HashSet<&str> = derived.keys().copied().collect();
    let input_names = frame.get_column_names_str();
    let order = FieldOrder::canonical().materialize(&input_names, &produced);

    let mut columns: Vec<Column> = Vec::with_capacity(order.len());
    for name in &order {
        match derived.remove(name.as_str()) {
            Some(column) => columns.push(column),
            None => columns.push(frame.column(name)?.clone()),
        }
    }

    let out = DataFrame::new(columns)?;
    Ok(Enriched {
        frame: out,
        unparsed_timestamps,
    })
}

/// Parse `EXECUTE PERIOD` as Float64 and drop rows where that fails.
/// `NaN` and infinite values count as non-numeric.
pub fn coerce_durations(frame: DataFrame) -> Result<Coerced> {
    require_columns(&frame, &[transfer::EXECUTE_PERIOD])?;

    let before = frame.height();
    let out = frame
        .lazy()
        .with_columns([col(transfer::EXECUTE_PERIOD)
            .cast(DataType::String)
            .str()
            .strip_chars(lit(" \t\r\n"))
            .cast(DataType::Float64)])
        .filter(
            col(transfer::EXECUTE_PERIOD)
                .is_not_null()
                .and(col(transfer::EXECUTE_PERIOD).is_finite()),
        )
        .collect()?;

    let dropped_rows = before - out.height();
    if dropped_rows > 0 {
        warn!(
            rows = dropped_rows,
            "skipped rows with non-numeric '{}'",
            transfer::EXECUTE_PERIOD
        );
    }
    Ok(Coerced {
        frame: out,
        dropped_rows,
    })
}

/// Parse a creation timestamp. Unrecognised text yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 8] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
    ];

    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.naive_local());
    }
    ["%Y-%m-%d", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn resolve(index: &ShelfIndex, name: Option<&str>) -> (Option<String>, Option<i64>) {
    match name {
        Some(n) => {
            let (bay, area) = index.bay_area(n.trim());
            (bay.map(str::to_string), area)
        }
        None => (None, None),
    }
}

/// Column values as optional strings, whatever the source dtype.
fn text_values(frame: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let casted = frame.column(name)?.cast(&DataType::String)?;
    let values = casted
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReportError;
    use serde_json::json;

    fn index() -> ShelfIndex {
        ShelfIndex::from_json(&json!([
            {"SHELF_NAME": "A1", "Area": 1, "Bay": "X"},
            {"SHELF_NAME": "B2", "Area": 2, "Bay": "Y"},
            {"SHELF_NAME": "C3", "Area": 3, "Bay": "Z"}
        ]))
        .unwrap()
    }

    fn raw(rows: &[(&str, &str, &str, &str)]) -> DataFrame {
        df!(
            "OHT ID" => rows.iter().map(|_| "V01").collect::<Vec<_>>(),
            transfer::COMMAND_SOURCE => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            transfer::COMMAND_DESTINATION => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            transfer::EXECUTE_PERIOD => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            transfer::CREATE_TIME => rows.iter().map(|r| r.3).collect::<Vec<_>>()
        )
        .unwrap()
    }

    fn cell_str(df: &DataFrame, name: &str, row: usize) -> Option<String> {
        df.column(name)
            .unwrap()
            .str()
            .unwrap()
            .get(row)
            .map(str::to_string)
    }

    #[test]
    fn classifies_fab_flows() {
        assert_eq!(FlowType::classify(Some(1), Some(2)).to_string(), "FAB1->FAB2");
        assert_eq!(FlowType::classify(Some(2), Some(2)).to_string(), "FAB2->FAB2");
        assert_eq!(FlowType::classify(Some(1), Some(3)).to_string(), "N/A");
        assert_eq!(FlowType::classify(None, Some(1)).to_string(), "N/A");
    }

    #[test]
    fn enriches_single_transfer() {
        let df = raw(&[("A1", "B2", "45", "2024-01-01T08:15")]);
        let out = enrich(&df, &index()).unwrap();
        assert_eq!(out.unparsed_timestamps, 0);

        let f = &out.frame;
        assert_eq!(cell_str(f, enriched::TYPE, 0).as_deref(), Some("FAB1->FAB2"));
        assert_eq!(cell_str(f, enriched::DATE, 0).as_deref(), Some("2024-01-01"));
        assert_eq!(f.column(enriched::HOUR).unwrap().i32().unwrap().get(0), Some(8));
        assert_eq!(cell_str(f, enriched::SRC_BAY, 0).as_deref(), Some("X"));
        assert_eq!(f.column(enriched::DEST_AREA).unwrap().i64().unwrap().get(0), Some(2));
    }

    #[test]
    fn derived_columns_follow_their_anchor() {
        let df = raw(&[("A1", "C3", "10", "2024-01-01 09:00:00")]);
        let out = enrich(&df, &index()).unwrap();
        let names = out.frame.get_column_names_str();
        assert_eq!(
            names,
            vec![
                "OHT ID",
                "COMMAND SOURCE",
                "SRC_BAY",
                "SOURCE_Area",
                "COMMAND DESTINATION",
                "DEST_BAY",
                "DEST_Area",
                "Type",
                "EXECUTE PERIOD",
                "CREATE TIME",
                "Date",
                "Hour",
            ]
        );
        assert_eq!(cell_str(&out.frame, enriched::TYPE, 0).as_deref(), Some("N/A"));
    }

    #[test]
    fn existing_derived_column_is_replaced() {
        let df = df!(
            transfer::COMMAND_SOURCE => ["A1"],
            "Type" => ["stale"],
            transfer::COMMAND_DESTINATION => ["A1"]
        )
        .unwrap();
        let out = enrich(&df, &index()).unwrap();
        let names = out.frame.get_column_names_str();
        assert_eq!(names.iter().filter(|n| **n == "Type").count(), 1);
        assert_eq!(cell_str(&out.frame, enriched::TYPE, 0).as_deref(), Some("FAB1->FAB1"));
        assert!(out.frame.column(enriched::DATE).is_err());
    }

    #[test]
    fn unparseable_timestamp_nulls_calendar_fields() {
        let df = raw(&[
            ("A1", "B2", "5", "not a time"),
            ("A1", "B2", "5", "2024-03-02 23:59:59.250"),
        ]);
        let out = enrich(&df, &index()).unwrap();
        assert_eq!(out.unparsed_timestamps, 1);
        assert_eq!(out.frame.height(), 2);
        assert_eq!(cell_str(&out.frame, enriched::DATE, 0), None);
        let hours = out.frame.column(enriched::HOUR).unwrap().i32().unwrap();
        assert_eq!(hours.get(0), None);
        assert_eq!(hours.get(1), Some(23));
    }

    #[test]
    fn unknown_shelves_are_not_classified() {
        let df = raw(&[("Q9", "B2", "5", "2024-01-01 00:00")]);
        let out = enrich(&df, &index()).unwrap();
        assert_eq!(cell_str(&out.frame, enriched::SRC_BAY, 0), None);
        assert_eq!(cell_str(&out.frame, enriched::TYPE, 0).as_deref(), Some("N/A"));
    }

    #[test]
    fn missing_location_column_is_schema_error() {
        let df = df!(transfer::COMMAND_SOURCE => ["A1"]).unwrap();
        let err = enrich(&df, &index()).unwrap_err();
        assert!(matches!(err, ReportError::Schema(_)));
    }

    #[test]
    fn coerce_drops_non_numeric_durations() {
        let df = raw(&[
            ("A1", "B2", " 45 ", "2024-01-01 08:00"),
            ("A1", "B2", "n/a", "2024-01-01 08:00"),
            ("A1", "B2", "12.5", "2024-01-01 09:00"),
        ]);
        let out = coerce_durations(df).unwrap();
        assert_eq!(out.dropped_rows, 1);
        let values: Vec<Option<f64>> = out
            .frame
            .column(transfer::EXECUTE_PERIOD)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values, vec![Some(45.0), Some(12.5)]);
    }

    #[test]
    fn coerce_drops_nan_and_infinite_durations() {
        let df = df!(transfer::EXECUTE_PERIOD => ["NaN", "nan", "inf", "-inf", "12"]).unwrap();
        let out = coerce_durations(df).unwrap();
        assert_eq!(out.dropped_rows, 4);
        let values: Vec<Option<f64>> = out
            .frame
            .column(transfer::EXECUTE_PERIOD)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values, vec![Some(12.0)]);
    }

    #[test]
    fn coerce_requires_duration_column() {
        let df = df!(transfer::COMMAND_SOURCE => ["A1"]).unwrap();
        assert!(matches!(coerce_durations(df), Err(ReportError::Schema(_))));
    }

    #[test]
    fn parses_common_timestamp_layouts() {
        for s in [
            "2024-01-01T08:15",
            "2024-01-01 08:15:00",
            "2024-01-01 08:15:00.000000",
            "2024/01/01 08:15",
            "2024-01-01T08:15:00+09:00",
        ] {
            let ts = parse_timestamp(s).unwrap_or_else(|| panic!("failed on {s}"));
            assert_eq!(ts.hour(), 8, "{s}");
        }
        assert_eq!(parse_timestamp("2024-01-01").map(|t| t.hour()), Some(0));
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn field_order_skips_unproduced_fields() {
        let produced: HashSet<&str> = [enriched::SRC_BAY].into_iter().collect();
        let order = FieldOrder::canonical()
            .materialize(&["x", "COMMAND SOURCE", "CREATE TIME"], &produced);
        assert_eq!(order, vec!["x", "COMMAND SOURCE", "SRC_BAY", "CREATE TIME"]);
    }
}
