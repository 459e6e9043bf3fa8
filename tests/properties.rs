//! Property-based tests for shelf lookup, flow classification and the
//! weekly upsert.

use chrono::NaiveDate;
use oht_report::aggregation::DailySummary;
use oht_report::enrichment::FlowType;
use oht_report::weekly::{upsert, MergeOutcome, ReportDate, WeeklyReport, WeeklyRow};
use oht_report::ShelfIndex;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn arb_shelves() -> impl Strategy<Value = Vec<(String, Option<i64>, Option<String>)>> {
    prop::collection::btree_map(
        "[A-Z][0-9]{1,3}",
        (prop::option::of(0i64..5), prop::option::of("[A-Z]{1,2}")),
        0..20,
    )
    .prop_map(|m| m.into_iter().map(|(k, (a, b))| (k, a, b)).collect())
}

fn arb_day() -> impl Strategy<Value = NaiveDate> {
    (0i64..60).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(offset)
    })
}

fn arb_row() -> impl Strategy<Value = WeeklyRow> {
    (
        prop_oneof![
            4 => arb_day().prop_map(ReportDate::Day),
            1 => "[a-z]{1,6}".prop_map(ReportDate::Unparsed),
        ],
        prop::option::of(0.0f64..500.0),
        prop::option::of(0.0f64..100.0),
        prop::option::of(0i64..1000),
    )
        .prop_map(|(date, avg, util, count)| WeeklyRow {
            date,
            avg_duration: avg,
            utilization: util.map(|u| format!("{u:.2}%")),
            failure: None,
            transfer_count: count,
        })
}

fn arb_summary() -> impl Strategy<Value = DailySummary> {
    (prop::option::of(0.0f64..500.0), 0.0f64..100.0, 0u64..5000).prop_map(|(avg, util, count)| {
        DailySummary {
            avg_duration: avg,
            utilization_pct: util,
            transfer_count: count,
        }
    })
}

proptest! {
    #[test]
    fn shelf_shapes_resolve_identically(shelves in arb_shelves(), probe in "[A-Z][0-9]{1,3}") {
        let list: Vec<Value> = shelves
            .iter()
            .map(|(name, area, bay)| json!({"SHELF_NAME": name, "Area": area, "Bay": bay}))
            .collect();
        let mut mapping = Map::new();
        for (name, area, bay) in &shelves {
            mapping.insert(name.clone(), json!({"Area": area, "Bay": bay}));
        }

        let from_list = ShelfIndex::from_json(&Value::Array(list)).unwrap();
        let from_map = ShelfIndex::from_json(&Value::Object(mapping)).unwrap();

        for (name, area, bay) in &shelves {
            prop_assert_eq!(from_list.bay_area(name), (bay.as_deref(), *area));
            prop_assert_eq!(from_list.bay_area(name), from_map.bay_area(name));
        }
        prop_assert_eq!(from_list.bay_area(&probe), from_map.bay_area(&probe));
    }

    #[test]
    fn flow_type_only_between_fab_areas(src in prop::option::of(-1i64..5), dest in prop::option::of(-1i64..5)) {
        let label = FlowType::classify(src, dest).to_string();
        match (src, dest) {
            (Some(a @ 1..=2), Some(b @ 1..=2)) => prop_assert_eq!(label, format!("FAB{a}->FAB{b}")),
            _ => prop_assert_eq!(label, "N/A"),
        }
    }

    #[test]
    fn upsert_is_idempotent(rows in prop::collection::vec(arb_row(), 0..8), day in arb_day(), today in arb_summary()) {
        let report = WeeklyReport { rows, summary: None };
        let once = upsert(report, day, &today).into_report();
        let twice = upsert(once.clone(), day, &today);
        prop_assert!(matches!(twice, MergeOutcome::AlreadyPresent(_)));
        prop_assert_eq!(twice.into_report(), once);
    }

    #[test]
    fn upsert_orders_dates_and_keeps_unparsed_order(rows in prop::collection::vec(arb_row(), 0..8), day in arb_day(), today in arb_summary()) {
        let unparsed_before: Vec<ReportDate> = rows
            .iter()
            .filter(|r| r.date.day().is_none())
            .map(|r| r.date.clone())
            .collect();

        let outcome = upsert(WeeklyReport { rows: rows.clone(), summary: None }, day, &today);
        let report = outcome.report();
        prop_assert!(report.summary.is_some() || !outcome.is_inserted());

        if outcome.is_inserted() {
            let dated: Vec<NaiveDate> = report.rows.iter().filter_map(|r| r.date.day()).collect();
            prop_assert!(dated.windows(2).all(|w| w[0] <= w[1]));

            let first_unparsed = report.rows.iter().position(|r| r.date.day().is_none());
            if let Some(pos) = first_unparsed {
                prop_assert!(report.rows[pos..].iter().all(|r| r.date.day().is_none()));
            }
            let unparsed_after: Vec<ReportDate> = report
                .rows
                .iter()
                .filter(|r| r.date.day().is_none())
                .cloned()
                .map(|r| r.date)
                .collect();
            prop_assert_eq!(unparsed_after, unparsed_before);
            prop_assert_eq!(report.rows.len(), rows.len() + 1);
        }
    }
}
