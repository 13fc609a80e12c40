use chrono::{NaiveDate, NaiveDateTime};
use powertable::catalog::dates::DateFormat;
use powertable::catalog::schema::Column;
use powertable::catalog::types::CellValue;
use powertable::coercion::CoercionContext;
use powertable::config::{DataSourceConfig, IfMissing, TableConfig};
use powertable::source::LiveRecord;
use powertable::store::OverrideStore;
use powertable::view::{TableView, ViewContext, compute_table_view};
use proptest::prelude::*;
use serde_json::{Value, json};
use std::collections::HashSet;

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 2, 1)
        .expect("date")
        .and_hms_opt(8, 0, 0)
        .expect("time")
}

fn records(value: Value) -> Vec<LiveRecord> {
    value
        .as_array()
        .expect("array")
        .iter()
        .map(|item| item.as_object().cloned().expect("object"))
        .collect()
}

fn store(value: Value) -> OverrideStore {
    value
        .as_object()
        .expect("object")
        .iter()
        .map(|(id, row)| {
            let row = row
                .as_array()
                .expect("row")
                .iter()
                .map(CellValue::from)
                .collect();
            (id.clone(), row)
        })
        .collect()
}

fn render(config: &TableConfig, live: &[LiveRecord], saved: &OverrideStore) -> TableView {
    let format = config.date_format();
    let ctx = ViewContext::new(CoercionContext::new(&format, now()), "N/A (Missing)");
    compute_table_view(config, live, saved, &ctx)
}

fn ids(view: &TableView) -> Vec<&str> {
    view.rows.iter().map(|row| row.item_id.as_str()).collect()
}

#[test]
fn card_config_sorts_dates_descending_with_unparseable_last() {
    let config = TableConfig::from_json_str(
        r#"{
            "entity": "sensor.chores_store",
            "data_source": {
                "type": "sensor_attribute",
                "entity_id": "sensor.chores",
                "attribute_path": "items",
                "primary_key": "id"
            },
            "columns": [
                {"name": "Chore", "type": "content", "source": "name"},
                {"name": "Due", "type": "date"}
            ],
            "sort_column": "Due",
            "sort_direction": "desc"
        }"#,
    )
    .expect("config");
    config.validate().expect("valid");
    let live = records(json!([
        {"id": "a", "name": "Dishes"},
        {"id": "b", "name": "Laundry"},
        {"id": "c", "name": "Windows"}
    ]));
    let saved = store(json!({
        "a": ["someday"],
        "b": ["2024-01-05"],
        "c": ["2024-03-01"]
    }));
    let view = render(&config, &live, &saved);
    assert_eq!(ids(&view), vec!["c", "b", "a"]);
    assert_eq!(view.rows[0].data[0], CellValue::text("Windows"));
}

#[test]
fn dropdown_sorts_by_option_rank_not_alphabetically() {
    let config = TableConfig::new(vec![Column::dropdown("Priority", &["low", "mid", "high"])])
        .with_entity("sensor.store")
        .standalone()
        .with_sort(
            powertable::config::SortColumn::Index(0),
            powertable::config::SortDirection::Asc,
        );
    let saved = store(json!({
        "r1": ["high"],
        "r2": ["weird"],
        "r3": ["low"],
        "r4": ["mid"]
    }));
    let view = render(&config, &[], &saved);
    assert_eq!(ids(&view), vec!["r3", "r4", "r1", "r2"]);
}

#[test]
fn hidden_columns_keep_their_stored_slot() {
    let config = TableConfig::new(vec![
        Column::text("Secret").hidden(true),
        Column::text("Note"),
    ])
    .with_entity("sensor.store")
    .with_data_source(DataSourceConfig::sensor_attribute("sensor.x", "items", "id"));
    let saved = store(json!({"a": ["hidden value", "shown"]}));
    let view = render(&config, &records(json!([{"id": "a"}])), &saved);
    assert_eq!(view.columns.len(), 1);
    assert_eq!(view.rows[0].data, vec![CellValue::text("shown")]);
}

fn policy_config(if_missing: IfMissing) -> TableConfig {
    TableConfig::new(vec![Column::text("Note")])
        .with_entity("sensor.store")
        .with_data_source(DataSourceConfig::sensor_attribute("sensor.x", "items", "id"))
        .with_if_missing(if_missing)
}

proptest! {
    #[test]
    fn row_set_follows_missing_policy(
        live_ids in prop::collection::vec("[a-e]", 0..8),
        saved_ids in prop::collection::btree_set("[a-h]", 0..8),
        policy in prop_oneof![
            Just(IfMissing::Show),
            Just(IfMissing::Hide),
            Just(IfMissing::Disable),
            Just(IfMissing::Remove),
        ],
    ) {
        let live: Vec<LiveRecord> = live_ids
            .iter()
            .map(|id| json!({"id": id}).as_object().cloned().expect("object"))
            .collect();
        let saved: OverrideStore = saved_ids
            .iter()
            .map(|id| (id.clone(), vec![CellValue::text(id.as_str())]))
            .collect();
        let view = render(&policy_config(policy), &live, &saved);

        let unique_live: HashSet<&String> = live_ids.iter().collect();
        let missing = saved_ids.iter().filter(|id| !unique_live.contains(id)).count();
        let expected = match policy {
            IfMissing::Hide => unique_live.len(),
            _ => unique_live.len() + missing,
        };
        prop_assert_eq!(view.rows.len(), expected);

        let distinct: HashSet<&str> = ids(&view).into_iter().collect();
        prop_assert_eq!(distinct.len(), view.rows.len());
        for row in &view.rows {
            prop_assert_eq!(row.is_missing, !unique_live.contains(&row.item_id));
            prop_assert_eq!(row.data.len(), 1);
        }
    }
}
