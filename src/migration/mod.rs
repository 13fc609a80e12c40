use crate::catalog::schema::TableSchema;
use crate::catalog::types::CellValue;
use crate::coercion::{CoercionContext, default_value};
use crate::store::{OverrideRow, OverrideStore, RawRows, json_kind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Identities whose rows were repaired while reading the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Rows that were shorter than the slot layout and got trailing defaults.
    pub padded: Vec<String>,
    /// Rows that were longer than the slot layout and lost trailing slots.
    pub trimmed: Vec<String>,
    /// Rows that were not arrays and were replaced by a defaulted row.
    pub reset: Vec<String>,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        self.padded.is_empty() && self.trimmed.is_empty() && self.reset.is_empty()
    }

    pub fn migrated_rows(&self) -> usize {
        self.padded.len() + self.trimmed.len() + self.reset.len()
    }
}

/// A row holding the default of every stored column, in slot order.
pub fn default_row(schema: &TableSchema, ctx: &CoercionContext<'_>) -> OverrideRow {
    schema
        .stored_columns()
        .map(|column| default_value(column, ctx))
        .collect()
}

/// Brings every persisted row to the current slot layout. Short rows are
/// padded with the defaults of the columns they lack, long rows are
/// truncated, and anything that is not an array is replaced wholesale.
/// Store order is kept.
pub fn migrate_rows(
    raw: RawRows,
    schema: &TableSchema,
    ctx: &CoercionContext<'_>,
) -> (OverrideStore, MigrationReport) {
    let stored: Vec<_> = schema.stored_columns().collect();
    let expected = stored.len();
    let mut report = MigrationReport::default();
    let mut store = OverrideStore::new();

    for (id, value) in raw {
        let slots = match value {
            serde_json::Value::Array(slots) => slots,
            other => {
                warn!(item_id = %id, kind = json_kind(&other), "invalid row data, resetting to defaults");
                report.reset.push(id.clone());
                store.insert(id, default_row(schema, ctx));
                continue;
            }
        };
        let mut row: OverrideRow = slots.into_iter().map(CellValue::from).collect();
        if row.len() < expected {
            info!(item_id = %id, from = row.len(), to = expected, "padding row to current columns");
            let fill = stored[row.len()..]
                .iter()
                .map(|column| default_value(column, ctx));
            row.extend(fill);
            report.padded.push(id.clone());
        } else if row.len() > expected {
            info!(item_id = %id, from = row.len(), to = expected, "trimming row to current columns");
            row.truncate(expected);
            report.trimmed.push(id.clone());
        }
        store.insert(id, row);
    }

    if !report.is_empty() {
        info!(
            rows = report.migrated_rows(),
            slots = expected,
            "override store migrated to current columns"
        );
    }
    (store, report)
}

#[cfg(test)]
mod tests {
    use super::{default_row, migrate_rows};
    use crate::catalog::dates::DateFormat;
    use crate::catalog::schema::{Column, TableSchema};
    use crate::catalog::types::CellValue;
    use crate::coercion::CoercionContext;
    use crate::store::RawRows;
    use chrono::{NaiveDate, NaiveDateTime};
    use proptest::prelude::*;
    use serde_json::{Value, json};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .expect("date")
            .and_hms_opt(12, 0, 0)
            .expect("time")
    }

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            Column::content("Name", "name"),
            Column::text("Note"),
            Column::checkbox("Done"),
            Column::number("Qty", Some(1.0), None),
        ])
    }

    fn raw(value: Value) -> RawRows {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn pads_trims_and_resets() {
        let format = DateFormat::default();
        let ctx = CoercionContext::new(&format, now());
        let (store, report) = migrate_rows(
            raw(json!({
                "short": ["a"],
                "exact": ["b", true, 4],
                "long": ["c", false, 2, "extra", 9],
                "broken": {"not": "a row"}
            })),
            &schema(),
            &ctx,
        );
        assert_eq!(report.padded, vec!["short".to_string()]);
        assert_eq!(report.trimmed, vec!["long".to_string()]);
        assert_eq!(report.reset, vec!["broken".to_string()]);
        assert_eq!(
            store.get("short"),
            Some(&vec![
                CellValue::text("a"),
                CellValue::Bool(false),
                CellValue::Number(1.0)
            ])
        );
        assert_eq!(store.get("long").map(Vec::len), Some(3));
        assert_eq!(store.get("broken"), Some(&default_row(&schema(), &ctx)));
        assert_eq!(
            store.ids().collect::<Vec<_>>(),
            vec!["short", "exact", "long", "broken"]
        );
    }

    #[test]
    fn well_formed_store_needs_no_migration() {
        let format = DateFormat::default();
        let ctx = CoercionContext::new(&format, now());
        let (_, report) = migrate_rows(raw(json!({"a": ["x", true, 3]})), &schema(), &ctx);
        assert!(report.is_empty());
    }

    fn cell_json() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            (-1000i64..1000).prop_map(Value::from),
            "[a-z]{0,6}".prop_map(Value::from),
        ]
    }

    fn row_json() -> impl Strategy<Value = Value> {
        prop_oneof![
            4 => prop::collection::vec(cell_json(), 0..8).prop_map(Value::Array),
            1 => cell_json(),
        ]
    }

    fn column_set() -> impl Strategy<Value = Vec<Column>> {
        prop::collection::vec(
            prop_oneof![
                Just(Column::text("t")),
                Just(Column::checkbox("c")),
                Just(Column::number("n", None, None)),
                Just(Column::dropdown("d", &["x", "y"])),
                Just(Column::date("dt")),
                Just(Column::content("k", "k")),
            ],
            1..6,
        )
    }

    proptest! {
        #[test]
        fn migrated_rows_match_slot_count(
            columns in column_set(),
            rows in prop::collection::btree_map("[a-z]{1,4}", row_json(), 0..8),
        ) {
            let schema = TableSchema::new(columns);
            let format = DateFormat::default();
            let ctx = CoercionContext::new(&format, now());
            let raw: RawRows = rows.into_iter().collect();
            let (store, _) = migrate_rows(raw, &schema, &ctx);
            for (_, row) in store.iter() {
                prop_assert_eq!(row.len(), schema.slot_count());
            }
        }

        #[test]
        fn migration_is_idempotent(
            columns in column_set(),
            rows in prop::collection::btree_map("[a-z]{1,4}", row_json(), 0..8),
        ) {
            let schema = TableSchema::new(columns);
            let format = DateFormat::default();
            let ctx = CoercionContext::new(&format, now());
            let raw: RawRows = rows.into_iter().collect();
            let (once, _) = migrate_rows(raw, &schema, &ctx);
            let (twice, report) = migrate_rows(once.to_row_data(), &schema, &ctx);
            prop_assert!(report.is_empty());
            prop_assert_eq!(once, twice);
        }
    }
}
