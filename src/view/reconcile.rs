use crate::catalog::schema::{Column, TableSchema};
use crate::catalog::types::CellValue;
use crate::coercion::fill_slot;
use crate::config::{IfMissing, TableConfig};
use crate::source::{LiveRecord, record_identity};
use crate::store::{LAST_UPDATED_KEY, OverrideRow, OverrideStore};
use crate::view::{ViewContext, ViewRow};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Produces the unsorted row sequence: standalone rows straight from the
/// store, otherwise live rows followed by the missing rows the `if_missing`
/// policy keeps.
pub fn reconcile_rows(
    config: &TableConfig,
    schema: &TableSchema,
    records: &[LiveRecord],
    store: &OverrideStore,
    ctx: &ViewContext<'_>,
) -> Vec<ViewRow> {
    if config.standalone_mode {
        return standalone_rows(schema, store, ctx);
    }
    let primary_key = config.primary_key().unwrap_or_default();
    let (mut rows, live_ids) = live_rows(schema, records, store, primary_key, ctx);
    let live_count = rows.len();
    match config.if_missing {
        IfMissing::Show | IfMissing::Disable | IfMissing::Remove => {
            rows.extend(missing_rows(schema, store, &live_ids, ctx));
        }
        IfMissing::Hide => {}
    }
    debug!(
        live = live_count,
        missing = rows.len() - live_count,
        "reconciled table rows"
    );
    rows
}

/// Identities of the live records, skipping records without a usable key.
pub fn live_identities(records: &[LiveRecord], primary_key: &str) -> HashSet<String> {
    records
        .iter()
        .filter_map(|record| record_identity(record, primary_key))
        .filter(|id| id != LAST_UPDATED_KEY)
        .collect()
}

/// One row per live identity. A duplicate identity replaces the earlier row
/// in place, so the last record wins.
pub fn live_rows(
    schema: &TableSchema,
    records: &[LiveRecord],
    store: &OverrideStore,
    primary_key: &str,
    ctx: &ViewContext<'_>,
) -> (Vec<ViewRow>, HashSet<String>) {
    let mut rows: Vec<ViewRow> = Vec::with_capacity(records.len());
    let mut position: HashMap<String, usize> = HashMap::with_capacity(records.len());
    for record in records {
        let Some(item_id) = record_identity(record, primary_key) else {
            warn!(primary_key, "skipping live record without identity");
            continue;
        };
        if item_id == LAST_UPDATED_KEY {
            warn!(item_id = %item_id, "skipping live record with reserved identity");
            continue;
        }
        let saved = store.get(&item_id);
        let data = schema
            .display_columns()
            .map(|(full_idx, column)| {
                if column.is_content() {
                    content_value(record, column)
                } else {
                    stored_value(schema, saved, full_idx, column, ctx)
                }
            })
            .collect();
        let row = ViewRow {
            item_id: item_id.clone(),
            data,
            is_missing: false,
        };
        match position.get(&item_id) {
            Some(&idx) => {
                debug!(item_id = %item_id, "duplicate live identity, last record wins");
                rows[idx] = row;
            }
            None => {
                position.insert(item_id, rows.len());
                rows.push(row);
            }
        }
    }
    let ids = position.into_keys().collect();
    (rows, ids)
}

/// Rows for stored identities that are not live, in store order.
pub fn missing_rows(
    schema: &TableSchema,
    store: &OverrideStore,
    live_ids: &HashSet<String>,
    ctx: &ViewContext<'_>,
) -> Vec<ViewRow> {
    store
        .iter()
        .filter(|(id, _)| !live_ids.contains(*id))
        .map(|(id, saved)| ViewRow {
            item_id: id.to_string(),
            data: schema
                .display_columns()
                .map(|(full_idx, column)| {
                    if column.is_content() {
                        CellValue::text(ctx.missing_placeholder)
                    } else {
                        stored_value(schema, Some(saved), full_idx, column, ctx)
                    }
                })
                .collect(),
            is_missing: true,
        })
        .collect()
}

/// Every stored row in store order; the store order is the row order.
pub fn standalone_rows(
    schema: &TableSchema,
    store: &OverrideStore,
    ctx: &ViewContext<'_>,
) -> Vec<ViewRow> {
    store
        .iter()
        .map(|(id, saved)| ViewRow {
            item_id: id.to_string(),
            data: schema
                .display_columns()
                .map(|(full_idx, column)| stored_value(schema, Some(saved), full_idx, column, ctx))
                .collect(),
            is_missing: false,
        })
        .collect()
}

fn content_value(record: &LiveRecord, column: &Column) -> CellValue {
    let value = column
        .source
        .as_deref()
        .and_then(|source| record.get(source));
    match value {
        None | Some(serde_json::Value::Null) => CellValue::text(""),
        Some(value) => CellValue::from(value),
    }
}

fn stored_value(
    schema: &TableSchema,
    saved: Option<&OverrideRow>,
    full_idx: usize,
    column: &Column,
    ctx: &ViewContext<'_>,
) -> CellValue {
    let slot = schema.layout().slot_of(full_idx);
    let stored = saved.zip(slot).and_then(|(row, slot)| row.get(slot));
    fill_slot(stored, column, &ctx.coercion)
}
