pub mod reconcile;
pub mod sort;

use crate::catalog::schema::{Column, TableSchema};
use crate::catalog::types::CellValue;
use crate::coercion::{CoercionContext, sanitize};
use crate::config::TableConfig;
use crate::source::LiveRecord;
use crate::store::OverrideStore;
use serde::Serialize;
use tracing::debug;

pub use reconcile::reconcile_rows;
pub use sort::{locale_compare, resolve_sort_column, sort_rows};

/// One displayed row: one value per visible column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRow {
    pub item_id: String,
    pub data: Vec<CellValue>,
    /// The identity has persisted edits but no live record.
    pub is_missing: bool,
}

impl ViewRow {
    pub fn cell(&self, display_index: usize) -> Option<&CellValue> {
        self.data.get(display_index)
    }
}

/// The projection every render and edit derives from. Rebuilt on each read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub columns: Vec<Column>,
    pub rows: Vec<ViewRow>,
}

impl TableView {
    pub fn row_by_id(&self, item_id: &str) -> Option<&ViewRow> {
        self.rows.iter().find(|row| row.item_id == item_id)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Copy of the view with every cell passed through sanitization for its
    /// column type.
    pub fn sanitized(&self, ctx: &CoercionContext<'_>) -> TableView {
        let rows = self
            .rows
            .iter()
            .map(|row| ViewRow {
                item_id: row.item_id.clone(),
                data: row
                    .data
                    .iter()
                    .enumerate()
                    .map(|(idx, cell)| match self.columns.get(idx) {
                        Some(column) => sanitize(cell.clone(), &column.kind, ctx),
                        None => cell.clone(),
                    })
                    .collect(),
                is_missing: row.is_missing,
            })
            .collect();
        TableView {
            columns: self.columns.clone(),
            rows,
        }
    }
}

/// Inputs of a view computation besides the data itself.
#[derive(Debug, Clone, Copy)]
pub struct ViewContext<'a> {
    pub coercion: CoercionContext<'a>,
    pub missing_placeholder: &'a str,
}

impl<'a> ViewContext<'a> {
    pub fn new(coercion: CoercionContext<'a>, missing_placeholder: &'a str) -> Self {
        Self {
            coercion,
            missing_placeholder,
        }
    }
}

/// Builds the table view from a configuration, the live records and the
/// (already migrated) override store. Pure: same inputs, same view.
pub fn compute_table_view(
    config: &TableConfig,
    records: &[LiveRecord],
    store: &OverrideStore,
    ctx: &ViewContext<'_>,
) -> TableView {
    let schema = config.schema();
    compute_with_schema(config, &schema, records, store, ctx)
}

pub(crate) fn compute_with_schema(
    config: &TableConfig,
    schema: &TableSchema,
    records: &[LiveRecord],
    store: &OverrideStore,
    ctx: &ViewContext<'_>,
) -> TableView {
    let mut rows = reconcile_rows(config, schema, records, store, ctx);
    if let Some(sort_index) = resolve_sort_column(config.sort_column.as_ref(), schema) {
        debug!(
            sort_index,
            direction = ?config.sort_direction,
            rows = rows.len(),
            "sorting table view"
        );
        sort_rows(&mut rows, schema, sort_index, config.sort_direction);
    }
    TableView {
        columns: schema.display_columns().map(|(_, c)| c.clone()).collect(),
        rows,
    }
}
