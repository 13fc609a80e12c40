pub mod file;
pub mod memory;

use crate::catalog::schema::TableSchema;
use crate::catalog::types::CellValue;
use crate::coercion::{CoercionContext, fill_slot};
use crate::error::PowerTableError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;

pub use file::FileStore;
pub use memory::MemoryStore;

pub const ROW_DATA_KEY: &str = "row_data";
/// Save timestamp written next to the rows so the host sees every save as
/// a state change. Never row data.
pub const LAST_UPDATED_KEY: &str = "_last_updated";

pub type OverrideRow = Vec<CellValue>;

/// Rows exactly as read from the persisted document, before migration.
pub type RawRows = Map<String, Value>;

pub trait StoreReader: Send + Sync {
    /// Returns the persisted document for `entity`, or `None` when nothing
    /// has been stored yet.
    fn read_store(&self, entity: &str) -> Result<Option<Value>, PowerTableError>;
}

pub trait StoreWriter: Send + Sync {
    /// Replaces the whole persisted document for `entity`.
    fn write_store(&self, entity: &str, document: &Value) -> Result<(), PowerTableError>;
}

/// Persisted edits keyed by item identity. Iteration follows insertion
/// order, which is the authoritative row order in standalone mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideStore {
    order: Vec<String>,
    rows: HashMap<String, OverrideRow>,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&OverrideRow> {
        self.rows.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut OverrideRow> {
        self.rows.get_mut(id)
    }

    /// Inserts or replaces a row. New identities are appended; replaced ones
    /// keep their position.
    pub fn insert(&mut self, id: impl Into<String>, row: OverrideRow) {
        let id = id.into();
        if self.rows.insert(id.clone(), row).is_none() {
            self.order.push(id);
        }
    }

    /// Inserts a new row at `index` (clamped to the end). Replaces in place
    /// when the identity already exists.
    pub fn insert_at(&mut self, index: usize, id: impl Into<String>, row: OverrideRow) {
        let id = id.into();
        if self.rows.insert(id.clone(), row).is_none() {
            let index = index.min(self.order.len());
            self.order.insert(index, id);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<OverrideRow> {
        let removed = self.rows.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let rows = &mut self.rows;
        self.order.retain(|id| {
            let kept = keep(id);
            if !kept {
                rows.remove(id);
            }
            kept
        });
    }

    /// Swaps the rows at two positions of the iteration order.
    pub fn swap_positions(&mut self, a: usize, b: usize) -> bool {
        if a >= self.order.len() || b >= self.order.len() {
            return false;
        }
        self.order.swap(a, b);
        true
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OverrideRow)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.rows.get(id).map(|row| (id.as_str(), row)))
    }

    /// Rows as the persisted `row_data` mapping, without the timestamp.
    pub fn to_row_data(&self) -> RawRows {
        self.iter()
            .map(|(id, row)| {
                let slots = row.iter().cloned().map(Value::from).collect();
                (id.to_string(), Value::Array(slots))
            })
            .collect()
    }
}

impl FromIterator<(String, OverrideRow)> for OverrideStore {
    fn from_iter<I: IntoIterator<Item = (String, OverrideRow)>>(iter: I) -> Self {
        let mut store = OverrideStore::new();
        for (id, row) in iter {
            store.insert(id, row);
        }
        store
    }
}

/// Extracts the row mapping from a persisted document, dropping the
/// reserved timestamp key wherever it appears.
pub fn decode_document(document: &Value) -> RawRows {
    let Some(row_data) = document.get(ROW_DATA_KEY) else {
        return RawRows::new();
    };
    match row_data {
        Value::Object(rows) => {
            let mut rows = rows.clone();
            rows.remove(LAST_UPDATED_KEY);
            rows
        }
        Value::Null => RawRows::new(),
        other => {
            warn!(
                kind = json_kind(other),
                "row_data is not an object, treating store as empty"
            );
            RawRows::new()
        }
    }
}

pub fn encode_document(store: &OverrideStore, saved_at_millis: i64) -> Value {
    let mut row_data = store.to_row_data();
    row_data.insert(LAST_UPDATED_KEY.to_string(), Value::from(saved_at_millis));
    let mut document = Map::new();
    document.insert(ROW_DATA_KEY.to_string(), Value::Object(row_data));
    Value::Object(document)
}

/// Replaces unset slots (null, or empty text in a non-text column) with
/// the column default so the persisted document never carries holes.
pub fn normalize_for_save(
    store: &mut OverrideStore,
    schema: &TableSchema,
    ctx: &CoercionContext<'_>,
) {
    let stored: Vec<_> = schema.stored_columns().collect();
    for id in store.order.clone() {
        let Some(row) = store.rows.get_mut(&id) else {
            continue;
        };
        for (slot, value) in row.iter_mut().enumerate() {
            let Some(column) = stored.get(slot) else {
                break;
            };
            *value = fill_slot(Some(value), column, ctx);
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
