use crate::error::PowerTableError;
use crate::store::{StoreReader, StoreWriter};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// In-process store keyed by entity reference.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Value>>,
    writes: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, entity: impl Into<String>, document: Value) -> Self {
        self.documents.lock().insert(entity.into(), document);
        self
    }

    pub fn document(&self, entity: &str) -> Option<Value> {
        self.documents.lock().get(entity).cloned()
    }

    /// Number of successful `write_store` calls so far.
    pub fn write_count(&self) -> u64 {
        *self.writes.lock()
    }
}

impl StoreReader for MemoryStore {
    fn read_store(&self, entity: &str) -> Result<Option<Value>, PowerTableError> {
        Ok(self.document(entity))
    }
}

impl StoreWriter for MemoryStore {
    fn write_store(&self, entity: &str, document: &Value) -> Result<(), PowerTableError> {
        self.documents
            .lock()
            .insert(entity.to_string(), document.clone());
        *self.writes.lock() += 1;
        Ok(())
    }
}
