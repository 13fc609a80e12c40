use crate::config::TableConfig;
use crate::error::PowerTableError;
use crate::store::{StoreReader, StoreWriter};
use serde_json::Value;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Store adapter that keeps the whole persisted document in one JSON file.
/// The entity reference is only used in error messages; one file holds one
/// table's document.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &TableConfig) -> Result<Self, PowerTableError> {
        match config.path_to_storage_json.as_deref() {
            Some(path) if !path.trim().is_empty() => Ok(Self::new(path)),
            _ => Err(PowerTableError::invalid_config(
                "path_to_storage_json is required for the file store",
            )),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StoreReader for FileStore {
    fn read_store(&self, entity: &str) -> Result<Option<Value>, PowerTableError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(PowerTableError::StoreUnavailable {
                    entity: entity.to_string(),
                    message: err.to_string(),
                });
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| PowerTableError::Decode(format!("{}: {e}", self.path.display())))
    }
}

impl StoreWriter for FileStore {
    fn write_store(&self, entity: &str, document: &Value) -> Result<(), PowerTableError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let bytes =
            serde_json::to_vec_pretty(document).map_err(|e| PowerTableError::Encode(e.to_string()))?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| PowerTableError::PersistFailure {
                entity: entity.to_string(),
                message: e.error.to_string(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::FileStore;
    use crate::config::TableConfig;
    use crate::store::{StoreReader, StoreWriter};
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempdir().expect("temp");
        let store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.read_store("input_text.t").expect("read"), None);
    }

    #[test]
    fn write_then_read_replaces_whole_document() {
        let dir = tempdir().expect("temp");
        let store = FileStore::new(dir.path().join("nested").join("store.json"));
        store
            .write_store("input_text.t", &json!({"row_data": {"a": ["x"]}}))
            .expect("first write");
        store
            .write_store("input_text.t", &json!({"row_data": {"b": [true]}}))
            .expect("second write");
        let document = store.read_store("input_text.t").expect("read");
        assert_eq!(document, Some(json!({"row_data": {"b": [true]}})));
    }

    #[test]
    fn malformed_file_is_a_decode_error() {
        let dir = tempdir().expect("temp");
        let path = dir.path().join("store.json");
        fs::write(&path, b"{not json").expect("seed");
        let err = FileStore::new(&path)
            .read_store("input_text.t")
            .expect_err("must fail");
        assert_eq!(err.code_str(), "decode");
    }

    #[test]
    fn from_config_requires_a_path() {
        let config = TableConfig::from_json_str(
            r#"{"entity": "input_text.t", "standalone_mode": true, "columns": [{"name": "A"}]}"#,
        )
        .expect("config");
        let err = FileStore::from_config(&config).expect_err("no path");
        assert_eq!(err.code_str(), "invalid_config");
    }
}
