use crate::catalog::types::CellValue;
use crate::config::{DataSourceConfig, SENSOR_ATTRIBUTE_SOURCE};
use crate::error::PowerTableError;
use crate::store::{ROW_DATA_KEY, StoreReader, json_kind};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// One item of the live feed: field name to value.
pub type LiveRecord = Map<String, Value>;

/// Field added to records built from a dictionary payload, holding the key
/// the record was stored under.
pub const DICT_KEY_FIELD: &str = "_key";

pub trait LiveSource: Send + Sync {
    /// Fetches the current live records. A source that is simply absent
    /// returns `SourceUnavailable`; callers treat that as an empty feed.
    fn fetch(&self, source: &DataSourceConfig) -> Result<Vec<LiveRecord>, PowerTableError>;
}

/// Read access to the host's entity states.
pub trait HostStates: Send + Sync {
    fn entity_state(&self, entity_id: &str) -> Option<String>;
    fn entity_attributes(&self, entity_id: &str) -> Option<Map<String, Value>>;
}

/// Host states held as a JSON document shaped
/// `{ "<entity_id>": { "state": "...", "attributes": { ... } } }`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatesDocument(Value);

impl StatesDocument {
    pub fn new(document: Value) -> Self {
        Self(document)
    }

    pub fn from_json_str(input: &str) -> Result<Self, PowerTableError> {
        serde_json::from_str(input)
            .map(Self)
            .map_err(|e| PowerTableError::Decode(format!("states document: {e}")))
    }

    fn entity(&self, entity_id: &str) -> Option<&Map<String, Value>> {
        self.0.get(entity_id)?.as_object()
    }
}

impl HostStates for StatesDocument {
    fn entity_state(&self, entity_id: &str) -> Option<String> {
        let state = self.entity(entity_id)?.get("state")?;
        Some(match state {
            Value::String(s) => s.clone(),
            other => CellValue::from(other).display_string(),
        })
    }

    fn entity_attributes(&self, entity_id: &str) -> Option<Map<String, Value>> {
        match self.entity(entity_id)?.get("attributes") {
            Some(Value::Object(attributes)) => Some(attributes.clone()),
            _ => Some(Map::new()),
        }
    }
}

/// Source used in standalone mode: never any live records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSource;

impl LiveSource for NoSource {
    fn fetch(&self, _source: &DataSourceConfig) -> Result<Vec<LiveRecord>, PowerTableError> {
        Ok(Vec::new())
    }
}

/// Live source reading a list (or dictionary) out of an entity attribute.
#[derive(Clone)]
pub struct AttributeSource {
    states: Arc<dyn HostStates>,
}

impl AttributeSource {
    pub fn new(states: Arc<dyn HostStates>) -> Self {
        Self { states }
    }

    fn resolve_attribute(&self, source: &DataSourceConfig) -> Result<Value, PowerTableError> {
        let entity_id = source.entity_id.as_str();
        let Some(attributes) = self.states.entity_attributes(entity_id) else {
            return Err(PowerTableError::source_unavailable(entity_id, "entity not found"));
        };
        let path = source.attribute_path.as_deref().unwrap_or_default();
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = attributes.get(first).cloned().unwrap_or(Value::Null);
        for segment in segments {
            let next = match &mut current {
                Value::Object(map) => map.remove(segment),
                _ => None,
            };
            let Some(next) = next else {
                return Err(PowerTableError::source_unavailable(
                    entity_id,
                    format!("path segment '{segment}' of '{path}' not found"),
                ));
            };
            current = next;
        }
        if is_falsy(&current) {
            return Err(PowerTableError::source_unavailable(
                entity_id,
                format!("attribute '{path}' not found"),
            ));
        }
        Ok(current)
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

impl LiveSource for AttributeSource {
    fn fetch(&self, source: &DataSourceConfig) -> Result<Vec<LiveRecord>, PowerTableError> {
        if source.source_type != SENSOR_ATTRIBUTE_SOURCE {
            debug!(source_type = %source.source_type, "unsupported source type, no live records");
            return Ok(Vec::new());
        }
        let mut payload = self.resolve_attribute(source)?;
        if let Value::String(raw) = &payload {
            payload = serde_json::from_str(raw).map_err(|e| {
                PowerTableError::source_unavailable(
                    source.entity_id.as_str(),
                    format!("attribute is not valid JSON: {e}"),
                )
            })?;
        }
        let records = match payload {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    other => {
                        debug!(kind = json_kind(&other), "skipping non-object live item");
                        None
                    }
                })
                .collect(),
            Value::Object(entries) => entries
                .into_iter()
                .filter_map(|(key, item)| match item {
                    Value::Object(mut record) => {
                        let has_key = record
                            .get(DICT_KEY_FIELD)
                            .is_some_and(|existing| !is_falsy(existing));
                        if !has_key {
                            record.insert(DICT_KEY_FIELD.to_string(), Value::String(key));
                        }
                        Some(record)
                    }
                    other => {
                        debug!(key = %key, kind = json_kind(&other), "skipping non-object live item");
                        None
                    }
                })
                .collect(),
            other => {
                return Err(PowerTableError::source_unavailable(
                    source.entity_id.as_str(),
                    format!("attribute has unsupported type {}", json_kind(&other)),
                ));
            }
        };
        Ok(records)
    }
}

/// Store reader over host states: the persisted document lives in the
/// `row_data` attribute of the store entity.
#[derive(Clone)]
pub struct EntityStoreReader {
    states: Arc<dyn HostStates>,
}

impl EntityStoreReader {
    pub fn new(states: Arc<dyn HostStates>) -> Self {
        Self { states }
    }
}

impl StoreReader for EntityStoreReader {
    fn read_store(&self, entity: &str) -> Result<Option<Value>, PowerTableError> {
        let Some(attributes) = self.states.entity_attributes(entity) else {
            return Ok(None);
        };
        Ok(attributes.get(ROW_DATA_KEY).map(|row_data| {
            let mut document = Map::new();
            document.insert(ROW_DATA_KEY.to_string(), row_data.clone());
            Value::Object(document)
        }))
    }
}

/// Identity of a live record: the primary-key field as a string. Absent,
/// null and empty keys yield `None`.
pub fn record_identity(record: &LiveRecord, primary_key: &str) -> Option<String> {
    let identity = match record.get(primary_key)? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => CellValue::from(other).display_string(),
    };
    (!identity.is_empty()).then_some(identity)
}

#[cfg(test)]
mod tests {
    use super::{
        AttributeSource, EntityStoreReader, HostStates, LiveSource, StatesDocument,
        record_identity,
    };
    use crate::config::DataSourceConfig;
    use crate::store::StoreReader;
    use serde_json::json;
    use std::sync::Arc;

    fn states() -> Arc<StatesDocument> {
        Arc::new(StatesDocument::new(json!({
            "sensor.tasks": {
                "state": "ok",
                "attributes": {
                    "items": [{"id": 1, "name": "wash"}, "junk", {"id": "b"}],
                    "encoded": "[{\"id\": \"x\"}]",
                    "broken": "[{",
                    "nested": {"map": {"k1": {"name": "a"}, "k2": {"_key": "own", "name": "b"}}},
                    "count": 3
                }
            },
            "input_text.store": {
                "state": "",
                "attributes": {"row_data": {"a": ["x"], "_last_updated": 1}}
            }
        })))
    }

    fn fetch(path: &str) -> Result<Vec<super::LiveRecord>, crate::error::PowerTableError> {
        AttributeSource::new(states()).fetch(&DataSourceConfig::sensor_attribute(
            "sensor.tasks",
            path,
            "id",
        ))
    }

    #[test]
    fn array_payload_keeps_object_items() {
        let records = fetch("items").expect("fetch");
        assert_eq!(records.len(), 2);
        assert_eq!(record_identity(&records[0], "id").as_deref(), Some("1"));
        assert_eq!(record_identity(&records[1], "id").as_deref(), Some("b"));
    }

    #[test]
    fn string_payload_is_parsed() {
        let records = fetch("encoded").expect("fetch");
        assert_eq!(records[0]["id"], json!("x"));
        let err = fetch("broken").expect_err("invalid json");
        assert_eq!(err.code_str(), "source_unavailable");
    }

    #[test]
    fn nested_dict_payload_gets_key_field() {
        let records = fetch("nested.map").expect("fetch");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["_key"], json!("k1"));
        assert_eq!(records[1]["_key"], json!("own"));
    }

    #[test]
    fn missing_entity_path_or_bad_type_is_unavailable() {
        assert!(fetch("nested.nope").is_err());
        assert!(fetch("absent").is_err());
        assert!(fetch("count").is_err());
        let other = AttributeSource::new(states())
            .fetch(&DataSourceConfig::sensor_attribute("sensor.none", "items", "id"));
        assert_eq!(
            other.expect_err("no entity").code_str(),
            "source_unavailable"
        );
    }

    #[test]
    fn unknown_source_type_yields_no_records() {
        let mut source = DataSourceConfig::sensor_attribute("sensor.tasks", "items", "id");
        source.source_type = "rest".into();
        let records = AttributeSource::new(states()).fetch(&source).expect("fetch");
        assert!(records.is_empty());
    }

    #[test]
    fn identity_skips_blank_keys() {
        let record = json!({"id": null, "n": 2.0, "s": "", "b": true})
            .as_object()
            .cloned()
            .expect("object");
        assert_eq!(record_identity(&record, "id"), None);
        assert_eq!(record_identity(&record, "missing"), None);
        assert_eq!(record_identity(&record, "s"), None);
        assert_eq!(record_identity(&record, "n").as_deref(), Some("2"));
        assert_eq!(record_identity(&record, "b").as_deref(), Some("true"));
    }

    #[test]
    fn entity_store_reader_wraps_row_data() {
        let states = states();
        assert_eq!(states.entity_state("sensor.tasks").as_deref(), Some("ok"));
        let reader = EntityStoreReader::new(states);
        let document = reader.read_store("input_text.store").expect("read");
        assert_eq!(
            document,
            Some(json!({"row_data": {"a": ["x"], "_last_updated": 1}}))
        );
        assert_eq!(reader.read_store("sensor.tasks").expect("read"), None);
        assert_eq!(reader.read_store("input_text.none").expect("read"), None);
    }
}
