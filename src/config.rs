use crate::catalog::dates::{DEFAULT_DATE_FORMAT, DateFormat};
use crate::catalog::schema::{Column, TableSchema};
use crate::error::PowerTableError;
use crate::permission::EditPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MISSING_PLACEHOLDER: &str = "N/A (Missing)";
pub const SENSOR_ATTRIBUTE_SOURCE: &str = "sensor_attribute";

/// What happens to persisted rows whose identity is no longer live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfMissing {
    #[default]
    Show,
    Hide,
    /// Shown like `Show`, but missing rows are read-only.
    Disable,
    /// Shown like `Show`; stale rows are deleted on the next mutation.
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Sort column given either by display name or by display index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortColumn {
    Index(i64),
    Name(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    #[serde(rename = "type", default)]
    pub source_type: String,
    #[serde(default)]
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_path: Option<String>,
    #[serde(default)]
    pub primary_key: String,
}

impl DataSourceConfig {
    pub fn sensor_attribute(
        entity_id: impl Into<String>,
        attribute_path: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> Self {
        Self {
            source_type: SENSOR_ATTRIBUTE_SOURCE.to_string(),
            entity_id: entity_id.into(),
            attribute_path: Some(attribute_path.into()),
            primary_key: primary_key.into(),
        }
    }
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

/// Card configuration as supplied by the host. Unknown keys are ignored so
/// presentation options can live in the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSourceConfig>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub editable: EditPolicy,
    #[serde(default)]
    pub if_missing: IfMissing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_column: Option<SortColumn>,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default)]
    pub standalone_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_to_storage_json: Option<String>,
}

impl TableConfig {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            entity: None,
            data_source: None,
            columns,
            editable: EditPolicy::default(),
            if_missing: IfMissing::default(),
            sort_column: None,
            sort_direction: SortDirection::default(),
            date_format: default_date_format(),
            standalone_mode: false,
            path_to_storage_json: None,
        }
    }

    /// Parses a card configuration. The result is not validated.
    pub fn from_json_str(input: &str) -> Result<Self, PowerTableError> {
        serde_json::from_str(input)
            .map_err(|e| PowerTableError::invalid_config(format!("malformed configuration: {e}")))
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_data_source(mut self, data_source: DataSourceConfig) -> Self {
        self.data_source = Some(data_source);
        self
    }

    pub fn with_editable(mut self, editable: EditPolicy) -> Self {
        self.editable = editable;
        self
    }

    pub fn with_if_missing(mut self, if_missing: IfMissing) -> Self {
        self.if_missing = if_missing;
        self
    }

    pub fn with_sort(mut self, column: SortColumn, direction: SortDirection) -> Self {
        self.sort_column = Some(column);
        self.sort_direction = direction;
        self
    }

    pub fn with_date_format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = date_format.into();
        self
    }

    pub fn standalone(mut self) -> Self {
        self.standalone_mode = true;
        self
    }

    pub fn with_storage_path(mut self, path: impl Into<String>) -> Self {
        self.path_to_storage_json = Some(path.into());
        self
    }

    pub fn schema(&self) -> TableSchema {
        TableSchema::new(self.columns.clone())
    }

    pub fn date_format(&self) -> DateFormat {
        DateFormat::new(&self.date_format)
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.data_source
            .as_ref()
            .map(|ds| ds.primary_key.as_str())
            .filter(|pk| !pk.is_empty())
    }

    /// Every visible column is a content column: the table shows live data
    /// only and has no store. Never true in standalone mode.
    pub fn is_pure_readonly(&self) -> bool {
        !self.standalone_mode
            && !self.columns.is_empty()
            && self
                .columns
                .iter()
                .filter(|c| !c.hidden)
                .all(Column::is_content)
    }

    pub fn validate(&self) -> Result<(), PowerTableError> {
        if self.columns.is_empty() {
            return Err(PowerTableError::invalid_config(
                "columns must be a non-empty list",
            ));
        }
        let missing_entity = self.entity.as_deref().is_none_or(|e| e.trim().is_empty());
        if missing_entity && !self.is_pure_readonly() {
            return Err(PowerTableError::invalid_config("storage entity is not set"));
        }
        if self.standalone_mode {
            if let Some(column) = self.columns.iter().find(|c| c.is_content()) {
                return Err(PowerTableError::invalid_config(format!(
                    "content column '{}' is not allowed in standalone mode",
                    column.name
                )));
            }
        } else {
            let Some(data_source) = &self.data_source else {
                return Err(PowerTableError::invalid_config(
                    "data_source is required unless standalone_mode is enabled",
                ));
            };
            if data_source.primary_key.trim().is_empty() {
                return Err(PowerTableError::invalid_config(
                    "data_source.primary_key is required for matching",
                ));
            }
        }
        Ok(())
    }
}

/// Knobs of the core itself, as opposed to the card configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Delay before the re-save that follows a schema migration, so it
    /// does not race an edit already in flight.
    pub migration_resave_delay: Duration,
    /// Text shown in content cells of rows whose identity is not live.
    pub missing_placeholder: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            migration_resave_delay: Duration::from_millis(1_000),
            missing_placeholder: DEFAULT_MISSING_PLACEHOLDER.to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn with_migration_resave_delay(mut self, delay: Duration) -> Self {
        self.migration_resave_delay = delay;
        self
    }

    pub fn with_missing_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.missing_placeholder = placeholder.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{IfMissing, SortColumn, SortDirection, TableConfig};
    use crate::catalog::schema::Column;
    use crate::permission::EditPolicy;

    fn sensor_config(extra: &str) -> String {
        format!(
            r#"{{
                "entity": "sensor.tasks_store",
                "data_source": {{"type": "sensor_attribute", "entity_id": "sensor.tasks", "attribute_path": "items", "primary_key": "id"}},
                "columns": [{{"name": "Task", "type": "content", "source": "name"}}, {{"name": "Done", "type": "checkbox"}}]
                {extra}
            }}"#
        )
    }

    #[test]
    fn defaults_match_card_behaviour() {
        let config = TableConfig::from_json_str(&sensor_config("")).expect("parse");
        assert_eq!(config.editable, EditPolicy::everyone());
        assert_eq!(config.if_missing, IfMissing::Show);
        assert_eq!(config.sort_direction, SortDirection::Asc);
        assert_eq!(config.sort_column, None);
        assert_eq!(config.date_format, "isoDate");
        assert!(!config.standalone_mode);
        assert_eq!(config.primary_key(), Some("id"));
        config.validate().expect("valid");
    }

    #[test]
    fn sort_column_accepts_name_or_index() {
        let by_name = TableConfig::from_json_str(&sensor_config(
            r#", "sort_column": "Done", "sort_direction": "desc", "if_missing": "remove", "show_header": false"#,
        ))
        .expect("parse");
        assert_eq!(by_name.sort_column, Some(SortColumn::Name("Done".into())));
        assert_eq!(by_name.sort_direction, SortDirection::Desc);
        assert_eq!(by_name.if_missing, IfMissing::Remove);

        let by_index =
            TableConfig::from_json_str(&sensor_config(r#", "sort_column": 7"#)).expect("parse");
        assert_eq!(by_index.sort_column, Some(SortColumn::Index(7)));
    }

    #[test]
    fn validation_errors() {
        let empty = TableConfig::new(vec![]).with_entity("x");
        assert!(empty.validate().is_err());

        let no_entity = TableConfig::new(vec![Column::text("A")]).standalone();
        let err = no_entity.validate().expect_err("entity required");
        assert_eq!(err.code_str(), "invalid_config");

        let no_source = TableConfig::new(vec![Column::text("A")]).with_entity("x");
        assert!(no_source.validate().is_err());

        let content_standalone = TableConfig::new(vec![Column::content("C", "c")])
            .with_entity("x")
            .standalone();
        assert!(content_standalone.validate().is_err());

        let mut blank_key: TableConfig =
            TableConfig::from_json_str(&sensor_config("")).expect("parse");
        if let Some(ds) = blank_key.data_source.as_mut() {
            ds.primary_key.clear();
        }
        assert!(blank_key.validate().is_err());
    }

    #[test]
    fn pure_readonly_needs_no_entity() {
        let config = TableConfig::from_json_str(
            r#"{
                "data_source": {"type": "sensor_attribute", "entity_id": "sensor.x", "primary_key": "id"},
                "columns": [{"name": "Name", "type": "content", "source": "name"}, {"name": "Note", "hidden": true}]
            }"#,
        )
        .expect("parse");
        assert!(config.is_pure_readonly());
        config.validate().expect("valid without entity");
        assert!(!config.clone().standalone().is_pure_readonly());
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        let err = TableConfig::from_json_str("{").expect_err("malformed");
        assert_eq!(err.code_str(), "invalid_config");
    }
}
