use powertable::catalog::schema::ColumnKind;
use powertable::config::{IfMissing, SortColumn, SortDirection, TableConfig};
use powertable::error::PowerTableErrorCode;
use powertable::permission::EditPolicy;

fn parse(raw: &str) -> TableConfig {
    TableConfig::from_json_str(raw).expect("config")
}

fn rejection(raw: &str) -> String {
    let err = parse(raw).validate().expect_err("invalid");
    assert_eq!(err.code(), PowerTableErrorCode::InvalidConfig);
    err.to_string()
}

#[test]
fn full_card_config_is_understood() {
    let config = parse(
        r#"{
            "entity": "sensor.rooms_store",
            "data_source": {
                "type": "sensor_attribute",
                "entity_id": "sensor.rooms",
                "attribute_path": "data.rooms",
                "primary_key": "room_id"
            },
            "columns": [
                {"name": "Room", "type": "content", "source_key": "name"},
                {"name": "Temp", "type": "number", "min": 10, "max": 30, "step": 0.5},
                {"name": "Mode", "type": "cycle", "options": ["eco", "comfort"],
                 "editable": ["Alice"]},
                {"name": "Notes", "hidden": true}
            ],
            "editable": false,
            "if_missing": "disable",
            "sort_column": 1,
            "sort_direction": "desc",
            "date_format": "dd/mm/yyyy"
        }"#,
    );
    config.validate().expect("valid");
    assert_eq!(config.if_missing, IfMissing::Disable);
    assert_eq!(config.sort_column, Some(SortColumn::Index(1)));
    assert_eq!(config.sort_direction, SortDirection::Desc);
    assert_eq!(config.editable, EditPolicy::nobody());
    assert_eq!(config.primary_key(), Some("room_id"));
    assert_eq!(config.columns[0].source.as_deref(), Some("name"));
    assert_eq!(
        config.columns[1].kind,
        ColumnKind::Number {
            min: Some(10.0),
            max: Some(30.0),
            step: Some(0.5)
        }
    );
    assert_eq!(config.columns[2].editable, Some(EditPolicy::principals(&["Alice"])));
    assert_eq!(config.columns[3].kind, ColumnKind::Text);

    let schema = config.schema();
    assert_eq!(schema.slot_count(), 3);
    assert_eq!(schema.display_len(), 3);
    assert!(!config.is_pure_readonly());
}

#[test]
fn defaults_apply_when_fields_are_omitted() {
    let config = parse(r#"{"entity": "e", "standalone_mode": true, "columns": [{"name": "A"}]}"#);
    config.validate().expect("valid");
    assert_eq!(config.if_missing, IfMissing::Show);
    assert_eq!(config.sort_column, None);
    assert_eq!(config.editable, EditPolicy::everyone());
    assert_eq!(config.date_format, "isoDate");
}

#[test]
fn structural_problems_are_rejected() {
    assert!(rejection(r#"{"entity": "e", "standalone_mode": true, "columns": []}"#)
        .contains("columns"));
    assert!(rejection(r#"{"standalone_mode": true, "columns": [{"name": "A"}]}"#)
        .contains("entity"));
    assert!(rejection(r#"{"entity": "e", "columns": [{"name": "A"}]}"#).contains("data_source"));
    assert!(
        rejection(
            r#"{"entity": "e", "columns": [{"name": "A"}],
                "data_source": {"type": "sensor_attribute", "entity_id": "s", "primary_key": ""}}"#
        )
        .contains("primary_key")
    );
    assert!(
        rejection(
            r#"{"entity": "e", "standalone_mode": true,
                "columns": [{"name": "A", "type": "content", "source": "a"}]}"#
        )
        .contains("content column")
    );
}

#[test]
fn content_only_table_needs_no_store_entity() {
    let config = parse(
        r#"{
            "data_source": {"type": "sensor_attribute", "entity_id": "s", "primary_key": "id"},
            "columns": [{"name": "A", "type": "content", "source": "a"},
                        {"name": "B", "type": "text", "hidden": true}]
        }"#,
    );
    assert!(config.is_pure_readonly());
    config.validate().expect("valid");
}

#[test]
fn malformed_json_is_an_invalid_config() {
    let err = TableConfig::from_json_str("{\"columns\": 3}").expect_err("malformed");
    assert_eq!(err.code(), PowerTableErrorCode::InvalidConfig);
}
