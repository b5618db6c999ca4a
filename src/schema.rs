//! Minimal JSON-schema subset shared by tool arguments and structured outputs.
//!
//! Only object roots are supported. Checks cover `required`, declared property
//! `type`s and `additionalProperties: false`; anything else is accepted as is.

use serde_json::{Map, Value};

use crate::error::SchemaError;

pub(crate) fn validate_schema(schema: &Value) -> Result<(), SchemaError> {
    let schema_obj = schema.as_object().ok_or(SchemaError::SchemaNotObject)?;

    let root_type = schema_obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(SchemaError::RootTypeMustBeObject)?;

    if root_type != "object" {
        return Err(SchemaError::RootTypeMustBeObject);
    }

    if let Some(required) = schema_obj.get("required") {
        let required_arr = required.as_array().ok_or(SchemaError::InvalidRequired)?;
        if required_arr.iter().any(|item| !item.is_string()) {
            return Err(SchemaError::InvalidRequired);
        }
    }

    Ok(())
}

/// Checks `value` against an already validated object schema.
///
/// Returns a human readable message describing the first violation.
pub(crate) fn validate_value(schema: &Value, value: &Value) -> Result<(), String> {
    let value_obj = value
        .as_object()
        .ok_or_else(|| "value must be a JSON object".to_string())?;

    let schema_obj = schema
        .as_object()
        .ok_or_else(|| "schema must be a JSON object".to_string())?;

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        for field_name in required.iter().filter_map(Value::as_str) {
            if !value_obj.contains_key(field_name) {
                return Err(format!("missing required field: {field_name}"));
            }
        }
    }

    let empty = Map::new();
    let properties = schema_obj
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    if schema_obj
        .get("additionalProperties")
        .and_then(Value::as_bool)
        == Some(false)
    {
        if let Some(key) = value_obj.keys().find(|key| !properties.contains_key(*key)) {
            return Err(format!("unknown field: {key}"));
        }
    }

    for (key, field) in value_obj {
        let Some(type_name) = properties
            .get(key)
            .and_then(|field_schema| field_schema.get("type"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        if !value_matches_type(field, type_name) {
            return Err(format!("field '{key}' must be of type {type_name}"));
        }
    }

    Ok(())
}

pub(crate) fn declares_property(schema: &Value, field: &str) -> bool {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|properties| properties.contains_key(field))
}

fn value_matches_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "number" => value.as_f64().is_some(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn homework_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "is_homework": {"type": "boolean"},
                "reasoning": {"type": "string"}
            },
            "required": ["is_homework", "reasoning"],
            "additionalProperties": false
        })
    }

    #[test]
    fn rejects_non_object_root() {
        assert!(matches!(
            validate_schema(&json!({"type": "string"})),
            Err(SchemaError::RootTypeMustBeObject)
        ));
        assert!(matches!(
            validate_schema(&json!("object")),
            Err(SchemaError::SchemaNotObject)
        ));
    }

    #[test]
    fn rejects_non_string_required_entries() {
        let result = validate_schema(&json!({"type": "object", "required": [1]}));
        assert!(matches!(result, Err(SchemaError::InvalidRequired)));
    }

    #[test]
    fn value_validation_reports_first_violation() {
        let schema = homework_schema();

        assert!(validate_value(&schema, &json!({"is_homework": true, "reasoning": "x"})).is_ok());

        let missing = validate_value(&schema, &json!({"is_homework": true})).expect_err("missing");
        assert!(missing.contains("missing required field: reasoning"));

        let wrong_type = validate_value(&schema, &json!({"is_homework": "yes", "reasoning": "x"}))
            .expect_err("wrong type");
        assert!(wrong_type.contains("must be of type boolean"));

        let extra = validate_value(
            &schema,
            &json!({"is_homework": true, "reasoning": "x", "grade": 3}),
        )
        .expect_err("extra field");
        assert!(extra.contains("unknown field: grade"));
    }

    #[test]
    fn declares_property_looks_at_properties_only() {
        let schema = homework_schema();
        assert!(declares_property(&schema, "is_homework"));
        assert!(!declares_property(&schema, "type"));
    }
}
