//! Structured final outputs.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{OutputParseError, SchemaError};
use crate::llm::ModelResponseFormat;
use crate::schema::{validate_schema, validate_value};

/// Declared shape of an agent's final output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    name: String,
    schema: Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Result<Self, SchemaError> {
        validate_schema(&schema)?;
        Ok(Self {
            name: name.into(),
            schema,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn json_schema(&self) -> &Value {
        &self.schema
    }

    pub(crate) fn response_format(&self) -> ModelResponseFormat {
        ModelResponseFormat {
            name: self.name.clone(),
            schema: self.schema.clone(),
        }
    }

    /// Parses model text as JSON and validates it against the schema.
    pub fn parse(&self, agent: &str, text: &str) -> Result<Value, OutputParseError> {
        let value = serde_json::from_str::<Value>(strip_code_fence(text)).map_err(|err| {
            OutputParseError::NotJson {
                agent: agent.to_string(),
                message: err.to_string(),
            }
        })?;

        validate_value(&self.schema, &value).map_err(|message| {
            OutputParseError::SchemaMismatch {
                agent: agent.to_string(),
                schema: self.name.clone(),
                message,
            }
        })?;

        Ok(value)
    }
}

/// Models often wrap JSON in a Markdown fence even when asked not to.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`), which may sit on the same line as the
    // payload. A body that is nothing but a word (`true`) is the payload.
    let body = body.trim();
    let info_len = body
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'))
        .unwrap_or(body.len());
    match body[info_len..].trim() {
        "" => body,
        content => content,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FinalOutput {
    Text(String),
    Structured(Value),
}

impl FinalOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FinalOutput::Text(text) => Some(text),
            FinalOutput::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            FinalOutput::Text(_) => None,
            FinalOutput::Structured(value) => Some(value),
        }
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, OutputParseError> {
        match self {
            FinalOutput::Structured(value) => Ok(T::deserialize(value)?),
            FinalOutput::Text(_) => Err(OutputParseError::NotStructured),
        }
    }

    /// Text becomes a JSON string; structured output is returned unchanged.
    pub fn into_value(self) -> Value {
        match self {
            FinalOutput::Text(text) => Value::String(text),
            FinalOutput::Structured(value) => value,
        }
    }
}

impl std::fmt::Display for FinalOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalOutput::Text(text) => f.write_str(text),
            FinalOutput::Structured(value) => write!(f, "{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct HomeworkOutput {
        is_homework: bool,
        reasoning: String,
    }

    fn homework_schema() -> OutputSchema {
        OutputSchema::new(
            "HomeworkOutput",
            json!({
                "type": "object",
                "properties": {
                    "is_homework": {"type": "boolean"},
                    "reasoning": {"type": "string"}
                },
                "required": ["is_homework", "reasoning"]
            }),
        )
        .expect("valid schema")
    }

    #[test]
    fn parses_plain_and_fenced_json() {
        let schema = homework_schema();

        let plain = schema
            .parse("Guardrail check", r#"{"is_homework": true, "reasoning": "asks a math question"}"#)
            .expect("plain json parses");
        assert_eq!(plain["is_homework"], true);

        let fenced = schema
            .parse(
                "Guardrail check",
                "```json\n{\"is_homework\": false, \"reasoning\": \"chit chat\"}\n```",
            )
            .expect("fenced json parses");
        assert_eq!(fenced["is_homework"], false);
    }

    #[test]
    fn single_line_fence_drops_language_tag() {
        let schema = homework_schema();

        let value = schema
            .parse(
                "Guardrail check",
                "```json{\"is_homework\": true, \"reasoning\": \"solve for x\"}```",
            )
            .expect("single line fence parses");
        assert_eq!(value["is_homework"], true);
        assert_eq!(value["reasoning"], "solve for x");
    }

    #[test]
    fn strip_code_fence_handles_tag_and_bare_bodies() {
        assert_eq!(strip_code_fence(" {\"a\": 1} "), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json{\"a\": 1}```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("``` json {\"a\": 1} ```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```{\"a\": 1}```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```[1, 2]```"), "[1, 2]");
        assert_eq!(strip_code_fence("```true```"), "true");
        assert_eq!(strip_code_fence("```json"), "```json");
    }

    #[test]
    fn reports_non_json_and_schema_mismatch() {
        let schema = homework_schema();

        let not_json = schema
            .parse("Guardrail check", "yes, that is homework")
            .expect_err("not json");
        assert!(matches!(not_json, OutputParseError::NotJson { .. }));

        let mismatch = schema
            .parse("Guardrail check", r#"{"is_homework": "yes", "reasoning": "x"}"#)
            .expect_err("wrong type");
        assert!(matches!(mismatch, OutputParseError::SchemaMismatch { ref schema, .. } if schema == "HomeworkOutput"));
    }

    #[test]
    fn final_output_deserializes_into_caller_type() {
        let output = FinalOutput::Structured(json!({"is_homework": true, "reasoning": "quiz"}));
        let parsed: HomeworkOutput = output.deserialize().expect("deserializes");
        assert_eq!(
            parsed,
            HomeworkOutput {
                is_homework: true,
                reasoning: "quiz".to_string()
            }
        );

        let text = FinalOutput::Text("hello".to_string());
        assert!(matches!(
            text.deserialize::<HomeworkOutput>(),
            Err(OutputParseError::NotStructured)
        ));
        assert_eq!(text.to_string(), "hello");
    }
}
