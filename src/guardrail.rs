//! Input guardrails: a checking agent runs on the user input before the
//! guarded agent, and a predicate over its structured output decides whether
//! the turn may continue.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

type Tripwire = dyn Fn(&Value) -> bool + Send + Sync;

#[derive(Clone)]
pub struct InputGuardrail {
    name: String,
    checker: String,
    fields: Vec<String>,
    tripwire: Arc<Tripwire>,
}

impl std::fmt::Debug for InputGuardrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputGuardrail")
            .field("name", &self.name)
            .field("checker", &self.checker)
            .field("fields", &self.fields)
            .finish()
    }
}

impl InputGuardrail {
    /// `checker` names the agent whose output `tripwire` inspects.
    pub fn new<F>(name: impl Into<String>, checker: impl Into<String>, tripwire: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            checker: checker.into(),
            fields: Vec::new(),
            tripwire: Arc::new(tripwire),
        }
    }

    /// Trips when boolean `field` of the checker output is `true`.
    pub fn trip_when_true(
        name: impl Into<String>,
        checker: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        let field = field.into();
        let key = field.clone();
        Self::new(name, checker, move |output| {
            output.get(&key).and_then(Value::as_bool) == Some(true)
        })
        .reads_field(field)
    }

    /// Trips unless boolean `field` of the checker output is `true`.
    pub fn trip_when_false(
        name: impl Into<String>,
        checker: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        let field = field.into();
        let key = field.clone();
        Self::new(name, checker, move |output| {
            output.get(&key).and_then(Value::as_bool) != Some(true)
        })
        .reads_field(field)
    }

    /// Declares a field the predicate reads; checked against the checker's
    /// output schema when the graph is built.
    pub fn reads_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checker(&self) -> &str {
        &self.checker
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_tripped(&self, output: &Value) -> bool {
        (self.tripwire)(output)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardrailOutcome {
    pub guardrail: String,
    pub tripwire_triggered: bool,
    pub output_info: Value,
}

/// Carried by `AgentError::GuardrailTriggered`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardrailTripwire {
    pub guardrail: String,
    pub agent: String,
    pub output_info: Value,
}

impl std::fmt::Display for GuardrailTripwire {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "guardrail `{}` on agent `{}`: {}",
            self.guardrail, self.agent, self.output_info
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn field_helpers_record_fields_and_trip_as_named() {
        let cheat = InputGuardrail::trip_when_true("cheat", "Detector", "attempting_cheat");
        assert_eq!(cheat.fields(), ["attempting_cheat".to_string()]);
        assert!(cheat.is_tripped(&json!({"attempting_cheat": true})));
        assert!(!cheat.is_tripped(&json!({"attempting_cheat": false})));

        let homework = InputGuardrail::trip_when_false("homework", "Guardrail check", "is_homework");
        assert!(homework.is_tripped(&json!({"is_homework": false})));
        assert!(homework.is_tripped(&json!({"reasoning": "field missing"})));
        assert!(!homework.is_tripped(&json!({"is_homework": true})));
    }

    #[test]
    fn custom_predicate_sees_whole_output() {
        let guardrail = InputGuardrail::new("long reasoning", "Checker", |output| {
            output
                .get("reasoning")
                .and_then(Value::as_str)
                .is_some_and(|text| text.len() > 10)
        })
        .reads_field("reasoning");

        assert!(guardrail.is_tripped(&json!({"reasoning": "a rather long explanation"})));
        assert!(!guardrail.is_tripped(&json!({"reasoning": "short"})));
        assert_eq!(guardrail.checker(), "Checker");
    }
}
