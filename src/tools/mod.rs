use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::{SchemaError, ToolError};
use crate::schema::{validate_schema, validate_value};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Fed back to the model as the tool result.
    Text(String),
    /// Ends the turn; the string becomes the final output.
    Final(String),
}

/// Caller supplied data shared with every tool call of one run.
pub struct RunContext<C> {
    context: Arc<C>,
}

impl<C> RunContext<C> {
    pub fn new(context: C) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }
}

impl<C> Clone for RunContext<C> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
        }
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for RunContext<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("context", &self.context)
            .finish()
    }
}

type ToolHandler<C> = dyn Fn(Value, RunContext<C>) -> BoxFuture<'static, Result<ToolOutcome, ToolError>>
    + Send
    + Sync;

pub struct ToolSpec<C = ()> {
    name: String,
    description: String,
    json_schema: Value,
    handler: Arc<ToolHandler<C>>,
}

impl<C> Clone for ToolSpec<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            json_schema: self.json_schema.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<C> std::fmt::Debug for ToolSpec<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("json_schema", &self.json_schema)
            .finish()
    }
}

impl<C> ToolSpec<C> {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            json_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": true,
            }),
            handler: Arc::new(|_args, _ctx| {
                Box::pin(async {
                    Err(ToolError::Execution(
                        "tool handler not configured".to_string(),
                    ))
                })
            }),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Result<Self, SchemaError> {
        validate_schema(&schema)?;
        self.json_schema = schema;
        Ok(self)
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value, RunContext<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutcome, ToolError>> + Send + 'static,
    {
        self.handler = Arc::new(move |args, ctx| Box::pin(handler(args, ctx)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn json_schema(&self) -> &Value {
        &self.json_schema
    }

    pub async fn execute(
        &self,
        args: Value,
        context: RunContext<C>,
    ) -> Result<ToolOutcome, ToolError> {
        validate_value(&self.json_schema, &args).map_err(|message| {
            ToolError::InvalidArguments {
                tool: self.name.clone(),
                message,
            }
        })?;
        (self.handler)(args, context).await
    }
}

/// Tool name the model calls to hand the turn to `agent_name`.
///
/// `"Math Tutor"` becomes `transfer_to_math_tutor`. Function names must stay
/// within `[a-zA-Z0-9_-]`, so other letters are spelled as code points:
/// `"数学"` becomes `transfer_to_u6570u5b66`.
pub fn handoff_tool_name(agent_name: &str) -> String {
    let mut slug = String::with_capacity(agent_name.len());
    for ch in agent_name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if ch.is_alphanumeric() {
            slug.push_str(&format!("u{:x}", u32::from(ch)));
        } else if (ch.is_whitespace() || ch == '-' || ch == '_') && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    format!("transfer_to_{}", slug.trim_end_matches('_'))
}

pub(crate) fn handoff_tool_description(agent_name: &str, handoff_description: Option<&str>) -> String {
    match handoff_description {
        Some(description) => format!(
            "Handoff to the {agent_name} agent to handle the request. {description}"
        ),
        None => format!("Handoff to the {agent_name} agent to handle the request."),
    }
}
