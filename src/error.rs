use std::path::PathBuf;

use thiserror::Error;

use crate::guardrail::GuardrailTripwire;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema must be a JSON object")]
    SchemaNotObject,
    #[error("schema must declare type=object")]
    RootTypeMustBeObject,
    #[error("required must be an array of strings")]
    InvalidRequired,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid tool arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("tool execution failed: {0}")]
    Execution(String),
}

/// Failure reaching or understanding the model endpoint. Never retried here.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider response invalid: {0}")]
    Response(String),
}

#[derive(Debug, Error)]
pub enum OutputParseError {
    #[error("output of agent `{agent}` is not valid JSON: {message}")]
    NotJson { agent: String, message: String },
    #[error("output of agent `{agent}` does not match schema `{schema}`: {message}")]
    SchemaMismatch {
        agent: String,
        schema: String,
        message: String,
    },
    #[error("final output is plain text, not structured")]
    NotStructured,
    #[error("final output cannot be deserialized: {0}")]
    Deserialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("credential missing: set {var} or model.api_key")]
    MissingCredential { var: String },
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid setting: {0}")]
    Invalid(String),
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

/// Malformed agent graph, reported by `AgentGraphBuilder::build`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("agent name must not be empty")]
    EmptyAgentName,
    #[error("duplicate agent name: {0}")]
    DuplicateAgent(String),
    #[error("agent `{agent}` references unknown agent `{reference}`")]
    UnknownAgent { agent: String, reference: String },
    #[error("agent `{agent}` registers tool `{tool}` more than once")]
    DuplicateTool { agent: String, tool: String },
    #[error("guardrail `{guardrail}` uses checker `{checker}` which declares no output schema")]
    GuardrailWithoutSchema { guardrail: String, checker: String },
    #[error("guardrail `{guardrail}` reads field `{field}` missing from the output schema of `{checker}`")]
    GuardrailFieldMissing {
        guardrail: String,
        checker: String,
        field: String,
    },
    #[error("hand-off cycle: {}", .path.join(" -> "))]
    HandoffCycle { path: Vec<String> },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("input guardrail `{}` triggered tripwire", .0.guardrail)]
    GuardrailTriggered(Box<GuardrailTripwire>),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    OutputParse(#[from] OutputParseError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("max turns exceeded ({max_turns})")]
    MaxTurnsExceeded { max_turns: u32 },
    #[error("run ended without final output")]
    MissingFinalOutput,
    #[error("agent id {0} does not belong to this graph")]
    UnknownAgent(usize),
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl AgentError {
    /// True for the expected tripwire path, false for real failures.
    pub fn is_guardrail_tripwire(&self) -> bool {
        matches!(self, AgentError::GuardrailTriggered(_))
    }

    pub fn tripwire(&self) -> Option<&GuardrailTripwire> {
        match self {
            AgentError::GuardrailTriggered(tripwire) => Some(tripwire),
            _ => None,
        }
    }
}
