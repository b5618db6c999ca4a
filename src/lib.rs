//! Agent runner for OpenAI-compatible chat endpoints (Gemini by default).
//!
//! - `AgentGraph` of named agents with tools, hand-offs and input guardrails
//! - `Runner::run` / `run_stream` / `run_blocking` entry points
//! - typed per-run context handed to every tool via `RunContext<C>`
//! - structured output parsed against an `OutputSchema`
//! - `ChatCompletionsModel` adapter, configured through `Settings`

pub mod agent;
pub mod config;
pub mod error;
pub mod guardrail;
pub mod llm;
pub mod logging;
pub mod output;
pub mod repl;
pub mod runner;
mod schema;
pub mod tools;

pub use agent::{Agent, AgentBuilder, AgentGraph, AgentGraphBuilder, AgentId};
pub use config::{ModelHandle, Settings, ToolErrorPolicy};
pub use error::{
    AgentError, ConfigError, OutputParseError, ProviderError, SchemaError, ToolError,
    ValidationError,
};
pub use guardrail::{GuardrailOutcome, GuardrailTripwire, InputGuardrail};
pub use llm::{
    ChatCompletionsModel, ChatModel, ModelCompletion, ModelMessage, ModelResponseFormat,
    ModelToolCall, ModelToolChoice, ModelToolDefinition,
};
pub use logging::init_logging;
pub use output::{FinalOutput, OutputSchema};
pub use runner::{RunConfig, RunEvent, RunResult, Runner};
pub use tools::{RunContext, ToolOutcome, ToolSpec};
