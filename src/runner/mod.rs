use std::sync::Arc;

use async_stream::try_stream;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentGraph, AgentId};
use crate::config::{RunSettings, ToolErrorPolicy};
use crate::error::{AgentError, OutputParseError, ToolError};
use crate::guardrail::{GuardrailOutcome, GuardrailTripwire};
use crate::llm::{ChatModel, ModelCompletion, ModelMessage, ModelToolCall, ModelToolChoice};
use crate::output::{FinalOutput, OutputSchema};
use crate::tools::{RunContext, ToolOutcome};

const MULTIPLE_HANDOFFS_MESSAGE: &str = "Multiple handoffs detected, ignoring this one.";

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Upper bound on model calls in one turn, hand-offs included.
    pub max_turns: u32,
    pub tool_errors: ToolErrorPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            tool_errors: ToolErrorPolicy::Report,
        }
    }
}

impl From<&RunSettings> for RunConfig {
    fn from(settings: &RunSettings) -> Self {
        Self {
            max_turns: settings.max_turns,
            tool_errors: settings.tool_errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    GuardrailChecked {
        outcome: GuardrailOutcome,
    },
    AgentStarted {
        agent: String,
    },
    Thinking {
        agent: String,
        content: String,
    },
    Text {
        agent: String,
        content: String,
    },
    ToolCall {
        agent: String,
        tool: String,
        args_json: Value,
        tool_call_id: String,
    },
    ToolResult {
        agent: String,
        tool: String,
        result_text: String,
        tool_call_id: String,
        is_error: bool,
    },
    Handoff {
        from: String,
        to: String,
    },
    FinalOutput {
        agent: String,
        output: FinalOutput,
    },
}

/// Outcome of one turn. Built fresh per call and never reused.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub final_output: FinalOutput,
    /// Agent that produced the final output, after any hand-offs.
    pub last_agent: String,
    pub input_guardrail_results: Vec<GuardrailOutcome>,
    pub new_items: Vec<RunEvent>,
}

impl RunResult {
    pub fn final_output_as<T: DeserializeOwned>(&self) -> Result<T, OutputParseError> {
        self.final_output.deserialize()
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &str> + '_ {
        self.new_items.iter().filter_map(|item| match item {
            RunEvent::ToolCall { tool, .. } => Some(tool.as_str()),
            _ => None,
        })
    }
}

pub struct Runner<C = ()> {
    graph: Arc<AgentGraph<C>>,
    model: Arc<dyn ChatModel>,
    config: RunConfig,
}

impl<C> Runner<C>
where
    C: Send + Sync + 'static,
{
    /// `model` serves every agent that does not set its own.
    pub fn new<M>(graph: AgentGraph<C>, model: M) -> Self
    where
        M: ChatModel + 'static,
    {
        Self {
            graph: Arc::new(graph),
            model: Arc::new(model),
            config: RunConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn graph(&self) -> &AgentGraph<C> {
        &self.graph
    }

    pub async fn run(
        &self,
        agent: AgentId,
        input: impl Into<String>,
    ) -> Result<RunResult, AgentError>
    where
        C: Default,
    {
        self.run_with_context(agent, input, C::default()).await
    }

    pub async fn run_with_context(
        &self,
        agent: AgentId,
        input: impl Into<String>,
        context: C,
    ) -> Result<RunResult, AgentError> {
        collect_run(self.turn_stream(agent, input.into(), RunContext::new(context), true)).await
    }

    pub fn run_stream(
        &self,
        agent: AgentId,
        input: impl Into<String>,
        context: C,
    ) -> impl Stream<Item = Result<RunEvent, AgentError>> + Send + '_ {
        self.turn_stream(agent, input.into(), RunContext::new(context), true)
    }

    /// Same turn as [`Runner::run_with_context`] on a private current-thread
    /// runtime. Must not be called from inside an async runtime.
    pub fn run_blocking(
        &self,
        agent: AgentId,
        input: impl Into<String>,
        context: C,
    ) -> Result<RunResult, AgentError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| AgentError::Runtime(err.to_string()))?;
        runtime.block_on(self.run_with_context(agent, input, context))
    }

    fn agent(&self, id: AgentId) -> Result<&Agent<C>, AgentError> {
        self.graph
            .agent(id)
            .ok_or(AgentError::UnknownAgent(id.index()))
    }

    // Boxed so guardrail checks can run a nested turn.
    fn nested_turn(
        &self,
        agent: AgentId,
        input: String,
        context: RunContext<C>,
    ) -> BoxStream<'_, Result<RunEvent, AgentError>> {
        Box::pin(self.turn_stream(agent, input, context, false))
    }

    fn turn_stream(
        &self,
        start: AgentId,
        input: String,
        context: RunContext<C>,
        check_guardrails: bool,
    ) -> impl Stream<Item = Result<RunEvent, AgentError>> + Send + '_ {
        try_stream! {
            let first = self.agent(start)?;

            if check_guardrails {
                for bound in first.bound_guardrails() {
                    let checked =
                        collect_run(self.nested_turn(bound.checker, input.clone(), context.clone()))
                            .await?;
                    let output_info = checked.final_output.into_value();
                    let tripped = bound.guardrail.is_tripped(&output_info);
                    info!(
                        agent = first.name(),
                        guardrail = bound.guardrail.name(),
                        tripped,
                        "input guardrail checked"
                    );

                    yield RunEvent::GuardrailChecked {
                        outcome: GuardrailOutcome {
                            guardrail: bound.guardrail.name().to_string(),
                            tripwire_triggered: tripped,
                            output_info: output_info.clone(),
                        },
                    };

                    if tripped {
                        Err::<(), AgentError>(AgentError::GuardrailTriggered(Box::new(
                            GuardrailTripwire {
                                guardrail: bound.guardrail.name().to_string(),
                                agent: first.name().to_string(),
                                output_info,
                            },
                        )))?;
                    }
                }
            }

            let mut current = start;
            let mut transcript = vec![ModelMessage::User(input)];

            info!(agent = first.name(), "turn started");
            yield RunEvent::AgentStarted {
                agent: first.name().to_string(),
            };

            for turn in 0..self.config.max_turns {
                let agent = self.agent(current)?;
                let model = agent.model().unwrap_or(&self.model);
                let tool_definitions = agent.tool_definitions();
                let tool_choice = if tool_definitions.is_empty() {
                    ModelToolChoice::None
                } else {
                    ModelToolChoice::Auto
                };
                let response_format = agent.output_schema().map(OutputSchema::response_format);

                let mut messages = Vec::with_capacity(transcript.len() + 1);
                messages.push(ModelMessage::System(agent.instructions().to_string()));
                messages.extend(transcript.iter().cloned());

                debug!(agent = agent.name(), turn, "invoking model");
                let completion = model
                    .invoke(
                        &messages,
                        tool_definitions,
                        tool_choice,
                        response_format.as_ref(),
                    )
                    .await?;

                if let Some(thinking) = completion.thinking.clone() {
                    yield RunEvent::Thinking {
                        agent: agent.name().to_string(),
                        content: thinking,
                    };
                }

                transcript.push(assistant_message(&completion));

                if let Some(text) = completion.text.clone() {
                    yield RunEvent::Text {
                        agent: agent.name().to_string(),
                        content: text,
                    };
                }

                if completion.tool_calls.is_empty() {
                    let output = finalize(agent, completion.text.unwrap_or_default())?;
                    info!(agent = agent.name(), "turn finished");
                    yield RunEvent::FinalOutput {
                        agent: agent.name().to_string(),
                        output,
                    };
                    return;
                }

                let mut handoff_to: Option<AgentId> = None;

                for tool_call in completion.tool_calls {
                    debug!(agent = agent.name(), tool = %tool_call.name, "tool call");
                    yield RunEvent::ToolCall {
                        agent: agent.name().to_string(),
                        tool: tool_call.name.clone(),
                        args_json: tool_call.arguments.clone(),
                        tool_call_id: tool_call.id.clone(),
                    };

                    let execution = match agent.handoff_for_tool(&tool_call.name) {
                        Some(target) if handoff_to.is_none() => {
                            handoff_to = Some(target);
                            let target_name = self.agent(target)?.name();
                            ToolExecution::text(json!({ "assistant": target_name }).to_string())
                        }
                        Some(_) => ToolExecution::error(MULTIPLE_HANDOFFS_MESSAGE.to_string()),
                        None => self.execute_tool_call(agent, &tool_call, &context).await?,
                    };

                    transcript.push(ModelMessage::ToolResult {
                        tool_call_id: tool_call.id.clone(),
                        tool_name: tool_call.name.clone(),
                        content: execution.result_text.clone(),
                        is_error: execution.is_error,
                    });

                    yield RunEvent::ToolResult {
                        agent: agent.name().to_string(),
                        tool: tool_call.name.clone(),
                        result_text: execution.result_text.clone(),
                        tool_call_id: tool_call.id.clone(),
                        is_error: execution.is_error,
                    };

                    if let Some(final_text) = execution.final_output {
                        let output = finalize(agent, final_text)?;
                        info!(agent = agent.name(), tool = %tool_call.name, "turn finished by tool");
                        yield RunEvent::FinalOutput {
                            agent: agent.name().to_string(),
                            output,
                        };
                        return;
                    }
                }

                if let Some(target) = handoff_to {
                    let to = self.agent(target)?.name().to_string();
                    info!(from = agent.name(), to = %to, "handing off");
                    yield RunEvent::Handoff {
                        from: agent.name().to_string(),
                        to: to.clone(),
                    };
                    yield RunEvent::AgentStarted { agent: to };
                    current = target;
                }
            }

            Err::<(), AgentError>(AgentError::MaxTurnsExceeded {
                max_turns: self.config.max_turns,
            })?;
        }
    }

    async fn execute_tool_call(
        &self,
        agent: &Agent<C>,
        tool_call: &ModelToolCall,
        context: &RunContext<C>,
    ) -> Result<ToolExecution, ToolError> {
        let Some(tool) = agent.tool(&tool_call.name) else {
            return self.tool_failure(ToolError::NotFound(tool_call.name.clone()));
        };

        match tool
            .execute(tool_call.arguments.clone(), context.clone())
            .await
        {
            Ok(ToolOutcome::Text(text)) => Ok(ToolExecution::text(text)),
            Ok(ToolOutcome::Final(text)) => Ok(ToolExecution {
                result_text: text.clone(),
                is_error: false,
                final_output: Some(text),
            }),
            Err(err) => self.tool_failure(err),
        }
    }

    fn tool_failure(&self, err: ToolError) -> Result<ToolExecution, ToolError> {
        match self.config.tool_errors {
            ToolErrorPolicy::Abort => Err(err),
            ToolErrorPolicy::Report => {
                warn!(error = %err, "tool call failed; reporting to model");
                Ok(ToolExecution::error(err.to_string()))
            }
        }
    }
}

fn assistant_message(completion: &ModelCompletion) -> ModelMessage {
    ModelMessage::Assistant {
        content: completion.text.clone(),
        tool_calls: completion.tool_calls.clone(),
    }
}

fn finalize<C>(agent: &Agent<C>, text: String) -> Result<FinalOutput, OutputParseError> {
    match agent.output_schema() {
        Some(schema) => Ok(FinalOutput::Structured(schema.parse(agent.name(), &text)?)),
        None => Ok(FinalOutput::Text(text)),
    }
}

async fn collect_run<S>(stream: S) -> Result<RunResult, AgentError>
where
    S: Stream<Item = Result<RunEvent, AgentError>>,
{
    futures_util::pin_mut!(stream);

    let mut new_items = Vec::new();
    let mut input_guardrail_results = Vec::new();
    let mut last_agent = String::new();
    let mut final_output = None;

    while let Some(event) = stream.next().await {
        let event = event?;
        match &event {
            RunEvent::GuardrailChecked { outcome } => input_guardrail_results.push(outcome.clone()),
            RunEvent::AgentStarted { agent } => last_agent = agent.clone(),
            RunEvent::FinalOutput { agent, output } => {
                last_agent = agent.clone();
                final_output = Some(output.clone());
            }
            RunEvent::Thinking { .. }
            | RunEvent::Text { .. }
            | RunEvent::ToolCall { .. }
            | RunEvent::ToolResult { .. }
            | RunEvent::Handoff { .. } => {}
        }
        new_items.push(event);
    }

    Ok(RunResult {
        final_output: final_output.ok_or(AgentError::MissingFinalOutput)?,
        last_agent,
        input_guardrail_results,
        new_items,
    })
}

struct ToolExecution {
    result_text: String,
    is_error: bool,
    final_output: Option<String>,
}

impl ToolExecution {
    fn text(result_text: String) -> Self {
        Self {
            result_text,
            is_error: false,
            final_output: None,
        }
    }

    fn error(result_text: String) -> Self {
        Self {
            result_text,
            is_error: true,
            final_output: None,
        }
    }
}
