//! Agent descriptors and the graph that holds them.
//!
//! Agents refer to each other by name while being described. The graph
//! builder resolves those names into [`AgentId`] indices and rejects bad
//! graphs (unknown names, duplicate tools, guardrails that cannot read their
//! checker's output, hand-off cycles) before anything can run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::ValidationError;
use crate::guardrail::InputGuardrail;
use crate::llm::{ChatModel, ModelToolDefinition};
use crate::output::OutputSchema;
use crate::schema::declares_property;
use crate::tools::{ToolSpec, handoff_tool_description, handoff_tool_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentId(usize);

impl AgentId {
    pub fn index(self) -> usize {
        self.0
    }
}

pub struct AgentBuilder<C = ()> {
    name: String,
    instructions: String,
    handoff_description: Option<String>,
    output_schema: Option<OutputSchema>,
    tools: Vec<ToolSpec<C>>,
    handoffs: Vec<String>,
    input_guardrails: Vec<InputGuardrail>,
    model: Option<Arc<dyn ChatModel>>,
}

impl<C> AgentBuilder<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: String::new(),
            handoff_description: None,
            output_schema: None,
            tools: Vec::new(),
            handoffs: Vec::new(),
            input_guardrails: Vec::new(),
            model: None,
        }
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Shown to a triage agent deciding whether to hand off here.
    pub fn handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = Some(description.into());
        self
    }

    pub fn output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn tool(mut self, tool: ToolSpec<C>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolSpec<C>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Adds a delegate by agent name; order is kept.
    pub fn handoff(mut self, agent_name: impl Into<String>) -> Self {
        self.handoffs.push(agent_name.into());
        self
    }

    pub fn input_guardrail(mut self, guardrail: InputGuardrail) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    /// Overrides the runner's default model for this agent.
    pub fn model<M>(mut self, model: M) -> Self
    where
        M: ChatModel + 'static,
    {
        self.model = Some(Arc::new(model));
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Handoff {
    pub(crate) target: AgentId,
    pub(crate) tool_name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct BoundGuardrail {
    pub(crate) guardrail: InputGuardrail,
    pub(crate) checker: AgentId,
}

/// Immutable, validated agent descriptor owned by an [`AgentGraph`].
pub struct Agent<C = ()> {
    name: String,
    instructions: String,
    handoff_description: Option<String>,
    output_schema: Option<OutputSchema>,
    tool_map: HashMap<String, ToolSpec<C>>,
    handoffs: Vec<Handoff>,
    input_guardrails: Vec<BoundGuardrail>,
    tool_definitions: Vec<ModelToolDefinition>,
    model: Option<Arc<dyn ChatModel>>,
}

impl<C> std::fmt::Debug for Agent<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("instructions", &self.instructions)
            .field("output_schema", &self.output_schema)
            .field("tools", &self.tool_map.keys().collect::<Vec<_>>())
            .field("handoffs", &self.handoffs)
            .field("input_guardrails", &self.input_guardrails)
            .finish()
    }
}

impl<C> Agent<C> {
    pub fn builder(name: impl Into<String>) -> AgentBuilder<C> {
        AgentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn handoff_description(&self) -> Option<&str> {
        self.handoff_description.as_deref()
    }

    pub fn output_schema(&self) -> Option<&OutputSchema> {
        self.output_schema.as_ref()
    }

    /// True when the agent can delegate to other agents.
    pub fn is_triage(&self) -> bool {
        !self.handoffs.is_empty()
    }

    pub fn handoff_targets(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.handoffs.iter().map(|handoff| handoff.target)
    }

    pub fn input_guardrails(&self) -> impl Iterator<Item = &InputGuardrail> + '_ {
        self.input_guardrails.iter().map(|bound| &bound.guardrail)
    }

    pub(crate) fn tool(&self, name: &str) -> Option<&ToolSpec<C>> {
        self.tool_map.get(name)
    }

    pub(crate) fn handoff_for_tool(&self, tool_name: &str) -> Option<AgentId> {
        self.handoffs
            .iter()
            .find(|handoff| handoff.tool_name == tool_name)
            .map(|handoff| handoff.target)
    }

    pub(crate) fn bound_guardrails(&self) -> &[BoundGuardrail] {
        &self.input_guardrails
    }

    /// Regular tools followed by one hand-off tool per delegate.
    pub(crate) fn tool_definitions(&self) -> &[ModelToolDefinition] {
        &self.tool_definitions
    }

    pub(crate) fn model(&self) -> Option<&Arc<dyn ChatModel>> {
        self.model.as_ref()
    }
}

pub struct AgentGraph<C = ()> {
    agents: Vec<Agent<C>>,
}

impl<C> std::fmt::Debug for AgentGraph<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentGraph")
            .field("agents", &self.agents)
            .finish()
    }
}

impl AgentGraph {
    /// Builder for agents whose tools take no context.
    pub fn builder() -> AgentGraphBuilder {
        AgentGraphBuilder::new()
    }
}

impl<C> AgentGraph<C> {
    pub fn agent(&self, id: AgentId) -> Option<&Agent<C>> {
        self.agents.get(id.0)
    }

    pub fn id_of(&self, name: &str) -> Option<AgentId> {
        self.agents
            .iter()
            .position(|agent| agent.name == name)
            .map(AgentId)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

pub struct AgentGraphBuilder<C = ()> {
    agents: Vec<AgentBuilder<C>>,
}

impl<C> Default for AgentGraphBuilder<C> {
    fn default() -> Self {
        Self { agents: Vec::new() }
    }
}

impl<C> AgentGraphBuilder<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an agent; the id is valid for the graph returned by `build`.
    pub fn add(&mut self, agent: AgentBuilder<C>) -> AgentId {
        self.agents.push(agent);
        AgentId(self.agents.len() - 1)
    }

    pub fn build(self) -> Result<AgentGraph<C>, ValidationError> {
        let mut ids = HashMap::new();
        for (index, agent) in self.agents.iter().enumerate() {
            if agent.name.trim().is_empty() {
                return Err(ValidationError::EmptyAgentName);
            }
            if ids.insert(agent.name.clone(), AgentId(index)).is_some() {
                return Err(ValidationError::DuplicateAgent(agent.name.clone()));
            }
        }

        let resolve = |agent: &str, reference: &str| {
            ids.get(reference)
                .copied()
                .ok_or_else(|| ValidationError::UnknownAgent {
                    agent: agent.to_string(),
                    reference: reference.to_string(),
                })
        };

        let mut adjacency = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            let targets = agent
                .handoffs
                .iter()
                .map(|name| resolve(&agent.name, name))
                .collect::<Result<Vec<_>, _>>()?;
            adjacency.push(targets);
        }

        if let Some(cycle) = find_cycle(&adjacency) {
            return Err(ValidationError::HandoffCycle {
                path: cycle
                    .into_iter()
                    .map(|index| self.agents[index].name.clone())
                    .collect(),
            });
        }

        let mut guardrails = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            let mut bound = Vec::with_capacity(agent.input_guardrails.len());
            for guardrail in &agent.input_guardrails {
                let checker = resolve(&agent.name, guardrail.checker())?;
                check_guardrail_schema(guardrail, &self.agents[checker.0])?;
                bound.push(BoundGuardrail {
                    guardrail: guardrail.clone(),
                    checker,
                });
            }
            guardrails.push(bound);
        }

        let names = self
            .agents
            .iter()
            .map(|agent| (agent.name.clone(), agent.handoff_description.clone()))
            .collect::<Vec<_>>();

        let mut agents = Vec::with_capacity(self.agents.len());
        for ((builder, targets), input_guardrails) in
            self.agents.into_iter().zip(adjacency).zip(guardrails)
        {
            agents.push(finish_agent(builder, targets, input_guardrails, &names)?);
        }

        Ok(AgentGraph { agents })
    }
}

fn check_guardrail_schema<C>(
    guardrail: &InputGuardrail,
    checker: &AgentBuilder<C>,
) -> Result<(), ValidationError> {
    let Some(schema) = &checker.output_schema else {
        return Err(ValidationError::GuardrailWithoutSchema {
            guardrail: guardrail.name().to_string(),
            checker: checker.name.clone(),
        });
    };

    for field in guardrail.fields() {
        if !declares_property(schema.json_schema(), field) {
            return Err(ValidationError::GuardrailFieldMissing {
                guardrail: guardrail.name().to_string(),
                checker: checker.name.clone(),
                field: field.clone(),
            });
        }
    }

    Ok(())
}

fn finish_agent<C>(
    builder: AgentBuilder<C>,
    targets: Vec<AgentId>,
    input_guardrails: Vec<BoundGuardrail>,
    names: &[(String, Option<String>)],
) -> Result<Agent<C>, ValidationError> {
    let mut tool_map = HashMap::new();
    let mut tool_definitions = Vec::new();
    // Regular and hand-off tools share one namespace.
    let mut emitted = HashSet::new();

    for tool in builder.tools {
        if !emitted.insert(tool.name().to_string()) {
            return Err(ValidationError::DuplicateTool {
                agent: builder.name.clone(),
                tool: tool.name().to_string(),
            });
        }
        tool_definitions.push(ModelToolDefinition {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.json_schema().clone(),
        });
        tool_map.insert(tool.name().to_string(), tool);
    }

    let mut handoffs = Vec::with_capacity(targets.len());
    for target in targets {
        let (target_name, description) = &names[target.0];
        let tool_name = handoff_tool_name(target_name);
        if !emitted.insert(tool_name.clone()) {
            return Err(ValidationError::DuplicateTool {
                agent: builder.name.clone(),
                tool: tool_name,
            });
        }
        tool_definitions.push(ModelToolDefinition {
            name: tool_name.clone(),
            description: handoff_tool_description(target_name, description.as_deref()),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": false,
            }),
        });
        handoffs.push(Handoff { target, tool_name });
    }

    Ok(Agent {
        name: builder.name,
        instructions: builder.instructions,
        handoff_description: builder.handoff_description,
        output_schema: builder.output_schema,
        tool_map,
        handoffs,
        input_guardrails,
        tool_definitions,
        model: builder.model,
    })
}

/// Returns the agents along the first cycle found, with the start repeated
/// at the end.
fn find_cycle(adjacency: &[Vec<AgentId>]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(
        node: usize,
        adjacency: &[Vec<AgentId>],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[node] = Mark::InProgress;
        stack.push(node);

        for next in &adjacency[node] {
            match marks[next.0] {
                Mark::InProgress => {
                    let start = stack.iter().position(|&entry| entry == next.0)?;
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(next.0);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = visit(next.0, adjacency, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        stack.pop();
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; adjacency.len()];
    let mut stack = Vec::new();
    for node in 0..adjacency.len() {
        if marks[node] == Mark::Unvisited {
            if let Some(cycle) = visit(node, adjacency, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}
