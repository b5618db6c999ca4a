use std::error::Error;

use agents_quickstart::repl::{DEFAULT_PROMPT, run_loop};
use agents_quickstart::{
    Agent, AgentGraph, ChatCompletionsModel, InputGuardrail, OutputSchema, RunConfig, Runner,
    Settings, init_logging,
};
use serde_json::json;
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut settings = Settings::load()?;
    settings.logging.verbose = true;
    init_logging(&settings.logging)?;
    let model = ChatCompletionsModel::new(settings.resolve_model()?)?;

    let homework = OutputSchema::new(
        "HomeworkOutput",
        json!({
            "type": "object",
            "properties": {
                "is_homework": {"type": "boolean"},
                "reasoning": {"type": "string"}
            },
            "required": ["is_homework", "reasoning"],
            "additionalProperties": false
        }),
    )?;

    let mut graph = AgentGraph::builder();
    graph.add(
        Agent::builder("Guardrail check")
            .instructions("Check if the user is asking about homework.")
            .output_schema(homework),
    );
    graph.add(
        Agent::builder("Math Tutor")
            .handoff_description("Specialist agent for math questions")
            .instructions(
                "You provide help with math problems. Explain your reasoning at each step and include examples",
            ),
    );
    graph.add(
        Agent::builder("History Tutor")
            .handoff_description("Specialist agent for historical questions")
            .instructions(
                "You provide assistance with historical queries. Explain important events and context clearly.",
            ),
    );
    let triage = graph.add(
        Agent::builder("Triage Agent")
            .instructions("You determine which agent to use based on the user's homework question")
            .handoff("History Tutor")
            .handoff("Math Tutor")
            .input_guardrail(InputGuardrail::trip_when_false(
                "homework_guardrail",
                "Guardrail check",
                "is_homework",
            )),
    );

    let runner = Runner::new(graph.build()?, model).with_config(RunConfig::from(&settings.run));

    run_loop(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        DEFAULT_PROMPT,
        |line| runner.run(triage, line),
    )
    .await?;

    Ok(())
}
