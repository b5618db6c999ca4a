use std::error::Error;

use agents_quickstart::repl::{DEFAULT_PROMPT, run_loop};
use agents_quickstart::{Agent, AgentGraph, ChatCompletionsModel, RunConfig, Runner, Settings, init_logging};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let settings = Settings::load()?;
    init_logging(&settings.logging)?;
    let model = ChatCompletionsModel::new(settings.resolve_model()?)?;

    let mut graph = AgentGraph::builder();
    let assistant =
        graph.add(Agent::builder("Assistant").instructions("You are a helpful assistant"));

    let runner = Runner::new(graph.build()?, model).with_config(RunConfig::from(&settings.run));

    run_loop(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        DEFAULT_PROMPT,
        |line| runner.run(assistant, line),
    )
    .await?;

    Ok(())
}
