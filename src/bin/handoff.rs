use std::error::Error;

use agents_quickstart::{
    Agent, AgentGraph, ChatCompletionsModel, RunConfig, Runner, Settings, init_logging,
};

fn main() -> Result<(), Box<dyn Error>> {
    let mut settings = Settings::load()?;
    settings.logging.verbose = true;
    init_logging(&settings.logging)?;
    let model = ChatCompletionsModel::new(settings.resolve_model()?)?;

    let mut graph = AgentGraph::builder();
    graph.add(
        Agent::builder("Botany Tutor")
            .instructions("You are a botany tutor agent.")
            .handoff_description("Specialist agent for botany questions"),
    );
    graph.add(
        Agent::builder("Zoology Tutor")
            .instructions("You are a zoology tutor agent.")
            .handoff_description("Specialist agent for zoology questions"),
    );
    let tutor = graph.add(
        Agent::builder("Tutor Assistant")
            .instructions("You are a helpful tutor assistant.")
            .handoff("Botany Tutor")
            .handoff("Zoology Tutor"),
    );

    let runner = Runner::new(graph.build()?, model).with_config(RunConfig::from(&settings.run));
    let result = runner.run_blocking(tutor, "Write some examples of carnivorous plants?", ())?;

    println!("{}", result.final_output);
    Ok(())
}
