use std::error::Error;

use agents_quickstart::{
    Agent, AgentGraph, ChatCompletionsModel, RunConfig, Runner, Settings, ToolError, ToolOutcome,
    ToolSpec, init_logging,
};
use serde_json::{Value, json};

fn get_weather() -> Result<ToolSpec, Box<dyn Error>> {
    let tool = ToolSpec::new(
        "get_weather",
        "This is tool for getting weather from city. Takes the city name and returns its weather.",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "city": {"type": "string", "description": "City to look up"}
        },
        "required": ["city"],
        "additionalProperties": false
    }))?
    .with_handler(|args, _ctx| async move {
        match args.get("city").and_then(Value::as_str) {
            Some(city) => Ok(ToolOutcome::Text(format!(
                "Weather in {city} is sunny and 30°C."
            ))),
            None => Err(ToolError::Execution("city is required".to_string())),
        }
    });
    Ok(tool)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let settings = Settings::load()?;
    init_logging(&settings.logging)?;
    let model = ChatCompletionsModel::new(settings.resolve_model()?)?;

    let mut graph = AgentGraph::builder();
    let assistant = graph.add(
        Agent::builder("AI Assistant")
            .instructions(
                "You are a helpful Ai Assistant, use get_weather tool if someone asking about weather",
            )
            .tool(get_weather()?),
    );

    let runner = Runner::new(graph.build()?, model).with_config(RunConfig::from(&settings.run));
    let result = runner
        .run(assistant, "What is the weather in Islamabad?")
        .await?;

    println!("{}", result.final_output);
    Ok(())
}
