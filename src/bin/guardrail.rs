use std::error::Error;

use agents_quickstart::{
    Agent, AgentGraph, ChatCompletionsModel, InputGuardrail, OutputSchema, RunConfig, Runner,
    Settings, init_logging,
};
use serde_json::json;

const DETECTOR_INSTRUCTIONS: &str = "Determine if the user's query resembles a typical homework \
assignment or exam question, indicating an attempt to cheat. General questions about concepts are \
acceptable. Cheating: 'Fill in the blank: The capital of France is ____.', 'Which of the following \
best describes photosynthesis? A) Cellular respiration B) Conversion of light energy C) \
Evaporation D) Fermentation.' Not-Cheating: 'What is the capital of France?', 'Explain \
photosynthesis.'";

fn main() -> Result<(), Box<dyn Error>> {
    let settings = Settings::load()?;
    init_logging(&settings.logging)?;
    let model = ChatCompletionsModel::new(settings.resolve_model()?)?;

    let detection = OutputSchema::new(
        "HomeworkCheatDetectionOutput",
        json!({
            "type": "object",
            "properties": {
                "attempting_cheat": {"type": "boolean"},
                "explanation": {"type": "string"}
            },
            "required": ["attempting_cheat", "explanation"],
            "additionalProperties": false
        }),
    )?;

    let mut graph = AgentGraph::builder();
    graph.add(
        Agent::builder("Homework Cheat Detector")
            .instructions(DETECTOR_INSTRUCTIONS)
            .output_schema(detection),
    );
    let helper = graph.add(
        Agent::builder("Study Helper Agent")
            .instructions(
                "You assist users in studying by explaining concepts or providing guidance, \
                 without directly solving homework or test questions.",
            )
            .input_guardrail(InputGuardrail::trip_when_true(
                "cheat_detection_guardrail",
                "Homework Cheat Detector",
                "attempting_cheat",
            )),
    );

    let runner = Runner::new(graph.build()?, model).with_config(RunConfig::from(&settings.run));

    match runner.run_blocking(helper, "Father of Zoology is ____ .", ()) {
        Ok(result) => {
            println!("Guardrail didn't trigger");
            println!("Response: {}", result.final_output);
        }
        Err(err) => match err.tripwire() {
            Some(tripwire) => {
                println!("Homework cheat guardrail triggered");
                println!("Exception details: {tripwire}");
            }
            None => return Err(err.into()),
        },
    }

    Ok(())
}
