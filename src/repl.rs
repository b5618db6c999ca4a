//! Line-oriented chat loop shared by the interactive programs.

use std::future::Future;
use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::AgentError;
use crate::runner::RunResult;

pub const EXIT_COMMANDS: [&str; 3] = ["quit", "exit", "bye"];

pub const DEFAULT_PROMPT: &str = "Ask Anything: ";

/// Case-insensitive, no trimming beyond the line terminator.
pub fn is_exit_command(line: &str) -> bool {
    let lowered = line.to_lowercase();
    EXIT_COMMANDS.contains(&lowered.as_str())
}

/// Reads lines until an exit command or EOF, handing each other line to
/// `turn` once. Turns share nothing with each other. Returns the number of
/// turns dispatched.
pub async fn run_loop<R, W, F, Fut>(
    reader: R,
    mut writer: W,
    prompt: &str,
    mut turn: F,
) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<RunResult, AgentError>>,
{
    let mut lines = reader.lines();
    let mut dispatched = 0;

    loop {
        writer.write_all(prompt.as_bytes()).await?;
        writer.flush().await?;

        let Some(line) = lines.next_line().await? else {
            debug!(dispatched, "input closed");
            writer.write_all(b"\n").await?;
            break;
        };

        if is_exit_command(&line) {
            writer.write_all(b"Goodbye!\n").await?;
            break;
        }

        dispatched += 1;
        let report = match turn(line).await {
            Ok(result) => format_result(&result),
            Err(err) => format_error(&err),
        };
        writer.write_all(report.as_bytes()).await?;
        writer.flush().await?;
    }

    writer.flush().await?;
    Ok(dispatched)
}

fn format_result(result: &RunResult) -> String {
    let mut report = String::new();
    if !result.input_guardrail_results.is_empty() {
        report.push_str("\nGuardrail did not trigger\n");
    }
    report.push_str(&format!("Agent: {}\n", result.final_output));
    report
}

fn format_error(err: &AgentError) -> String {
    match err.tripwire() {
        Some(tripwire) => format!(
            "\nGuardrail triggered\nGuardrail: {}\nAgent: {}\nDetails: {}\n",
            tripwire.guardrail, tripwire.agent, tripwire.output_info
        ),
        None => format!("Error: {err}\n"),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::error::ProviderError;
    use crate::guardrail::{GuardrailOutcome, GuardrailTripwire};
    use crate::output::FinalOutput;

    fn reply(text: &str) -> RunResult {
        RunResult {
            final_output: FinalOutput::Text(text.to_string()),
            last_agent: "Assistant".to_string(),
            input_guardrail_results: Vec::new(),
            new_items: Vec::new(),
        }
    }

    async fn drive(
        input: &str,
        respond: impl Fn(&str) -> Result<RunResult, AgentError>,
    ) -> (usize, Vec<String>, String) {
        let seen = RefCell::new(Vec::new());
        let mut output = Vec::new();

        let dispatched = run_loop(input.as_bytes(), &mut output, DEFAULT_PROMPT, |line| {
            seen.borrow_mut().push(line.clone());
            let result = respond(&line);
            async move { result }
        })
        .await
        .expect("loop runs");

        let output = String::from_utf8(output).expect("utf8 output");
        (dispatched, seen.into_inner(), output)
    }

    #[test]
    fn exit_commands_ignore_case_only() {
        assert!(is_exit_command("quit"));
        assert!(is_exit_command("EXIT"));
        assert!(is_exit_command("Bye"));
        assert!(!is_exit_command(" quit"));
        assert!(!is_exit_command("goodbye"));
    }

    #[tokio::test]
    async fn each_line_is_forwarded_once_until_sentinel() {
        let (dispatched, seen, output) = drive("hello\r\nWhat is 2+2?\nQUIT\nnever sent\n", |line| {
            Ok(reply(&format!("echo {line}")))
        })
        .await;

        assert_eq!(dispatched, 2);
        assert_eq!(seen, vec!["hello", "What is 2+2?"]);
        assert!(output.contains("Agent: echo hello\n"));
        assert!(output.contains("Agent: echo What is 2+2?\n"));
        assert!(output.ends_with("Goodbye!\n"));
        assert_eq!(output.matches(DEFAULT_PROMPT).count(), 3);
    }

    #[tokio::test]
    async fn end_of_input_stops_the_loop() {
        let (dispatched, seen, output) = drive("one question", |_| Ok(reply("answer"))).await;

        assert_eq!(dispatched, 1);
        assert_eq!(seen, vec!["one question"]);
        assert!(!output.contains("Goodbye!"));
    }

    #[tokio::test]
    async fn errors_are_printed_and_loop_continues() {
        let (dispatched, _, output) = drive("first\nsecond\nbye\n", |line| {
            if line == "first" {
                Err(AgentError::Provider(ProviderError::Request(
                    "api error 503".to_string(),
                )))
            } else {
                Ok(reply("fine"))
            }
        })
        .await;

        assert_eq!(dispatched, 2);
        assert!(output.contains("Error: provider request failed"));
        assert!(output.contains("Agent: fine\n"));
    }

    #[tokio::test]
    async fn guardrail_tripwire_is_reported_distinctly() {
        let (_, _, output) = drive("What's the weather?\nexit\n", |_| {
            Err(AgentError::GuardrailTriggered(Box::new(GuardrailTripwire {
                guardrail: "homework_guardrail".to_string(),
                agent: "Triage Agent".to_string(),
                output_info: json!({"is_homework": false, "reasoning": "weather"}),
            })))
        })
        .await;

        assert!(output.contains("Guardrail triggered\nGuardrail: homework_guardrail\n"));
        assert!(output.contains("\"is_homework\":false"));
        assert!(!output.contains("Error:"));
    }

    #[tokio::test]
    async fn passed_guardrails_are_announced() {
        let (_, _, output) = drive("Solve 2x = 8\nexit\n", |_| {
            let mut result = reply("x = 4");
            result.input_guardrail_results.push(GuardrailOutcome {
                guardrail: "homework_guardrail".to_string(),
                tripwire_triggered: false,
                output_info: json!({"is_homework": true}),
            });
            Ok(result)
        })
        .await;

        assert!(output.contains("Guardrail did not trigger\nAgent: x = 4\n"));
    }
}
