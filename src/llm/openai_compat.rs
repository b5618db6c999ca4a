use std::borrow::Cow;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::ModelHandle;
use crate::error::ProviderError;
use crate::llm::{
    ChatModel, ModelCompletion, ModelMessage, ModelResponseFormat, ModelToolCall,
    ModelToolChoice, ModelToolDefinition, ModelUsage,
};

const EMPTY_USER_CONTENT_FALLBACK: &str = " ";

/// Chat-completions adapter for OpenAI-compatible endpoints
/// (Gemini's `/v1beta/openai/` layer by default).
#[derive(Debug, Clone)]
pub struct ChatCompletionsModel {
    client: Client,
    handle: ModelHandle,
}

impl ChatCompletionsModel {
    pub fn new(handle: ModelHandle) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(Self { client, handle })
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    fn endpoint(&self) -> String {
        let base = self.handle.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl ChatModel for ChatCompletionsModel {
    async fn invoke(
        &self,
        messages: &[ModelMessage],
        tools: &[ModelToolDefinition],
        tool_choice: ModelToolChoice,
        response_format: Option<&ModelResponseFormat>,
    ) -> Result<ModelCompletion, ProviderError> {
        let request = build_request(messages, tools, tool_choice, response_format, &self.handle);
        debug!(
            model = %self.handle.model,
            messages = request.messages.len(),
            tools = tools.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.handle.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Request(format_api_error(status, &body)));
        }

        let payload = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|err| ProviderError::Response(err.to_string()))?;

        normalize_response(payload)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum WireMessage<'a> {
    System {
        content: &'a str,
    },
    User {
        content: &'a str,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<&'a str>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<WireToolCall<'a>>,
    },
    Tool {
        tool_call_id: &'a str,
        content: Cow<'a, str>,
    },
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireCallFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireCallFunction<'a> {
    name: &'a str,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<AssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    #[serde(rename = "type", alias = "status")]
    type_: Option<String>,
    code: Option<Value>,
}

fn build_request<'a>(
    messages: &'a [ModelMessage],
    tools: &'a [ModelToolDefinition],
    tool_choice: ModelToolChoice,
    response_format: Option<&ModelResponseFormat>,
    handle: &'a ModelHandle,
) -> ChatCompletionRequest<'a> {
    let mut wire_messages = messages.iter().filter_map(wire_message).collect::<Vec<_>>();
    if wire_messages
        .iter()
        .all(|message| matches!(message, WireMessage::System { .. }))
    {
        wire_messages.push(WireMessage::User {
            content: EMPTY_USER_CONTENT_FALLBACK,
        });
    }

    let wire_tools = tools
        .iter()
        .map(|tool| WireTool {
            kind: "function",
            function: WireFunction {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.parameters,
            },
        })
        .collect::<Vec<_>>();

    // Sending a choice without tools is rejected by the endpoint.
    let tool_choice = (!tools.is_empty()).then(|| match tool_choice {
        ModelToolChoice::Auto => json!("auto"),
        ModelToolChoice::None => json!("none"),
        ModelToolChoice::Tool(name) => json!({"type": "function", "function": {"name": name}}),
    });

    let response_format = response_format.map(|format| {
        json!({
            "type": "json_schema",
            "json_schema": {"name": format.name, "schema": format.schema},
        })
    });

    ChatCompletionRequest {
        model: &handle.model,
        messages: wire_messages,
        tools: wire_tools,
        tool_choice,
        response_format,
        temperature: handle.temperature,
        max_tokens: handle.max_tokens,
    }
}

/// Empty system and user turns are dropped, as are assistant turns with
/// neither text nor tool calls.
fn wire_message(message: &ModelMessage) -> Option<WireMessage<'_>> {
    match message {
        ModelMessage::System(content) if !content.is_empty() => {
            Some(WireMessage::System { content })
        }
        ModelMessage::User(content) if !content.is_empty() => Some(WireMessage::User { content }),
        ModelMessage::System(_) | ModelMessage::User(_) => None,
        ModelMessage::Assistant {
            content,
            tool_calls,
        } => {
            let content = content.as_deref().filter(|text| !text.is_empty());
            if content.is_none() && tool_calls.is_empty() {
                return None;
            }
            Some(WireMessage::Assistant {
                content,
                tool_calls: tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: &call.id,
                        kind: "function",
                        function: WireCallFunction {
                            name: &call.name,
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect(),
            })
        }
        ModelMessage::ToolResult {
            tool_call_id,
            content,
            is_error,
            ..
        } => Some(WireMessage::Tool {
            tool_call_id,
            content: if *is_error {
                Cow::Owned(format!("Error: {content}"))
            } else {
                Cow::Borrowed(content)
            },
        }),
    }
}

fn normalize_response(response: ChatCompletionResponse) -> Result<ModelCompletion, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Response("response missing choices".to_string()))?;

    let message = choice
        .message
        .ok_or_else(|| ProviderError::Response("response missing choice message".to_string()))?;

    let tool_calls = message
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(index, call)| model_tool_call(index, call))
        .collect::<Result<Vec<_>, _>>()?;

    let usage = response.usage.map(|usage| ModelUsage {
        prompt_tokens: usage.prompt_tokens.unwrap_or(0),
        completion_tokens: usage.completion_tokens.unwrap_or(0),
    });

    Ok(ModelCompletion {
        text: message.content.filter(|text| !text.is_empty()),
        thinking: message.reasoning_content.filter(|text| !text.is_empty()),
        tool_calls,
        usage,
    })
}

fn model_tool_call(index: usize, call: ResponseToolCall) -> Result<ModelToolCall, ProviderError> {
    let ResponseToolCall {
        id,
        function: ResponseFunction { name, arguments },
    } = call;

    let arguments = match arguments.trim() {
        "" => json!({}),
        raw => serde_json::from_str::<Value>(raw).map_err(|err| {
            ProviderError::Response(format!(
                "arguments of tool call `{name}` are not valid JSON: {err}"
            ))
        })?,
    };

    // Gemini leaves ids empty; tool results still need one to refer to.
    let id = if id.is_empty() { format!("call_{index}") } else { id };

    Ok(ModelToolCall {
        id,
        name,
        arguments,
    })
}

fn format_api_error(status: StatusCode, body: &str) -> String {
    // Gemini wraps the envelope in a one element array. Serde would also
    // accept that array as a struct sequence, so unwrap it by hand first.
    let parsed = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        let envelope = match value {
            Value::Array(items) => items.into_iter().next()?,
            other => other,
        };
        serde_json::from_value::<ErrorEnvelope>(envelope).ok()
    });

    if let Some(parsed) = parsed {
        let code = parsed
            .error
            .code
            .map(|value| match value {
                Value::String(value) => value,
                other => other.to_string(),
            })
            .unwrap_or_else(|| status.as_u16().to_string());
        let error_type = parsed
            .error
            .type_
            .unwrap_or_else(|| status.to_string().to_uppercase());
        let message = parsed
            .error
            .message
            .unwrap_or_else(|| "unknown api error".to_string());

        return format!("api error {code} {error_type}: {message}");
    }

    if body.is_empty() {
        format!("api request failed ({status})")
    } else {
        format!("api request failed ({status}): {body}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tool_definition() -> ModelToolDefinition {
        ModelToolDefinition {
            name: "get_weather".to_string(),
            description: "Get the weather for a city".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string"}
                },
                "required": ["city"],
                "additionalProperties": false
            }),
        }
    }

    #[test]
    fn build_request_serializes_messages_tools_and_tool_choice() {
        let messages = vec![
            ModelMessage::System("You are helpful".to_string()),
            ModelMessage::User("What is the weather in Lahore?".to_string()),
            ModelMessage::Assistant {
                content: Some("Calling tool".to_string()),
                tool_calls: vec![ModelToolCall {
                    id: "call_1".to_string(),
                    name: "get_weather".to_string(),
                    arguments: json!({"city": "Lahore"}),
                }],
            },
            ModelMessage::ToolResult {
                tool_call_id: "call_1".to_string(),
                tool_name: "get_weather".to_string(),
                content: "Weather in Lahore is sunny and 30°C.".to_string(),
                is_error: false,
            },
        ];

        let mut handle = ModelHandle::new("key", "gemini-2.0-flash");
        handle.temperature = Some(0.2);
        handle.max_tokens = Some(512);

        let tools = [tool_definition()];
        let request = build_request(
            &messages,
            &tools,
            ModelToolChoice::Tool("get_weather".to_string()),
            None,
            &handle,
        );
        let value = serde_json::to_value(request).expect("serializes");

        assert_eq!(value["model"], "gemini-2.0-flash");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], "You are helpful");
        assert_eq!(value["messages"][2]["role"], "assistant");
        assert_eq!(
            value["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"city\":\"Lahore\"}"
        );
        assert_eq!(value["messages"][3]["role"], "tool");
        assert_eq!(value["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(value["tools"][0]["function"]["name"], "get_weather");
        assert_eq!(value["tool_choice"]["type"], "function");
        assert_eq!(value["tool_choice"]["function"]["name"], "get_weather");
        assert!((value["temperature"].as_f64().unwrap_or_default() - 0.2).abs() < 1e-6);
        assert_eq!(value["max_tokens"], 512);
        assert!(value.get("response_format").is_none());
    }

    #[test]
    fn build_request_includes_json_schema_response_format() {
        let messages = vec![ModelMessage::User("Father of Zoology is ____ .".to_string())];
        let format = ModelResponseFormat {
            name: "homework_output".to_string(),
            schema: json!({
                "type": "object",
                "properties": {"is_homework": {"type": "boolean"}},
                "required": ["is_homework"]
            }),
        };
        let handle = ModelHandle::new("key", "gemini-2.0-flash");

        let request = build_request(&messages, &[], ModelToolChoice::None, Some(&format), &handle);
        let value = serde_json::to_value(request).expect("serializes");

        assert_eq!(value["response_format"]["type"], "json_schema");
        assert_eq!(value["response_format"]["json_schema"]["name"], "homework_output");
        assert_eq!(
            value["response_format"]["json_schema"]["schema"]["required"][0],
            "is_homework"
        );
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
    }

    #[test]
    fn build_request_adds_fallback_content_for_empty_user_message() {
        let messages = vec![
            ModelMessage::System("You are helpful".to_string()),
            ModelMessage::User(String::new()),
        ];
        let handle = ModelHandle::new("key", "gemini-2.0-flash");

        let request = build_request(&messages, &[], ModelToolChoice::Auto, None, &handle);
        let value = serde_json::to_value(request).expect("serializes");

        assert_eq!(
            value["messages"].as_array().map(|values| values.len()),
            Some(2)
        );
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], " ");
    }

    #[test]
    fn normalize_response_extracts_text_tool_calls_and_usage() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "answer",
                    "tool_calls": [{
                        "id": "",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Lahore\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 11, "completion_tokens": 7}
        }))
        .expect("response deserializes");

        let completion = normalize_response(response).expect("response normalizes");

        assert_eq!(completion.text.as_deref(), Some("answer"));
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "get_weather");
        assert_eq!(completion.tool_calls[0].id, "call_0");
        assert_eq!(completion.tool_calls[0].arguments, json!({"city": "Lahore"}));
        assert_eq!(
            completion.usage,
            Some(ModelUsage {
                prompt_tokens: 11,
                completion_tokens: 7,
            })
        );
    }

    #[test]
    fn normalize_response_requires_choices() {
        let err = normalize_response(ChatCompletionResponse {
            choices: Vec::new(),
            usage: None,
        })
        .expect_err("should fail");

        match err {
            ProviderError::Response(message) => {
                assert!(message.contains("missing choices"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn normalize_response_fails_on_invalid_tool_arguments() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_x",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{not json}"}
                    }]
                }
            }]
        }))
        .expect("response deserializes");

        let err = normalize_response(response).expect_err("should fail");
        match err {
            ProviderError::Response(message) => {
                assert!(message.contains("not valid JSON"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn api_errors_are_summarized_for_both_envelope_shapes() {
        let openai = format_api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error": {"message": "bad key", "type": "invalid_request_error", "code": "invalid_api_key"}}"#,
        );
        assert_eq!(openai, "api error invalid_api_key invalid_request_error: bad key");

        let gemini = format_api_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"[{"error": {"code": 429, "message": "quota exceeded", "status": "RESOURCE_EXHAUSTED"}}]"#,
        );
        assert_eq!(gemini, "api error 429 RESOURCE_EXHAUSTED: quota exceeded");

        let empty = format_api_error(StatusCode::BAD_GATEWAY, "");
        assert!(empty.starts_with("api request failed (502"));
    }

    #[test]
    fn gemini_array_envelope_keeps_status_and_message() {
        let body = r#"[{"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}}]"#;
        let summary = format_api_error(StatusCode::BAD_REQUEST, body);
        assert_eq!(
            summary,
            "api error 400 INVALID_ARGUMENT: API key not valid. Please pass a valid API key."
        );
        assert!(!summary.contains("unknown api error"));
    }

    #[test]
    fn arrays_without_an_envelope_fall_back_to_raw_body() {
        let summary = format_api_error(StatusCode::INTERNAL_SERVER_ERROR, r#"["oops"]"#);
        assert_eq!(summary, r#"api request failed (500 Internal Server Error): ["oops"]"#);

        let summary = format_api_error(StatusCode::INTERNAL_SERVER_ERROR, "[]");
        assert!(summary.ends_with(": []"));
    }
}
