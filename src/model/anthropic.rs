//! Anthropic Messages API client.

use super::types::{self, ErrorResponse, ImageSource, Message, MessageContent, Request, Response};
use super::{unique_declarations, ModelClient, ModelRequest, ModelResponse, StopReason, Usage};
use crate::config::ModelSettings;
use crate::conversation::{ContentBlock, Turn, TurnContent};
use crate::error::{Result, TripsyError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tracing::{debug, instrument, warn};

/// Client for `POST /v1/messages`.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    api_version: String,
    base_url: String,
    model: String,
}

impl AnthropicClient {
    /// Create a client for the given model and API key with default endpoint settings.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let settings = ModelSettings {
            model: Some(model.into()),
            ..Default::default()
        };
        Self::build(&settings, api_key.into())
    }

    /// Create a client from settings, reading the API key from the environment.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self> {
        let api_key = settings.api_key()?;
        Self::build(settings, api_key)
    }

    fn build(settings: &ModelSettings, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| TripsyError::ModelBoundary(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            api_version: settings.api_version.clone(),
            base_url: settings.base_url().to_string(),
            model: settings.model().to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|_| {
                TripsyError::Config("API key contains invalid header characters".to_string())
            })?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&self.api_version).map_err(|_| {
                TripsyError::Config("API version contains invalid header characters".to_string())
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    #[instrument(skip_all, fields(model = %self.model, turns = request.messages.len()))]
    async fn send(&self, request: &ModelRequest<'_>) -> Result<ModelResponse> {
        let body = build_request(&self.model, request);
        debug!("Sending {} turn(s) with {} tool(s)", body.messages.len(), body.tools.len());

        let response = self
            .client
            .post(self.messages_url())
            .headers(self.default_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| TripsyError::ModelBoundary(format!("Request to Anthropic failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("Anthropic returned {}", status);
            return Err(convert_error(status, &text));
        }

        let api_response: Response = response.json().await.map_err(|e| {
            TripsyError::ModelBoundary(format!("Failed to parse Anthropic response: {}", e))
        })?;

        convert_response(api_response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Translate a model request into the Anthropic wire body.
pub(crate) fn build_request<'a>(model: &'a str, request: &ModelRequest<'a>) -> Request<'a> {
    Request {
        model,
        messages: request.messages.iter().map(convert_turn).collect(),
        max_tokens: request.max_tokens,
        system: request.system,
        tools: unique_declarations(request.tools)
            .into_iter()
            .map(|t| types::Tool {
                name: &t.name,
                description: &t.description,
                input_schema: &t.input_schema,
            })
            .collect(),
    }
}

fn convert_turn(turn: &Turn) -> Message {
    let content = match &turn.content {
        TurnContent::Text(text) => MessageContent::Text(text.clone()),
        TurnContent::Blocks(blocks) => {
            MessageContent::Blocks(blocks.iter().map(convert_block).collect())
        }
    };
    Message {
        role: turn.role.as_str(),
        content,
    }
}

fn convert_block(block: &ContentBlock) -> types::ContentBlock {
    match block {
        ContentBlock::Text { text } => types::ContentBlock::Text { text: text.clone() },
        ContentBlock::Image { media_type, data } => types::ContentBlock::Image {
            source: ImageSource {
                source_type: "base64",
                media_type: media_type.clone(),
                data: data.clone(),
            },
        },
        ContentBlock::ToolUse { id, name, input } => types::ContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => types::ContentBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: content.clone(),
            is_error: *is_error,
        },
    }
}

/// Translate an Anthropic response into a [`ModelResponse`].
pub(crate) fn convert_response(response: Response) -> Result<ModelResponse> {
    let mut content = Vec::with_capacity(response.content.len());

    for block in response.content {
        match block.content_type.as_str() {
            "text" => content.push(ContentBlock::Text {
                text: block.text.unwrap_or_default(),
            }),
            "tool_use" => {
                let (Some(id), Some(name)) = (block.id, block.name) else {
                    return Err(TripsyError::ModelBoundary(
                        "tool_use block is missing its id or name".to_string(),
                    ));
                };
                content.push(ContentBlock::ToolUse {
                    id,
                    name,
                    input: block.input.unwrap_or_else(|| serde_json::json!({})),
                });
            }
            other => debug!("Skipping unsupported content block type: {}", other),
        }
    }

    let stop_reason = response
        .stop_reason
        .as_deref()
        .map(StopReason::from_wire)
        .unwrap_or(StopReason::EndTurn);

    Ok(ModelResponse {
        stop_reason,
        content,
        model: response.model,
        usage: Usage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        },
    })
}

/// Map a non-success HTTP response to a boundary error.
pub(crate) fn convert_error(status: StatusCode, body: &str) -> TripsyError {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| {
            if e.error.error_type.is_empty() {
                e.error.message
            } else {
                format!("{}: {}", e.error.error_type, e.error.message)
            }
        })
        .unwrap_or_else(|_| body.to_string());

    TripsyError::ModelBoundary(format!("Anthropic API error ({}): {}", status.as_u16(), detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Conversation, ToolOutcome};
    use crate::tools::ToolDeclaration;
    use serde_json::json;

    fn weather_tool() -> ToolDeclaration {
        ToolDeclaration::new(
            "get_weather",
            "Returns the current weather at a given location.",
            json!({
                "type": "object",
                "properties": {"location": {"type": "string"}},
                "required": ["location"]
            }),
        )
    }

    #[test]
    fn test_build_request_wire_shape() {
        let mut conversation = Conversation::seeded("What's the weather in Tokyo?");
        conversation.push_assistant(vec![ContentBlock::ToolUse {
            id: "toolu_1".to_string(),
            name: "get_weather".to_string(),
            input: json!({"location": "Tokyo"}),
        }]);
        conversation.push_outcomes(vec![ToolOutcome::success("toolu_1", "15 degrees")]);

        let tools = vec![weather_tool()];
        let request = ModelRequest {
            messages: conversation.turns(),
            tools: &tools,
            max_tokens: 1024,
            system: None,
        };
        let body = serde_json::to_value(build_request("claude-test", &request)).unwrap();

        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["max_tokens"], 1024);
        assert!(body.get("system").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "What's the weather in Tokyo?");
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
        assert!(body["messages"][2]["content"][0].get("is_error").is_none());
        assert_eq!(body["tools"][0]["name"], "get_weather");
        assert_eq!(body["tools"][0]["input_schema"]["required"][0], "location");
    }

    #[test]
    fn test_build_request_omits_empty_tools_and_encodes_images() {
        let turn = Turn::user_blocks(vec![
            ContentBlock::Image {
                media_type: "image/jpeg".to_string(),
                data: "aGVsbG8=".to_string(),
            },
            ContentBlock::text("Where is this?"),
        ]);
        let turns = vec![turn];
        let request = ModelRequest {
            messages: &turns,
            tools: &[],
            max_tokens: 512,
            system: Some("Be brief."),
        };
        let body = serde_json::to_value(build_request("m", &request)).unwrap();

        assert!(body.get("tools").is_none());
        assert_eq!(body["system"], "Be brief.");
        let image = &body["messages"][0]["content"][0];
        assert_eq!(image["type"], "image");
        assert_eq!(image["source"]["type"], "base64");
        assert_eq!(image["source"]["media_type"], "image/jpeg");
    }

    #[test]
    fn test_convert_tool_use_response() {
        let raw = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-7-sonnet-20250219",
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "Let me check your inbox."},
                {
                    "type": "tool_use",
                    "id": "toolu_01",
                    "name": "fetch_emails",
                    "input": {"start_date": "2025/03/05", "end_date": "2025/03/15"}
                }
            ],
            "usage": {"input_tokens": 120, "output_tokens": 40}
        });
        let response: Response = serde_json::from_value(raw).unwrap();
        let converted = convert_response(response).unwrap();

        assert_eq!(converted.stop_reason, StopReason::ToolUse);
        assert_eq!(converted.usage.input_tokens, 120);
        let invocations = converted.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].tool_name, "fetch_emails");
        assert_eq!(invocations[0].arguments["end_date"], "2025/03/15");
    }

    #[test]
    fn test_convert_response_skips_unknown_blocks() {
        let raw = json!({
            "model": "m",
            "stop_reason": "end_turn",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Done."}
            ]
        });
        let response: Response = serde_json::from_value(raw).unwrap();
        let converted = convert_response(response).unwrap();
        assert_eq!(converted.content.len(), 1);
        assert_eq!(converted.text(), "Done.");
        assert_eq!(converted.stop_reason, StopReason::EndTurn);
    }

    #[test]
    fn test_convert_response_rejects_tool_use_without_id() {
        let raw = json!({
            "model": "m",
            "stop_reason": "tool_use",
            "content": [{"type": "tool_use", "name": "fetch_emails", "input": {}}]
        });
        let response: Response = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            convert_response(response),
            Err(TripsyError::ModelBoundary(_))
        ));
    }

    #[test]
    fn test_convert_error_uses_api_message() {
        let body = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err = convert_error(StatusCode::from_u16(529).unwrap(), body);
        let message = err.to_string();
        assert!(message.contains("529"));
        assert!(message.contains("overloaded_error: Overloaded"));
    }

    #[test]
    fn test_convert_error_falls_back_to_body() {
        let err = convert_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(err.to_string().contains("upstream down"));
    }

    #[test]
    fn test_messages_url_trailing_slash() {
        let settings = ModelSettings {
            base_url: Some("https://proxy.example.com/".to_string()),
            ..Default::default()
        };
        let client = AnthropicClient::build(&settings, "sk-test".to_string()).unwrap();
        assert_eq!(client.messages_url(), "https://proxy.example.com/v1/messages");
    }

    #[test]
    fn test_default_headers() {
        let client = AnthropicClient::new("sk-ant-test123", "claude-test").unwrap();
        let headers = client.default_headers().unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "sk-ant-test123");
        assert_eq!(headers.get("anthropic-version").unwrap(), "2023-06-01");
        assert_eq!(client.model(), "claude-test");
    }

    #[test]
    fn test_default_headers_invalid_api_key() {
        let client = AnthropicClient::new("invalid\nkey", "m").unwrap();
        assert!(matches!(client.default_headers(), Err(TripsyError::Config(_))));
    }
}
