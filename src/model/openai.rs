//! OpenAI chat-completions client.

use super::{unique_declarations, ModelClient, ModelRequest, ModelResponse, StopReason, Usage};
use crate::config::ModelSettings;
use crate::conversation::{ContentBlock, Role, Turn, TurnContent};
use crate::error::{Result, TripsyError};
use crate::tools::ToolDeclaration;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContentPart, ChatCompletionTool, ChatCompletionToolType,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse, FinishReason, FunctionCall,
    FunctionObject, ImageUrlArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Create an OpenAI client with the given credentials and request timeout.
pub fn create_client(
    api_key: &str,
    base_url: &str,
    timeout: Duration,
) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TripsyError::ModelBoundary(format!("Failed to create HTTP client: {}", e)))?;

    let config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(base_url.trim_end_matches('/'));

    Ok(Client::with_config(config).with_http_client(http_client))
}

/// Model client backed by the chat-completions endpoint.
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    pub fn from_settings(settings: &ModelSettings) -> Result<Self> {
        let api_key = settings.api_key()?;
        let client = create_client(&api_key, settings.base_url(), settings.timeout())?;
        Ok(Self {
            client,
            model: settings.model().to_string(),
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.model, turns = request.messages.len()))]
    async fn send(&self, request: &ModelRequest<'_>) -> Result<ModelResponse> {
        let messages = build_messages(request)?;
        let tools = tool_definitions(request.tools);
        debug!("Sending {} message(s) with {} tool(s)", messages.len(), tools.len());

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(messages)
            .max_completion_tokens(request.max_tokens);
        if !tools.is_empty() {
            args.tools(tools);
        }
        let body = args.build().map_err(boundary)?;

        let response = self
            .client
            .chat()
            .create(body)
            .await
            .map_err(|e| TripsyError::ModelBoundary(format!("OpenAI API error: {}", e)))?;

        convert_response(response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn boundary(e: impl std::fmt::Display) -> TripsyError {
    TripsyError::ModelBoundary(e.to_string())
}

pub(crate) fn tool_definitions(tools: &[ToolDeclaration]) -> Vec<ChatCompletionTool> {
    unique_declarations(tools)
        .into_iter()
        .map(|t| ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name: t.name.clone(),
                description: Some(t.description.clone()),
                parameters: Some(t.input_schema.clone()),
                strict: None,
            },
        })
        .collect()
}

/// Translate the transcript into chat-completions messages.
///
/// Tool results become one `tool` message each, placed before any other
/// content of the same user turn.
pub(crate) fn build_messages(request: &ModelRequest<'_>) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();

    if let Some(system) = request.system {
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(boundary)?
                .into(),
        );
    }

    for turn in request.messages {
        match turn.role {
            Role::User => push_user_turn(&mut messages, turn)?,
            Role::Assistant => push_assistant_turn(&mut messages, turn)?,
        }
    }

    Ok(messages)
}

fn push_user_turn(messages: &mut Vec<ChatCompletionRequestMessage>, turn: &Turn) -> Result<()> {
    let blocks = match &turn.content {
        TurnContent::Text(text) => {
            messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(text.as_str())
                    .build()
                    .map_err(boundary)?
                    .into(),
            );
            return Ok(());
        }
        TurnContent::Blocks(blocks) => blocks,
    };

    let mut parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => messages.push(
                ChatCompletionRequestToolMessageArgs::default()
                    .tool_call_id(tool_use_id.as_str())
                    .content(content.as_str())
                    .build()
                    .map_err(boundary)?
                    .into(),
            ),
            ContentBlock::Text { text } => parts.push(
                ChatCompletionRequestMessageContentPartTextArgs::default()
                    .text(text.as_str())
                    .build()
                    .map_err(boundary)?
                    .into(),
            ),
            ContentBlock::Image { media_type, data } => {
                let image_url = ImageUrlArgs::default()
                    .url(format!("data:{};base64,{}", media_type, data))
                    .build()
                    .map_err(boundary)?;
                parts.push(
                    ChatCompletionRequestMessageContentPartImageArgs::default()
                        .image_url(image_url)
                        .build()
                        .map_err(boundary)?
                        .into(),
                );
            }
            ContentBlock::ToolUse { .. } => {
                debug!("Dropping tool_use block found in a user turn");
            }
        }
    }

    if !parts.is_empty() {
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(parts)
                .build()
                .map_err(boundary)?
                .into(),
        );
    }
    Ok(())
}

fn push_assistant_turn(messages: &mut Vec<ChatCompletionRequestMessage>, turn: &Turn) -> Result<()> {
    let blocks = turn.content.blocks();
    let text = blocks
        .iter()
        .filter_map(ContentBlock::as_text)
        .collect::<Vec<_>>()
        .join("\n");
    let tool_calls: Vec<ChatCompletionMessageToolCall> = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some(ChatCompletionMessageToolCall {
                id: id.clone(),
                r#type: ChatCompletionToolType::Function,
                function: FunctionCall {
                    name: name.clone(),
                    arguments: input.to_string(),
                },
            }),
            _ => None,
        })
        .collect();

    let mut args = ChatCompletionRequestAssistantMessageArgs::default();
    if !text.is_empty() {
        args.content(text);
    }
    if !tool_calls.is_empty() {
        args.tool_calls(tool_calls);
    }
    messages.push(args.build().map_err(boundary)?.into());
    Ok(())
}

/// Translate a chat-completions response into a [`ModelResponse`].
pub(crate) fn convert_response(response: CreateChatCompletionResponse) -> Result<ModelResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| TripsyError::ModelBoundary("No response from model".to_string()))?;

    let mut content = Vec::new();
    if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
        content.push(ContentBlock::Text { text });
    }

    let tool_calls = choice.message.tool_calls.unwrap_or_default();
    let has_tool_calls = !tool_calls.is_empty();
    for call in tool_calls {
        // Unparseable arguments are forwarded as a string so the capability reports the problem.
        let input = serde_json::from_str(&call.function.arguments)
            .unwrap_or(serde_json::Value::String(call.function.arguments));
        content.push(ContentBlock::ToolUse {
            id: call.id,
            name: call.function.name,
            input,
        });
    }

    let stop_reason = if has_tool_calls {
        StopReason::ToolUse
    } else {
        match choice.finish_reason {
            Some(FinishReason::Stop) | None => StopReason::EndTurn,
            Some(FinishReason::Length) => StopReason::MaxTokens,
            Some(FinishReason::ToolCalls) => StopReason::ToolUse,
            Some(FinishReason::ContentFilter) => StopReason::Other("content_filter".to_string()),
            Some(FinishReason::FunctionCall) => StopReason::Other("function_call".to_string()),
        }
    };

    let usage = response
        .usage
        .map(|u| Usage {
            input_tokens: u64::from(u.prompt_tokens),
            output_tokens: u64::from(u.completion_tokens),
        })
        .unwrap_or_default();

    Ok(ModelResponse {
        stop_reason,
        content,
        model: response.model,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Conversation, ToolOutcome};
    use serde_json::json;

    fn response_from(value: serde_json::Value) -> CreateChatCompletionResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_convert_tool_calls_response() {
        let response = response_from(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "fetch_emails",
                            "arguments": "{\"start_date\":\"2025/03/05\",\"end_date\":\"2025/03/15\"}"
                        }
                    }]
                }
            }],
            "usage": {"prompt_tokens": 50, "completion_tokens": 12, "total_tokens": 62}
        }));

        let converted = convert_response(response).unwrap();
        assert_eq!(converted.stop_reason, StopReason::ToolUse);
        assert_eq!(converted.usage.output_tokens, 12);
        let invocations = converted.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].invocation_id, "call_1");
        assert_eq!(invocations[0].arguments["start_date"], "2025/03/05");
    }

    #[test]
    fn test_convert_final_response() {
        let response = response_from(json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "finish_reason": "length",
                "message": {"role": "assistant", "content": "Your trip starts on"}
            }]
        }));

        let converted = convert_response(response).unwrap();
        assert_eq!(converted.stop_reason, StopReason::MaxTokens);
        assert_eq!(converted.text(), "Your trip starts on");
        assert!(converted.invocations().is_empty());
    }

    #[test]
    fn test_convert_response_without_choices() {
        let response = response_from(json!({
            "id": "chatcmpl-3",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4o",
            "choices": []
        }));
        assert!(matches!(
            convert_response(response),
            Err(TripsyError::ModelBoundary(_))
        ));
    }

    #[test]
    fn test_build_messages_one_tool_message_per_result() {
        let mut conversation = Conversation::seeded("Where am I staying?");
        conversation.push_assistant(vec![
            ContentBlock::text("Checking."),
            ContentBlock::ToolUse {
                id: "call_a".to_string(),
                name: "fetch_emails".to_string(),
                input: json!({"start_date": "2025/03/05"}),
            },
            ContentBlock::ToolUse {
                id: "call_b".to_string(),
                name: "get_image_location".to_string(),
                input: json!({"image_path": "a.jpg"}),
            },
        ]);
        conversation.push_outcomes(vec![
            ToolOutcome::success("call_a", "[]"),
            ToolOutcome::error("call_b", "Tool execution failed: missing file"),
        ]);

        let request = ModelRequest {
            messages: conversation.turns(),
            tools: &[],
            max_tokens: 256,
            system: Some("You are Tripsy."),
        };
        let messages = serde_json::to_value(build_messages(&request).unwrap()).unwrap();
        let roles: Vec<_> = messages
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap().to_string())
            .collect();

        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "tool"]);
        assert_eq!(messages[2]["tool_calls"][1]["id"], "call_b");
        assert_eq!(messages[3]["tool_call_id"], "call_a");
        assert_eq!(messages[4]["tool_call_id"], "call_b");
    }

    #[test]
    fn test_build_messages_encodes_image_as_data_url() {
        let turns = vec![Turn::user_blocks(vec![
            ContentBlock::Image {
                media_type: "image/png".to_string(),
                data: "iVBORw0=".to_string(),
            },
            ContentBlock::text("Where was this taken?"),
        ])];
        let request = ModelRequest {
            messages: &turns,
            tools: &[],
            max_tokens: 256,
            system: None,
        };
        let messages = serde_json::to_value(build_messages(&request).unwrap()).unwrap();
        let url = messages[0]["content"][0]["image_url"]["url"].as_str().unwrap();
        assert_eq!(url, "data:image/png;base64,iVBORw0=");
        assert_eq!(messages[0]["content"][1]["text"], "Where was this taken?");
    }

    #[test]
    fn test_tool_definitions_dedup_by_name() {
        let tools = vec![
            ToolDeclaration::new("fetch_emails", "old", json!({"type": "object"})),
            ToolDeclaration::new("fetch_emails", "new", json!({"type": "object"})),
        ];
        let definitions = tool_definitions(&tools);
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].function.description.as_deref(), Some("new"));
    }
}
