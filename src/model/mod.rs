//! Boundary to the language-model service.
//!
//! The orchestrator only sees the [`ModelClient`] trait. Concrete clients
//! translate the transcript and tool declarations into a provider's wire
//! format and translate the reply back into a [`ModelResponse`].

mod anthropic;
mod openai;
mod scripted;
mod types;

pub use anthropic::AnthropicClient;
pub use openai::{create_client, OpenAiClient};
pub use scripted::{RecordedRequest, ScriptedClient};

use crate::config::{ModelProvider, ModelSettings};
use crate::conversation::{ContentBlock, ToolInvocationRequest, Turn};
use crate::error::Result;
use crate::tools::ToolDeclaration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The model finished its answer.
    EndTurn,
    /// The model wants one or more tools to run.
    ToolUse,
    /// The output budget ran out.
    MaxTokens,
    /// A stop sequence was hit.
    StopSequence,
    /// Any other provider-specific reason.
    Other(String),
}

impl StopReason {
    /// Parse a provider stop reason string.
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            other => StopReason::Other(other.to_string()),
        }
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self, StopReason::ToolUse)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::EndTurn => write!(f, "end_turn"),
            StopReason::ToolUse => write!(f, "tool_use"),
            StopReason::MaxTokens => write!(f, "max_tokens"),
            StopReason::StopSequence => write!(f, "stop_sequence"),
            StopReason::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A structured reply from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub stop_reason: StopReason,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub usage: Usage,
}

impl ModelResponse {
    /// A final response containing a single text block.
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            stop_reason: StopReason::EndTurn,
            content: vec![ContentBlock::text(text)],
            model: String::new(),
            usage: Usage::default(),
        }
    }

    /// A tool-use response with the given content blocks.
    pub fn tool_use(content: Vec<ContentBlock>) -> Self {
        Self {
            stop_reason: StopReason::ToolUse,
            content,
            model: String::new(),
            usage: Usage::default(),
        }
    }

    /// All text blocks joined by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool invocation requests, in the order the model emitted them.
    pub fn invocations(&self) -> Vec<ToolInvocationRequest> {
        self.content.iter().filter_map(ContentBlock::as_invocation).collect()
    }
}

/// Everything sent to the model in one call.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub messages: &'a [Turn],
    pub tools: &'a [ToolDeclaration],
    pub max_tokens: u32,
    pub system: Option<&'a str>,
}

/// A language-model endpoint that supports tool use.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the transcript and tool declarations, returning the model's reply.
    ///
    /// Connectivity, quota and parse failures are reported as
    /// [`crate::error::TripsyError::ModelBoundary`].
    async fn send(&self, request: &ModelRequest<'_>) -> Result<ModelResponse>;

    /// The model identifier this client targets.
    fn model(&self) -> &str;
}

/// Build the model client selected in the settings.
pub fn create_model_client(settings: &ModelSettings) -> Result<Arc<dyn ModelClient>> {
    match settings.provider {
        ModelProvider::Anthropic => Ok(Arc::new(AnthropicClient::from_settings(settings)?)),
        ModelProvider::OpenAi => Ok(Arc::new(OpenAiClient::from_settings(settings)?)),
    }
}

/// Keep only the last declaration for each tool name, preserving first-seen order.
pub(crate) fn unique_declarations(tools: &[ToolDeclaration]) -> Vec<&ToolDeclaration> {
    let mut unique: Vec<&ToolDeclaration> = Vec::with_capacity(tools.len());
    for tool in tools {
        match unique.iter_mut().find(|t| t.name == tool.name) {
            Some(existing) => *existing = tool,
            None => unique.push(tool),
        }
    }
    unique
}
