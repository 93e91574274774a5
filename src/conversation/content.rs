//! Turn and content-block types shared by the loop and the model clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed block inside a turn or a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },
    /// Inline base64 image.
    Image { media_type: String, data: String },
    /// A tool invocation requested by the model.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// The outcome of a tool invocation, correlated by `tool_use_id`.
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ContentBlock {
    /// Create a text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Get the text of a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Interpret this block as a tool invocation request, if it is one.
    pub fn as_invocation(&self) -> Option<ToolInvocationRequest> {
        match self {
            ContentBlock::ToolUse { id, name, input } => Some(ToolInvocationRequest {
                invocation_id: id.clone(),
                tool_name: name.clone(),
                arguments: match input {
                    Value::Object(map) => map.clone(),
                    Value::Null => Map::new(),
                    other => {
                        // Non-object input is passed through under a single key so the
                        // capability can still reject it with a readable message.
                        let mut map = Map::new();
                        map.insert("input".to_string(), other.clone());
                        map
                    }
                },
            }),
            _ => None,
        }
    }
}

/// Content of a single turn: plain text or an ordered list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl TurnContent {
    /// View the content as blocks, wrapping plain text in a single text block.
    pub fn blocks(&self) -> Vec<ContentBlock> {
        match self {
            TurnContent::Text(text) => vec![ContentBlock::text(text.clone())],
            TurnContent::Blocks(blocks) => blocks.clone(),
        }
    }
}

/// One entry in the conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

impl Turn {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Blocks(blocks),
        }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Blocks(blocks),
        }
    }

    /// Tool invocation requests carried by this turn, in emission order.
    pub fn invocations(&self) -> Vec<ToolInvocationRequest> {
        match &self.content {
            TurnContent::Text(_) => Vec::new(),
            TurnContent::Blocks(blocks) => {
                blocks.iter().filter_map(ContentBlock::as_invocation).collect()
            }
        }
    }

    /// Tool outcomes carried by this turn, in order.
    pub fn outcomes(&self) -> Vec<ToolOutcome> {
        match &self.content {
            TurnContent::Text(_) => Vec::new(),
            TurnContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => Some(ToolOutcome {
                        invocation_id: tool_use_id.clone(),
                        result_text: content.clone(),
                        is_error: *is_error,
                    }),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationRequest {
    pub invocation_id: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

/// The result of dispatching one invocation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub invocation_id: String,
    pub result_text: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(invocation_id: impl Into<String>, result_text: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            result_text: result_text.into(),
            is_error: false,
        }
    }

    pub fn error(invocation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            result_text: message.into(),
            is_error: true,
        }
    }
}

impl From<ToolOutcome> for ContentBlock {
    fn from(outcome: ToolOutcome) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: outcome.invocation_id,
            content: outcome.result_text,
            is_error: outcome.is_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_use_block_wire_shape() {
        let block = ContentBlock::ToolUse {
            id: "toolu_1".to_string(),
            name: "fetch_emails".to_string(),
            input: json!({"start_date": "2025/03/05"}),
        };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_use");
        assert_eq!(value["name"], "fetch_emails");
    }

    #[test]
    fn test_tool_result_omits_is_error_when_false() {
        let block: ContentBlock = ToolOutcome::success("toolu_1", "ok").into();
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert!(value.get("is_error").is_none());

        let block: ContentBlock = ToolOutcome::error("toolu_2", "boom").into();
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["is_error"], true);
    }

    #[test]
    fn test_as_invocation_wraps_non_object_input() {
        let block = ContentBlock::ToolUse {
            id: "a".to_string(),
            name: "t".to_string(),
            input: json!("raw"),
        };
        let request = block.as_invocation().unwrap();
        assert_eq!(request.arguments.get("input"), Some(&json!("raw")));

        let block = ContentBlock::ToolUse {
            id: "b".to_string(),
            name: "t".to_string(),
            input: Value::Null,
        };
        assert!(block.as_invocation().unwrap().arguments.is_empty());
    }

    #[test]
    fn test_turn_invocations_keep_order() {
        let turn = Turn::assistant_blocks(vec![
            ContentBlock::text("Let me look."),
            ContentBlock::ToolUse {
                id: "1".to_string(),
                name: "a".to_string(),
                input: json!({}),
            },
            ContentBlock::ToolUse {
                id: "2".to_string(),
                name: "b".to_string(),
                input: json!({}),
            },
        ]);
        let ids: Vec<_> = turn.invocations().into_iter().map(|r| r.invocation_id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }
}
