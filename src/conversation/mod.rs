//! Conversation state for a single orchestration run.
//!
//! A [`Conversation`] is an append-only transcript: turns can be pushed but
//! never edited or removed. One is created per `chat` call and handed back to
//! the caller when the run finishes.

mod content;

pub use content::{ContentBlock, Role, ToolInvocationRequest, ToolOutcome, Turn, TurnContent};

use serde::Serialize;

/// Ordered transcript of turns exchanged with the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// Create a conversation seeded with the caller's prompt.
    pub fn seeded(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::user_text(prompt)],
        }
    }

    /// Create a conversation from a pre-built first turn.
    pub fn with_turn(turn: Turn) -> Self {
        Self { turns: vec![turn] }
    }

    /// Append the assistant's raw content verbatim.
    pub fn push_assistant(&mut self, content: Vec<ContentBlock>) {
        self.turns.push(Turn::assistant_blocks(content));
    }

    /// Append one user turn holding every outcome of a dispatch cycle, in order.
    pub fn push_outcomes(&mut self, outcomes: Vec<ToolOutcome>) {
        let blocks = outcomes.into_iter().map(ContentBlock::from).collect();
        self.turns.push(Turn::user_blocks(blocks));
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent turn.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Role sequence of the transcript, useful for comparing run shapes.
    pub fn shape(&self) -> Vec<Role> {
        self.turns.iter().map(|t| t.role).collect()
    }
}
