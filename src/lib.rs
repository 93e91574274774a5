//! Tripsy - personal travel organizer
//!
//! A CLI assistant that answers travel questions by letting a language model
//! call local tools: searching your mailbox for bookings and working out where
//! an uploaded photo or video was taken.
//!
//! # Overview
//!
//! Tripsy allows you to:
//! - Ask about upcoming trips and have the model look up booking emails
//! - Identify the location shown in a photo
//! - Identify the location shown in a video from a handful of keyframes
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management and prompt templates
//! - `conversation` - Append-only transcript of turns and content blocks
//! - `tools` - Tool declarations, the capability registry and dispatch
//! - `model` - Model client abstraction (Anthropic, OpenAI, scripted)
//! - `capabilities` - Built-in travel tools (mail search, image and video location)
//! - `orchestrator` - The tool-use loop
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use tripsy::conversation::ContentBlock;
//! use tripsy::model::{ModelResponse, ScriptedClient};
//! use tripsy::orchestrator::Orchestrator;
//! use tripsy::tools::ToolDeclaration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Arc::new(ScriptedClient::new([
//!         ModelResponse::tool_use(vec![ContentBlock::ToolUse {
//!             id: "call_1".to_string(),
//!             name: "get_weather".to_string(),
//!             input: json!({ "city": "Lisbon" }),
//!         }]),
//!         ModelResponse::final_text("Sunny in Lisbon."),
//!     ]));
//!
//!     let mut orchestrator = Orchestrator::new(client);
//!     orchestrator.register_fn(
//!         ToolDeclaration::new(
//!             "get_weather",
//!             "Current weather for a city",
//!             json!({ "type": "object", "properties": { "city": { "type": "string" } } }),
//!         ),
//!         |_args| async { Ok("sunny") },
//!     )?;
//!
//!     let outcome = orchestrator.chat("What's the weather in Lisbon?").await?;
//!     println!("{}", outcome.text());
//!
//!     Ok(())
//! }
//! ```

pub mod capabilities;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod tools;

pub use error::{Result, TripsyError};
