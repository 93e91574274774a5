//! Configuration module for Tripsy.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, USER_PROMPT_VAR};
pub use settings::{
    GeneralSettings, MailSettings, MediaSettings, ModelProvider, ModelSettings,
    OrchestratorSettings, PromptSettings, Settings,
};
