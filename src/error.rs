//! Error types for Tripsy.

use thiserror::Error;

/// Library-level error type for Tripsy operations.
#[derive(Error, Debug)]
pub enum TripsyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid tool registration: {0}")]
    InvalidTool(String),

    #[error("No local implementation found for tool '{0}'")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Model boundary error: {0}")]
    ModelBoundary(String),

    #[error("Tool loop exceeded its budget of {max_cycles} dispatch cycle(s)")]
    LoopBudgetExceeded { max_cycles: usize },

    #[error("Conversation was cancelled")]
    Cancelled,

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ExternalToolNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Tripsy operations.
pub type Result<T> = std::result::Result<T, TripsyError>;
