//! Configuration settings for Tripsy.

use crate::error::{Result, TripsyError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub model: ModelSettings,
    pub orchestrator: OrchestratorSettings,
    pub mail: MailSettings,
    pub media: MediaSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for temporary files (extracted keyframes).
    pub temp_dir: String,
    /// Log level used when no -v flag is given (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            temp_dir: "/tmp/tripsy".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Language-model provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Anthropic Messages API (default).
    #[default]
    Anthropic,
    /// OpenAI chat completions.
    #[serde(rename = "openai")]
    OpenAi,
}

impl ModelProvider {
    /// Environment variable that holds the provider's API key by default.
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ModelProvider::Anthropic => "ANTHROPIC_API_KEY",
            ModelProvider::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ModelProvider::Anthropic => "claude-3-7-sonnet-20250219",
            ModelProvider::OpenAi => "gpt-4o",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ModelProvider::Anthropic => "https://api.anthropic.com",
            ModelProvider::OpenAi => "https://api.openai.com/v1",
        }
    }
}

impl std::str::FromStr for ModelProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(ModelProvider::Anthropic),
            "openai" | "gpt" => Ok(ModelProvider::OpenAi),
            _ => Err(format!("Unknown model provider: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelProvider::Anthropic => write!(f, "anthropic"),
            ModelProvider::OpenAi => write!(f, "openai"),
        }
    }
}

/// Model endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub provider: ModelProvider,
    /// Model identifier sent with every request (provider default if unset).
    pub model: Option<String>,
    /// Maximum output tokens per model call.
    pub max_tokens: u32,
    /// Override for the provider's API base URL.
    pub base_url: Option<String>,
    /// Anthropic API version header.
    pub api_version: String,
    /// Environment variable holding the API key (provider default if unset).
    pub api_key_env: Option<String>,
    /// HTTP timeout for a single model call.
    pub timeout_seconds: u64,
    /// Optional system prompt sent with every call.
    pub system_prompt: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Anthropic,
            model: None,
            max_tokens: 1024,
            base_url: None,
            api_version: "2023-06-01".to_string(),
            api_key_env: None,
            timeout_seconds: 300,
            system_prompt: None,
        }
    }
}

impl ModelSettings {
    /// Name of the environment variable holding the API key.
    pub fn api_key_var(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }

    /// The model identifier, falling back to the provider default.
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Read the API key from the environment.
    pub fn api_key(&self) -> Result<String> {
        let var = self.api_key_var();
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            Ok(_) => Err(TripsyError::Config(format!("{} is empty", var))),
            Err(_) => Err(TripsyError::Config(format!(
                "{} not set. Set it with: export {}='...'",
                var, var
            ))),
        }
    }

    /// The API base URL, falling back to the provider default.
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Orchestration loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Maximum number of tool-dispatch cycles per conversation.
    pub max_cycles: usize,
    /// Run the tool requests of one model turn concurrently.
    pub parallel_dispatch: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_cycles: 16,
            parallel_dispatch: false,
        }
    }
}

/// Gmail access settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    /// Gmail REST API base URL.
    pub base_url: String,
    /// Environment variable holding an OAuth access token with gmail.readonly scope.
    pub access_token_env: String,
    /// Label searched when the model does not name any.
    pub default_label: String,
    /// Upper bound on messages listed per query.
    pub max_results: u32,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            base_url: "https://gmail.googleapis.com/gmail/v1".to_string(),
            access_token_env: "GMAIL_ACCESS_TOKEN".to_string(),
            default_label: "VACATION".to_string(),
            max_results: 1000,
        }
    }
}

impl MailSettings {
    /// Read the access token from the environment.
    pub fn access_token(&self) -> Result<String> {
        match std::env::var(&self.access_token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(TripsyError::Config(format!(
                "{} not set. Export a Gmail OAuth access token to enable mail search.",
                self.access_token_env
            ))),
        }
    }
}

/// Image and video analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Number of evenly spaced frames extracted from a video.
    pub keyframes: usize,
    /// Rotate landscape frames 90 degrees clockwise before analysis.
    pub rotate_landscape: bool,
    /// Output budget for the vision call.
    pub max_tokens: u32,
    pub image_prompt: String,
    pub video_prompt: String,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            keyframes: 4,
            rotate_landscape: true,
            max_tokens: 1024,
            image_prompt: "What is the location in the image?".to_string(),
            video_prompt: "Based on these screenshots, where is the location?".to_string(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// File holding a custom base prompt; must contain {{user_prompt}}.
    pub base_prompt_path: Option<String>,
    /// Custom variables available in the base prompt as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TripsyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tripsy")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.model.provider, ModelProvider::Anthropic);
        assert_eq!(settings.model.max_tokens, 1024);
        assert_eq!(settings.orchestrator.max_cycles, 16);
        assert!(!settings.orchestrator.parallel_dispatch);
        assert_eq!(settings.media.keyframes, 4);
        assert_eq!(settings.mail.default_label, "VACATION");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [model]
            provider = "openai"
            model = "gpt-4o"

            [orchestrator]
            max_cycles = 3
            "#,
        )
        .unwrap();

        assert_eq!(settings.model.provider, ModelProvider::OpenAi);
        assert_eq!(settings.model.api_key_var(), "OPENAI_API_KEY");
        assert_eq!(settings.model.base_url(), "https://api.openai.com/v1");
        assert_eq!(settings.orchestrator.max_cycles, 3);
        assert_eq!(settings.model.timeout_seconds, 300);
    }

    #[test]
    fn test_provider_only_config_uses_provider_model() {
        let settings: Settings = toml::from_str("[model]\nprovider = \"openai\"\n").unwrap();

        assert_eq!(settings.model.provider, ModelProvider::OpenAi);
        assert_eq!(settings.model.model, None);
        assert_eq!(settings.model.model(), "gpt-4o");
    }

    #[test]
    fn test_explicit_model_is_kept() {
        let settings: Settings =
            toml::from_str("[model]\nprovider = \"openai\"\nmodel = \"gpt-4.1\"\n").unwrap();
        assert_eq!(settings.model.model(), "gpt-4.1");
    }

    #[test]
    fn test_save_and_load_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.orchestrator.parallel_dispatch = true;
        settings.model.system_prompt = Some("Be brief.".to_string());
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert!(loaded.orchestrator.parallel_dispatch);
        assert_eq!(loaded.model.system_prompt.as_deref(), Some("Be brief."));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.model.model(), "claude-3-7-sonnet-20250219");
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("Claude".parse::<ModelProvider>().unwrap(), ModelProvider::Anthropic);
        assert_eq!("openai".parse::<ModelProvider>().unwrap(), ModelProvider::OpenAi);
        assert!("llama".parse::<ModelProvider>().is_err());
    }

    #[test]
    fn test_api_key_missing_var() {
        let settings = ModelSettings {
            api_key_env: Some("TRIPSY_TEST_UNSET_KEY_VAR".to_string()),
            ..Default::default()
        };
        let err = settings.api_key().unwrap_err();
        assert!(err.to_string().contains("TRIPSY_TEST_UNSET_KEY_VAR"));
    }
}
