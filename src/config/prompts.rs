//! Prompt templates for Tripsy.
//!
//! The base prompt wraps the user's request; it can be replaced by pointing
//! `prompts.base_prompt_path` at a file containing `{{user_prompt}}`.

use std::collections::HashMap;

/// Placeholder replaced with the user's request.
pub const USER_PROMPT_VAR: &str = "user_prompt";

const DEFAULT_BASE_PROMPT: &str = r#"You are Tripsy, a personal travel organizer.

You can search the user's mailbox for trip-related emails (flights, hotels, rentals, reservations) and work out where an uploaded photo or video was taken.

Guidelines:
- Use 'fetch_emails' with a date range and keywords when the user asks about bookings or itineraries
- Use 'get_image_location' for uploaded photos and 'get_video_location' for uploaded videos
- Combine what you find into one organized overview: dates, places, confirmation numbers
- Suggest useful next steps for the trip when you have enough information
- If a tool fails, say what you could not check instead of guessing

User request:
{{user_prompt}}"#;

/// Prompt templates used to build the first turn of a conversation.
#[derive(Debug, Clone)]
pub struct Prompts {
    pub base: String,
    /// Custom variables from config, available in all prompts.
    pub variables: HashMap<String, String>,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_PROMPT.to_string(),
            variables: HashMap::new(),
        }
    }
}

impl Prompts {
    /// Load prompts, replacing the base prompt from a file when one is configured.
    pub fn load(
        base_prompt_path: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(path) = base_prompt_path {
            let path = shellexpand::tilde(path).to_string();
            prompts.base = std::fs::read_to_string(&path)?;
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }

    /// Wrap the user's request in the base prompt.
    pub fn render_base(&self, user_prompt: &str) -> String {
        let mut vars = HashMap::new();
        vars.insert(USER_PROMPT_VAR.to_string(), user_prompt.to_string());
        self.render_with_custom(&self.base, &vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_prompt_has_placeholder() {
        let prompts = Prompts::default();
        assert!(prompts.base.contains("{{user_prompt}}"));
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_render_base_with_custom_variables() {
        let mut custom = HashMap::new();
        custom.insert("home".to_string(), "Oslo".to_string());
        // The user prompt always wins over a custom variable of the same name.
        custom.insert("user_prompt".to_string(), "ignored".to_string());

        let prompts = Prompts {
            base: "From {{home}}: {{user_prompt}}".to_string(),
            variables: custom,
        };
        assert_eq!(
            prompts.render_base("find my hotel booking"),
            "From Oslo: find my hotel booking"
        );
    }

    #[test]
    fn test_load_base_prompt_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base_prompt.txt");
        std::fs::write(&path, "Plan this: {{user_prompt}}").unwrap();

        let prompts = Prompts::load(path.to_str(), None).unwrap();
        assert_eq!(prompts.render_base("Tokyo"), "Plan this: Tokyo");
    }
}
