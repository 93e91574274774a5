//! Built-in travel capabilities exposed to the model.

pub mod email;
pub mod keyframes;
pub mod media;

pub use email::{build_query, filter_by_keywords, Email, EmailCapability, EmailQuery, GmailClient};
pub use keyframes::{extract_keyframes, frame_timestamps, probe_video, VideoProbe};
pub use media::{
    image_block, is_image, media_type_for, ImageLocationCapability, VideoLocationCapability,
};

use crate::config::Settings;
use crate::error::Result;
use crate::model::ModelClient;
use crate::tools::{ToolDeclaration, ToolRegistry};
use std::sync::Arc;

/// Declarations of every built-in capability.
pub fn default_declarations() -> Vec<ToolDeclaration> {
    vec![
        email::declaration(),
        media::image_declaration(),
        media::video_declaration(),
    ]
}

/// Register `fetch_emails`, `get_image_location` and `get_video_location`.
///
/// The media capabilities reuse `client` for their own analysis calls.
pub fn register_default_tools(
    registry: &mut ToolRegistry,
    settings: &Settings,
    client: Arc<dyn ModelClient>,
) -> Result<()> {
    registry.register(email::declaration(), EmailCapability::new(settings.mail.clone()))?;
    registry.register(
        media::image_declaration(),
        ImageLocationCapability::new(Arc::clone(&client), settings.media.clone()),
    )?;
    registry.register(
        media::video_declaration(),
        VideoLocationCapability::new(client, settings.media.clone(), settings.temp_dir()),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedClient;

    #[test]
    fn test_default_declarations_are_valid() {
        let declarations = default_declarations();
        let names: Vec<_> = declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["fetch_emails", "get_image_location", "get_video_location"]);
        for declaration in &declarations {
            declaration.validate().unwrap();
        }
    }

    #[test]
    fn test_register_default_tools() {
        let mut registry = ToolRegistry::new();
        let client = Arc::new(ScriptedClient::new(Vec::new()));
        register_default_tools(&mut registry, &Settings::default(), client).unwrap();

        assert_eq!(registry.len(), 3);
        assert!(registry.contains("fetch_emails"));
        assert_eq!(registry.declarations(), default_declarations().as_slice());
    }
}
