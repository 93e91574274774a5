//! Pre-flight checks before talking to the model.
//!
//! Validates that required tools and configuration are available
//! before starting a conversation that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{Result, TripsyError};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// A conversation requires the model API key.
    Chat,
    /// Video analysis also requires ffmpeg and ffprobe.
    Video,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Chat => {
            settings.model.api_key()?;
        }
        Operation::Video => {
            settings.model.api_key()?;
            check_tool(&settings.media.ffmpeg_path)?;
            check_tool(&settings.media.ffprobe_path)?;
        }
    }
    Ok(())
}

/// Check if an external tool is available.
pub fn check_tool(name: &str) -> Result<()> {
    match Command::new(name).arg("-version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(TripsyError::ExternalToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(TripsyError::ExternalToolNotFound(name.to_string()))
        }
        Err(e) => Err(TripsyError::ExternalToolNotFound(format!("{}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_fails_chat() {
        let mut settings = Settings::default();
        settings.model.api_key_env = Some("TRIPSY_TEST_UNSET_KEY_7F3A".to_string());
        assert!(matches!(
            check(Operation::Chat, &settings),
            Err(TripsyError::Config(_))
        ));
    }

    #[test]
    fn test_missing_tool() {
        assert!(matches!(
            check_tool("tripsy-no-such-binary"),
            Err(TripsyError::ExternalToolNotFound(_))
        ));
    }
}
