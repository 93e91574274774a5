//! Config command implementation.

use crate::cli::{ConfigAction, Output};
use crate::config::Settings;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// Run the config command.
///
/// `config_path` is the `--config` override, if one was given.
pub fn run_config(action: &ConfigAction, settings: Settings, config_path: Option<PathBuf>) -> Result<()> {
    let config_path = config_path.unwrap_or_else(Settings::default_config_path);

    match action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(&settings)
                .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;
            println!("{}", toml_str);
        }

        ConfigAction::Path => {
            println!("{}", config_path.display());
        }

        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "Config already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
            }
            Settings::default().save_to(&config_path)?;
            Output::success(&format!("Wrote default config to {}", config_path.display()));
        }
    }

    Ok(())
}
