//! Tripsy CLI entry point.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tripsy::cli::commands::{self, ChatOptions};
use tripsy::cli::{Cli, Commands};
use tripsy::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.as_deref().map(Settings::expand_path);
    let settings = Settings::load_from(config_path.as_ref())?;

    // Initialize logging
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("tripsy={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    std::fs::create_dir_all(settings.temp_dir())?;

    // Execute command
    match cli.command {
        Commands::Chat {
            prompt,
            attach,
            provider,
            model,
            max_cycles,
            parallel,
            show_transcript,
        } => {
            let options = ChatOptions {
                prompt,
                attach,
                provider,
                model,
                max_cycles,
                parallel,
                show_transcript,
            };
            commands::run_chat(options, settings).await?;
        }

        Commands::Tools => {
            commands::run_tools()?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings, config_path)?;
        }

        Commands::Config { action } => {
            commands::run_config(&action, settings, config_path)?;
        }
    }

    Ok(())
}
