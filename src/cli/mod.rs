//! CLI module for Tripsy.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::config::ModelProvider;
use clap::{Parser, Subcommand};

/// Tripsy - personal travel organizer
///
/// Asks a language model about your trips and lets it search your mailbox
/// and look at uploaded photos and videos to answer.
#[derive(Parser, Debug)]
#[command(name = "tripsy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask Tripsy about your trips
    Chat {
        /// What you want to know, e.g. "find my hotel booking for March"
        prompt: String,

        /// Photo or video to include with the request
        #[arg(short, long)]
        attach: Option<String>,

        /// Model provider (anthropic, openai)
        #[arg(short, long)]
        provider: Option<ModelProvider>,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Maximum number of tool-dispatch cycles
        #[arg(long)]
        max_cycles: Option<usize>,

        /// Run the tools of one model turn concurrently
        #[arg(long)]
        parallel: bool,

        /// Print every turn exchanged with the model
        #[arg(long)]
        show_transcript: bool,
    },

    /// List the tools advertised to the model
    Tools,

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_command() {
        let cli = Cli::try_parse_from([
            "tripsy",
            "-vv",
            "chat",
            "where was this taken?",
            "--attach",
            "beach.jpg",
            "--provider",
            "openai",
            "--max-cycles",
            "4",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Chat {
                prompt,
                attach,
                provider,
                max_cycles,
                show_transcript,
                ..
            } => {
                assert_eq!(prompt, "where was this taken?");
                assert_eq!(attach.as_deref(), Some("beach.jpg"));
                assert_eq!(provider, Some(ModelProvider::OpenAi));
                assert_eq!(max_cycles, Some(4));
                assert!(!show_transcript);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_init() {
        let cli = Cli::try_parse_from(["tripsy", "-c", "/tmp/t.toml", "config", "init", "--force"])
            .unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/t.toml"));
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: true }
            }
        ));
    }
}
