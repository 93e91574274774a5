//! Chat command: one conversation with the model and the travel tools.

use crate::capabilities::{is_image, register_default_tools};
use crate::cli::output::format_duration;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{ModelProvider, Prompts, Settings};
use crate::conversation::Turn;
use crate::error::TripsyError;
use crate::model::create_model_client;
use crate::orchestrator::{ChatOutcome, Orchestrator};
use crate::tools::ToolRegistry;
use anyhow::{bail, Result};
use console::style;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Options for a single chat run.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub prompt: String,
    pub attach: Option<String>,
    pub provider: Option<ModelProvider>,
    pub model: Option<String>,
    pub max_cycles: Option<usize>,
    pub parallel: bool,
    pub show_transcript: bool,
}

/// Apply command-line overrides on top of the loaded settings.
fn apply_overrides(settings: &mut Settings, options: &ChatOptions) {
    if let Some(provider) = options.provider {
        if provider != settings.model.provider {
            settings.model.model = None;
        }
        settings.model.provider = provider;
    }
    if let Some(model) = &options.model {
        settings.model.model = Some(model.clone());
    }
    if let Some(max_cycles) = options.max_cycles {
        settings.orchestrator.max_cycles = max_cycles;
    }
    if options.parallel {
        settings.orchestrator.parallel_dispatch = true;
    }
}

/// Mention an uploaded file in the request so the model can pass its path to a tool.
fn with_attachment(prompt: &str, attachment: Option<&Path>) -> String {
    match attachment {
        Some(path) if is_image(path) => {
            format!("{} I have uploaded an image at {}.", prompt, path.display())
        }
        Some(path) => format!("{} I have uploaded a video at {}.", prompt, path.display()),
        None => prompt.to_string(),
    }
}

/// Run the chat command.
pub async fn run_chat(options: ChatOptions, mut settings: Settings) -> Result<()> {
    apply_overrides(&mut settings, &options);

    let attachment = match &options.attach {
        Some(raw) => match attachment_path(raw) {
            Some(path) => Some(path.canonicalize().unwrap_or(path)),
            None => bail!("Attachment not found: {}", raw),
        },
        None => None,
    };

    let operation = match &attachment {
        Some(path) if !is_image(path) => Operation::Video,
        _ => Operation::Chat,
    };
    if let Err(e) = preflight::check(operation, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'tripsy doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let prompts = Prompts::load(
        settings.prompts.base_prompt_path.as_deref(),
        Some(&settings.prompts.variables),
    )?;
    let request = prompts.render_base(&with_attachment(&options.prompt, attachment.as_deref()));
    debug!("Rendered prompt: {}", request);

    let client = create_model_client(&settings.model)?;
    let mut registry = ToolRegistry::new();
    register_default_tools(&mut registry, &settings, client.clone())?;
    let orchestrator = Orchestrator::from_settings(client, &settings).with_registry(registry);

    info!(
        "Using {} model {} with up to {} tool cycle(s)",
        settings.model.provider,
        settings.model.model(),
        orchestrator.max_cycles()
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let started = Instant::now();
    let spinner = Output::spinner("Planning your trip...");
    let result = orchestrator
        .chat_with_cancel(Turn::user_text(request), cancel)
        .await;
    spinner.finish_and_clear();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(TripsyError::Cancelled) => {
            Output::warning("Cancelled.");
            return Ok(());
        }
        Err(e @ TripsyError::LoopBudgetExceeded { .. }) => {
            Output::error(&e.to_string());
            Output::info("Raise the limit with --max-cycles or [orchestrator] max_cycles.");
            return Err(e.into());
        }
        Err(e) => {
            Output::error(&e.to_string());
            return Err(e.into());
        }
    };

    if options.show_transcript {
        Output::header("Transcript");
        for (index, turn) in outcome.transcript.turns().iter().enumerate() {
            Output::turn(index, turn);
        }
    }

    println!("\n{}\n", outcome.text());
    print_summary(&outcome, started.elapsed().as_secs_f64());

    Ok(())
}

fn print_summary(outcome: &ChatOutcome, elapsed: f64) {
    let invocations: Vec<_> = outcome
        .transcript
        .turns()
        .iter()
        .flat_map(|t| t.invocations())
        .collect();
    let failures = outcome
        .transcript
        .turns()
        .iter()
        .flat_map(|t| t.outcomes())
        .filter(|o| o.is_error)
        .count();

    if !invocations.is_empty() {
        println!("{}", style("Tools used:").dim());
        for invocation in &invocations {
            Output::list_item(&invocation.tool_name);
        }
    }

    let mut summary = format!(
        "{} cycle(s), {} tool call(s) in {}",
        outcome.cycles,
        invocations.len(),
        format_duration(elapsed)
    );
    if failures > 0 {
        summary.push_str(&format!(", {} failed", failures));
    }
    println!("{}", style(summary).dim());
}

/// Expand `~` and keep the path only if it names an existing file.
fn attachment_path(path: &str) -> Option<PathBuf> {
    let path = Settings::expand_path(path);
    path.is_file().then_some(path)
}
