//! CLI output formatting utilities.

use crate::conversation::{ContentBlock, Role, Turn, TurnContent};
use crate::tools::ToolDeclaration;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print a tool declaration.
    pub fn tool(declaration: &ToolDeclaration) {
        println!(
            "\n{} {}",
            style(">>").green(),
            style(&declaration.name).bold()
        );
        println!("   {}", content_preview(&declaration.description, 200));

        let required: Vec<&str> = declaration.input_schema["required"]
            .as_array()
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        if let Some(properties) = declaration.input_schema["properties"].as_object() {
            for (name, schema) in properties {
                let kind = schema["type"].as_str().unwrap_or("any");
                let marker = if required.contains(&name.as_str()) { "" } else { "?" };
                println!("   {}{}: {}", style(name).cyan(), marker, style(kind).dim());
            }
        }
    }

    /// Print one transcript turn.
    pub fn turn(index: usize, turn: &Turn) {
        let role = match turn.role {
            Role::User => style("user").green().bold(),
            Role::Assistant => style("assistant").magenta().bold(),
        };
        println!("\n{} {}", style(format!("[{}]", index)).dim(), role);

        let blocks = match &turn.content {
            TurnContent::Text(text) => {
                println!("   {}", content_preview(text, 300));
                return;
            }
            TurnContent::Blocks(blocks) => blocks,
        };

        for block in blocks {
            match block {
                ContentBlock::Text { text } => println!("   {}", content_preview(text, 300)),
                ContentBlock::Image { media_type, data } => println!(
                    "   {}",
                    style(format!("<{} image, {} bytes base64>", media_type, data.len())).dim()
                ),
                ContentBlock::ToolUse { id, name, input } => println!(
                    "   {} {}({}) {}",
                    style("call").cyan(),
                    style(name).bold(),
                    content_preview(&input.to_string(), 120),
                    style(id).dim()
                ),
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    let label = if *is_error {
                        style("error").red()
                    } else {
                        style("result").green()
                    };
                    println!(
                        "   {} {} {}",
                        label,
                        style(tool_use_id).dim(),
                        content_preview(content, 200)
                    );
                }
            }
        }
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Format elapsed seconds as a short human-readable string.
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u32;
    let minutes = total_seconds / 60;
    let secs = total_seconds % 60;

    if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{:.1}s", seconds)
    }
}

/// Truncate content with ellipsis.
fn content_preview(content: &str, max_len: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_len {
        content
    } else {
        let truncated: String = content.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}
