//! Doctor command - verify system requirements and configuration.

use crate::cli::Output;
use crate::config::Settings;
use console::style;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    Output::header("Tripsy Doctor");
    println!();
    println!("Checking system requirements and configuration...\n");

    let mut checks = Vec::new();

    // Video analysis needs ffmpeg and ffprobe
    println!("{}", style("External Tools").bold());
    checks.push(check_tool("ffmpeg", &settings.media.ffmpeg_path, install_hint_ffmpeg()));
    checks.push(check_tool("ffprobe", &settings.media.ffprobe_path, install_hint_ffmpeg()));
    for check in &checks {
        check.print();
    }

    println!();

    println!("{}", style("API Configuration").bold());
    Output::kv("Provider", &settings.model.provider.to_string());
    Output::kv("Model", settings.model.model());
    let api_checks = vec![
        check_api_key(settings.model.api_key_var()),
        check_mail_token(&settings.mail.access_token_env),
    ];
    for check in &api_checks {
        check.print();
    }
    checks.extend(api_checks);

    println!();

    println!("{}", style("Directories").bold());
    let dir_check = check_temp_dir(settings);
    dir_check.print();
    checks.push(dir_check);

    println!();

    println!("{}", style("Configuration").bold());
    let config_path = config_path.unwrap_or_else(Settings::default_config_path);
    let config_check = check_config_file(&config_path);
    config_check.print();
    checks.push(config_check);

    println!();

    // Summary
    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Tripsy.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!(
            "All checks passed with {} warning(s).",
            warnings
        ));
    } else {
        Output::success("All checks passed! Tripsy is ready to use.");
    }

    Ok(())
}

/// Check if an external tool is available.
fn check_tool(name: &str, program: &str, hint: &str) -> CheckResult {
    match Command::new(program).arg("-version").output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("installed")
                .trim()
                .to_string();

            let version_display = if version.chars().count() > 50 {
                format!("{}...", version.chars().take(50).collect::<String>())
            } else {
                version
            };

            CheckResult::ok(name, &version_display)
        }
        Ok(_) => CheckResult::error(name, "installed but not working", hint),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            CheckResult::error(name, &format!("{} not found", program), hint)
        }
        Err(e) => CheckResult::error(name, &format!("error: {}", e), hint),
    }
}

/// Check that the model provider's API key is configured.
fn check_api_key(var: &str) -> CheckResult {
    match std::env::var(var) {
        Ok(key) if key.trim().is_empty() => CheckResult::error(
            var,
            "empty",
            &format!("Set with: export {}='...'", var),
        ),
        Ok(key) => CheckResult::ok(var, &format!("configured ({})", mask_secret(&key))),
        Err(_) => CheckResult::error(
            var,
            "not set",
            &format!("Set with: export {}='...'", var),
        ),
    }
}

/// Mail search is optional; a missing token only disables that tool.
fn check_mail_token(var: &str) -> CheckResult {
    match std::env::var(var) {
        Ok(token) if !token.trim().is_empty() => {
            CheckResult::ok(var, &format!("configured ({})", mask_secret(&token)))
        }
        _ => CheckResult::warning(
            var,
            "not set, mail search will fail",
            "Export a Gmail OAuth access token with the gmail.readonly scope",
        ),
    }
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "****".to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Check the directory keyframes are extracted into.
fn check_temp_dir(settings: &Settings) -> CheckResult {
    let dir = settings.temp_dir();
    if dir.is_dir() {
        CheckResult::ok("Temp directory", &format!("{}", dir.display()))
    } else {
        CheckResult::warning(
            "Temp directory",
            &format!("{} (will be created)", dir.display()),
            "Directory will be created on first use",
        )
    }
}

/// Check if config file exists.
fn check_config_file(config_path: &Path) -> CheckResult {
    if config_path.exists() {
        let size = std::fs::metadata(config_path)
            .map(|m| format_size(m.len()))
            .unwrap_or_else(|_| "unknown size".to_string());
        CheckResult::ok(
            "Config file",
            &format!("{} ({})", config_path.display(), size),
        )
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: tripsy config init",
        )
    }
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Platform-specific install hint for ffmpeg.
fn install_hint_ffmpeg() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install ffmpeg (or your package manager)"
    } else {
        "Install from: https://ffmpeg.org/download.html"
    }
}
