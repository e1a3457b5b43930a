//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a ratio as a percentage
pub fn format_pct(part: u64, total: u64) -> String {
    if total == 0 {
        return "-".to_string();
    }
    format!("{:.1}%", part as f64 / total as f64 * 100.0)
}

/// Color a run phase or component status
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ok" | "finished" => status.green().to_string(),
        "baseline" | "sustained" | "final" | "analyzing" => status.blue().to_string(),
        "starting" | "scaling" | "degraded" | "warning" => status.yellow().to_string(),
        "unhealthy" | "unreachable" | "failed" | "critical" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color an unreachable count: green when zero, red when every probe failed
pub fn color_unreachable(unreachable: u64, total: u64) -> String {
    let text = unreachable.to_string();
    if unreachable == 0 {
        text.green().to_string()
    } else if unreachable >= total {
        text.red().to_string()
    } else {
        text.yellow().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pct() {
        assert_eq!(format_pct(1, 4), "25.0%");
        assert_eq!(format_pct(0, 0), "-");
    }

    #[test]
    fn test_color_status_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(color_status("sustained"), "sustained");
        assert_eq!(color_unreachable(3, 3), "3");
    }
}
