//! Helpers shared by every subcommand: output format, config loading and
//! report emission.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use sports_edge_core::{ConfigLoader, EngineConfig, MetricValue};

pub const RULE: &str = "===============================================================";
pub const SECTION_RULE: &str = "---------------------------------------------------------------";

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    /// Parses an output format from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow!(
                "Unknown format: '{}'. Valid formats: text, json",
                s
            )),
        }
    }
}

/// Loads engine configuration from `path`, or from `config/Config.toml`
/// when no path is given. Environment overrides apply either way.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            if !Path::new(path).exists() {
                return Err(anyhow!("Config file not found: {path}"));
            }
            ConfigLoader::load_from(path)
                .with_context(|| format!("Failed to load config from {path}"))
        }
        None => ConfigLoader::load().context("Failed to load default config"),
    }
}

/// Prints `report` in the requested format and optionally writes it as
/// JSON to `output`.
pub fn emit<T: Serialize>(
    report: &T,
    format: OutputFormat,
    text: impl FnOnce(&T) -> String,
    output: Option<&str>,
) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", text(report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {path}"))?;
        tracing::info!("Results written to {}", path);
    }
    Ok(())
}

/// Formats a rate as a percentage, `N/A` when undefined.
pub fn pct(value: MetricValue) -> String {
    match value.value() {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => "N/A".to_string(),
    }
}

/// Banner line centred between full-width rules.
pub fn banner(out: &mut String, title: &str) {
    out.push('\n');
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("{title:^63}\n"));
    out.push_str(RULE);
    out.push('\n');
}

pub fn section(out: &mut String, title: &str) {
    out.push_str(title);
    out.push('\n');
    out.push_str(SECTION_RULE);
    out.push('\n');
}
