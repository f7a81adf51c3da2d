//! Config command - View and validate adsync configuration
//!
//! - `show` prints the effective configuration (defaults filled in)
//! - `validate` parses the file and reports every problem found,
//!   including invalid attribute mappings

use std::path::Path;

use adsync_core::config::{Config, ValidationError};
use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use crate::output::get_formatter;
use crate::GlobalArgs;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, global: &GlobalArgs) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(global),
            ConfigCommand::Validate => execute_validate(global),
        }
    }
}

fn execute_show(global: &GlobalArgs) -> Result<()> {
    let formatter = get_formatter(global.format);
    let config = global.load_config()?;

    info!(config_path = %global.config_path.display(), "Showing configuration");

    if global.format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", global.config_path.display()));
        formatter.info("");
        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }

    Ok(())
}

/// Loads the file strictly; `Ok(None)` when it does not exist
fn load_strict(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    Config::load(path).map(Some)
}

fn execute_validate(global: &GlobalArgs) -> Result<()> {
    let formatter = get_formatter(global.format);
    let path = &global.config_path;

    let errors: Vec<String> = match load_strict(path) {
        Ok(Some(config)) => config.validate().iter().map(ValidationError::to_string).collect(),
        Ok(None) => {
            if global.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": path.display().to_string(),
                    "errors": ["Configuration file not found. Using defaults."],
                }));
            } else {
                formatter.info(&format!("Configuration file not found at {}", path.display()));
                formatter.info("Using default configuration.");
            }
            return Ok(());
        }
        Err(e) => vec![format!("Failed to parse configuration: {:#}", e)],
    };

    info!(config_path = %path.display(), errors = errors.len(), "Validated configuration");

    if global.format.is_json() {
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": path.display().to_string(),
            "errors": errors,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {}", error));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("configuration is invalid")
    }
}
