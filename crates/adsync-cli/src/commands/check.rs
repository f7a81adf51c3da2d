//! Check command - Verify directory credentials
//!
//! Opens a session with the given account, verifies it with a second bind
//! and closes it again. Nothing is read or written.

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::{connection_manager, password_from_env};
use crate::output::get_formatter;
use crate::GlobalArgs;

#[derive(Debug, Args)]
pub struct CheckCommand {
    /// Account to bind as; defaults to import.username
    #[arg(long)]
    pub username: Option<String>,

    /// Environment variable holding the password
    #[arg(long)]
    pub password_env: Option<String>,
}

impl CheckCommand {
    pub async fn execute(&self, global: &GlobalArgs) -> Result<()> {
        let config = global.load_config()?;
        let formatter = get_formatter(global.format);

        let username = self
            .username
            .clone()
            .or_else(|| config.import.username.clone())
            .unwrap_or_default();
        let password_env = self
            .password_env
            .as_deref()
            .or(config.import.password_env.as_deref());
        let password = password_from_env(password_env);

        info!(username = %username, url = %config.directory.url(), "Checking credentials");
        let valid = connection_manager(&config)
            .verify(&username, &password)
            .await;

        if global.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "valid": valid,
                "username": username,
                "url": config.directory.url(),
            }));
        } else if valid {
            formatter.success(&format!("'{}' can bind to {}", username, config.directory.url()));
        } else {
            formatter.error(&format!(
                "'{}' cannot bind to {}",
                username,
                config.directory.url()
            ));
            if password.is_empty() {
                formatter.info(&format!(
                    "No password found in ${}",
                    password_env.unwrap_or("ADSYNC_PASSWORD")
                ));
            }
        }

        if valid {
            Ok(())
        } else {
            anyhow::bail!("credential check failed")
        }
    }
}
