//! CLI subcommands and the wiring they share

pub mod batch;
pub mod check;
pub mod config;
pub mod history;

use std::sync::Arc;

use adsync_cache::{DatabasePool, SqliteUserStore};
use adsync_core::config::Config;
use adsync_ldap::LdapDirectory;
use adsync_sync::ConnectionManager;
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Opens the SQLite store named by `store.path`
pub async fn open_store(config: &Config) -> Result<Arc<SqliteUserStore>> {
    let pool = DatabasePool::new(&config.store.path)
        .await
        .with_context(|| format!("Failed to open user store {}", config.store.path.display()))?;
    Ok(Arc::new(SqliteUserStore::new(pool.pool().clone())))
}

/// Connection manager for the configured directory server
pub fn connection_manager(config: &Config) -> ConnectionManager {
    ConnectionManager::new(Arc::new(LdapDirectory::from_config(&config.directory)))
        .with_account_suffix(config.directory.account_suffix.clone())
}

/// Reads a password from the environment
///
/// A missing or unset variable yields an empty password, which the
/// connection manager refuses before contacting the directory.
pub fn password_from_env(var: Option<&str>) -> String {
    var.and_then(|name| std::env::var(name).ok())
        .unwrap_or_default()
}

/// Cancels `token` on Ctrl+C or SIGTERM
///
/// The running batch finishes its current principal and stops.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), stopping after the current principal");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping after the current principal");
        }
    }

    token.cancel();
}
