//! Import and export commands
//!
//! Both commands:
//! 1. Load configuration and compile the attribute mappings
//! 2. Open the SQLite user store
//! 3. Wire the LDAP connector, identity matcher and budget controller
//! 4. Run one batch, cancelled by Ctrl+C or SIGTERM, and print its report

use std::sync::Arc;
use std::time::Duration;

use adsync_cache::SqliteUserStore;
use adsync_core::config::Config;
use adsync_core::domain::{BatchTrigger, LocalUserId};
use adsync_sync::{
    AttributeService, BatchOptions, BudgetController, ConnectionManager, CpuTimeLimit,
    ExportToDirectory, IdentityMatcher, ImportFromDirectory, SyncDirection, SyncOrchestrator,
};
use anyhow::{anyhow, bail, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{connection_manager, open_store, password_from_env, shutdown_signal};
use crate::output::{get_formatter, print_report};
use crate::GlobalArgs;

/// Import directory users into the local store
#[derive(Debug, Args)]
pub struct ImportCommand {
    /// Re-sync only this local user
    #[arg(long)]
    pub user_id: Option<u64>,

    /// Create local users for directory principals without a match
    #[arg(long)]
    pub create_users: bool,

    /// Stop the batch after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Export local profile fields to the directory
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Export only this local user
    #[arg(long)]
    pub user_id: Option<u64>,

    /// Bind as this account instead of the configured global account
    #[arg(long)]
    pub username: Option<String>,

    /// Environment variable holding the password for --username
    #[arg(long, default_value = "ADSYNC_PASSWORD")]
    pub password_env: String,

    /// Stop the batch after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Everything a direction and its orchestrator are built from
struct Wiring {
    store: Arc<SqliteUserStore>,
    connections: ConnectionManager,
    matcher: IdentityMatcher,
    attributes: AttributeService,
}

impl Wiring {
    async fn new(config: &Config) -> Result<Self> {
        let mappings = config.field_mappings().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            anyhow!("Invalid attribute mappings: {}", messages.join("; "))
        })?;

        let store = open_store(config).await?;
        let matcher = IdentityMatcher::new(store.clone(), config.identity.reserved_ids.clone());
        let attributes = AttributeService::new(mappings)
            .with_conflict_policy(config.attributes.conflict_policy);

        Ok(Self {
            store,
            connections: connection_manager(config),
            matcher,
            attributes,
        })
    }
}

/// Runs one batch and prints its report
///
/// Fails when the batch stopped early, so scripts see a non-zero exit.
async fn run_batch<D: SyncDirection>(
    global: &GlobalArgs,
    config: &Config,
    wiring: Wiring,
    direction: D,
    credentials: (String, String),
    trigger: BatchTrigger,
    timeout: Option<u64>,
) -> Result<()> {
    let formatter = get_formatter(global.format);
    let (username, password) = credentials;

    let budget = BudgetController::new(Arc::new(CpuTimeLimit))
        .with_required(Duration::from_secs(config.budget.required_secs));
    let mut orchestrator = SyncOrchestrator::new(direction, wiring.connections, wiring.matcher)
        .with_budget(budget)
        .with_report_sink(wiring.store.clone())
        .with_safety_margin(Duration::from_secs(config.budget.safety_margin_secs));

    let cancel = CancellationToken::new();
    let signal_task = tokio::spawn(shutdown_signal(cancel.clone()));

    let mut options = BatchOptions::new().with_cancellation(cancel);
    if let Some(secs) = timeout.or(config.budget.deadline_secs) {
        options = options.with_timeout(Duration::from_secs(secs));
    }

    let report = orchestrator
        .run(&username, &password, trigger, options)
        .await;
    signal_task.abort();

    print_report(formatter.as_ref(), &report, global.verbose);

    match &report.aborted {
        Some(reason) => bail!("{} stopped early: {}", report.kind, reason),
        None => Ok(()),
    }
}

impl ImportCommand {
    pub async fn execute(&self, global: &GlobalArgs) -> Result<()> {
        let config = global.load_config()?;
        let wiring = Wiring::new(&config).await?;

        let direction = ImportFromDirectory::new(
            wiring.store.clone(),
            wiring.matcher.clone(),
            wiring.attributes.clone(),
        )
        .with_filter(config.import.filter.clone())
        .create_users(self.create_users || config.import.create_users);

        let username = config.import.username.clone().unwrap_or_default();
        let password = password_from_env(config.import.password_env.as_deref());
        let trigger = BatchTrigger::from(self.user_id.map(LocalUserId::new));

        info!(username = %username, trigger = ?trigger, "Starting import");
        run_batch(
            global,
            &config,
            wiring,
            direction,
            (username, password),
            trigger,
            self.timeout,
        )
        .await
    }
}

impl ExportCommand {
    /// Account to bind as: `--username` first, then the configured global account
    fn credentials(&self, config: &Config) -> Result<(String, String)> {
        if let Some(username) = &self.username {
            return Ok((
                username.clone(),
                password_from_env(Some(self.password_env.as_str())),
            ));
        }
        if config.export.use_global_user {
            return Ok((
                config.export.global_user.clone().unwrap_or_default(),
                password_from_env(config.export.global_password_env.as_deref()),
            ));
        }
        bail!("No export account: pass --username or set export.use_global_user")
    }

    pub async fn execute(&self, global: &GlobalArgs) -> Result<()> {
        let config = global.load_config()?;
        if !config.export.enabled {
            get_formatter(global.format)
                .error("Export is disabled. Set export.enabled: true in the configuration.");
            return Ok(());
        }
        let credentials = self.credentials(&config)?;
        let wiring = Wiring::new(&config).await?;

        let direction = ExportToDirectory::new(
            wiring.store.clone(),
            wiring.matcher.clone(),
            wiring.attributes.clone(),
        )
        .with_filter(config.import.filter.clone());
        let trigger = BatchTrigger::from(self.user_id.map(LocalUserId::new));

        info!(username = %credentials.0, trigger = ?trigger, "Starting export");
        run_batch(
            global,
            &config,
            wiring,
            direction,
            credentials,
            trigger,
            self.timeout,
        )
        .await
    }
}
