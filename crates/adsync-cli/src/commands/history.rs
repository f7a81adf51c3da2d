//! History command - Show recent synchronization batches

use adsync_core::ports::IReportSink;
use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;

use super::open_store;
use crate::output::{format_duration_ms, get_formatter};
use crate::GlobalArgs;

#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Number of batches to show
    #[arg(long, default_value_t = 10)]
    pub limit: u32,
}

impl HistoryCommand {
    pub async fn execute(&self, global: &GlobalArgs) -> Result<()> {
        let config = global.load_config()?;
        let formatter = get_formatter(global.format);

        if !config.store.path.exists() {
            formatter.info("No batches recorded yet.");
            return Ok(());
        }

        let store = open_store(&config).await?;
        let reports = store
            .recent_batches(self.limit)
            .await
            .context("Failed to read batch history")?;

        if global.format.is_json() {
            let json = serde_json::to_value(&reports).context("Failed to serialize history")?;
            formatter.print_json(&json);
            return Ok(());
        }

        if reports.is_empty() {
            formatter.info("No batches recorded yet.");
            return Ok(());
        }

        println!(
            "{:<20} {:<7} {:>8} {:>8} {:>8} {:>8} {:>9}  {}",
            "Finished", "Kind", "Created", "Updated", "Skipped", "Failed", "Duration", "Result"
        );
        println!("{}", "-".repeat(88));
        for report in &reports {
            let result = match &report.aborted {
                Some(reason) => format!("stopped: {}", reason),
                None if report.counts.failed > 0 => "completed with failures".to_string(),
                None => "ok".to_string(),
            };
            println!(
                "{:<20} {:<7} {:>8} {:>8} {:>8} {:>8} {:>9}  {}",
                report
                    .finished_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
                report.kind.to_string(),
                report.counts.created,
                report.counts.updated,
                report.counts.skipped,
                report.counts.failed,
                format_duration_ms(report.elapsed_ms),
                result,
            );
        }
        println!();
        println!("Total: {} batch(es)", reports.len());

        Ok(())
    }
}
