//! Batch report sink port (driven/secondary port)
//!
//! Receives each finalized [`BatchReport`] exactly once, after the batch has
//! ended. Nothing is written while a batch is still running.

use crate::domain::BatchReport;

/// Port trait for persisting batch history
#[async_trait::async_trait]
pub trait IReportSink: Send + Sync {
    /// Stores a finalized report
    async fn record_batch(&self, report: &BatchReport) -> anyhow::Result<()>;

    /// Returns the most recent reports, newest first
    async fn recent_batches(&self, limit: u32) -> anyhow::Result<Vec<BatchReport>>;
}
