//! Execution limit port
//!
//! Abstracts the platform's ceiling on how long the process may run, so the
//! budget controller can be tested without touching real resource limits.

use std::time::Duration;

/// Port trait for the platform execution-time limit
pub trait IExecutionLimit: Send + Sync {
    /// Current limit; `Ok(None)` means unlimited
    fn current(&self) -> std::io::Result<Option<Duration>>;

    /// Attempts to raise the limit to `limit`
    ///
    /// Implementations may silently cap the value; callers re-read with
    /// [`current`](Self::current) to learn what was applied.
    fn raise_to(&self, limit: Duration) -> std::io::Result<()>;
}
