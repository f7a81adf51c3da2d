//! Execution budget controller
//!
//! Large batches can run for hours. Before the loop starts the
//! [`BudgetController`] makes sure the platform lets the process run at
//! least the required time, raising the limit when it can and warning when
//! it can't. It never fails the batch.

use std::sync::Arc;
use std::time::Duration;

use adsync_core::config::DEFAULT_REQUIRED_SECS;
use adsync_core::domain::PlatformLimitWarning;
use adsync_core::ports::IExecutionLimit;
use tracing::{debug, info, warn};

/// Result of [`BudgetController::ensure_long_running_budget`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetStatus {
    /// The limit already allowed the required time; nothing was changed
    AlreadySufficient { limit: Option<Duration> },
    /// The limit was raised and now allows the required time
    Raised { limit: Option<Duration> },
    /// The limit stays below the required time; the batch runs anyway
    Insufficient {
        limit: Option<Duration>,
        warning: PlatformLimitWarning,
    },
}

impl BudgetStatus {
    /// The effective limit after the check; `None` means unlimited or unknown
    pub fn limit(&self) -> Option<Duration> {
        match self {
            BudgetStatus::AlreadySufficient { limit }
            | BudgetStatus::Raised { limit }
            | BudgetStatus::Insufficient { limit, .. } => *limit,
        }
    }

    pub fn warning(&self) -> Option<&PlatformLimitWarning> {
        match self {
            BudgetStatus::Insufficient { warning, .. } => Some(warning),
            _ => None,
        }
    }
}

/// Raises the platform execution limit before a batch
pub struct BudgetController {
    limit: Arc<dyn IExecutionLimit>,
    required: Duration,
    span: tracing::Span,
}

impl BudgetController {
    /// Controller with the default five-hour requirement
    pub fn new(limit: Arc<dyn IExecutionLimit>) -> Self {
        Self {
            limit,
            required: Duration::from_secs(DEFAULT_REQUIRED_SECS),
            span: tracing::info_span!("budget"),
        }
    }

    #[must_use]
    pub fn with_required(mut self, required: Duration) -> Self {
        self.required = required;
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn required(&self) -> Duration {
        self.required
    }

    fn sufficient(&self, limit: Option<Duration>) -> bool {
        limit.map_or(true, |l| l >= self.required)
    }

    /// Makes sure the process may run at least the required time
    ///
    /// Reads the current limit and does nothing if it is sufficient.
    /// Otherwise asks for the required value, re-reads, and reports
    /// [`BudgetStatus::Insufficient`] with a warning if the platform kept a
    /// lower ceiling. Calling it again once the limit is sufficient changes
    /// nothing.
    pub fn ensure_long_running_budget(&self) -> BudgetStatus {
        let _guard = self.span.enter();
        let required_secs = self.required.as_secs();

        let current = match self.limit.current() {
            Ok(current) => current,
            Err(err) => {
                warn!(error = %err, "Cannot read execution time limit");
                return BudgetStatus::Insufficient {
                    limit: None,
                    warning: PlatformLimitWarning {
                        required_secs,
                        current_secs: None,
                    },
                };
            }
        };

        if self.sufficient(current) {
            debug!(
                current_secs = current.map(|d| d.as_secs()),
                required_secs, "Execution time limit already sufficient"
            );
            return BudgetStatus::AlreadySufficient { limit: current };
        }

        if let Err(err) = self.limit.raise_to(self.required) {
            debug!(error = %err, "Raising execution time limit failed");
        }

        let after = self.limit.current().unwrap_or(current);
        if self.sufficient(after) {
            info!(
                required_secs,
                current_secs = after.map(|d| d.as_secs()),
                "Raised execution time limit"
            );
            return BudgetStatus::Raised { limit: after };
        }

        let warning = PlatformLimitWarning {
            required_secs,
            current_secs: after.map(|d| d.as_secs()),
        };
        warn!(%warning, "Batch continues under a lower execution time limit");
        BudgetStatus::Insufficient {
            limit: after,
            warning,
        }
    }
}

/// Process CPU-time limit (`RLIMIT_CPU`, soft limit)
///
/// Raising the soft limit is capped at the hard limit; only privileged
/// processes could go higher, and we don't try.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuTimeLimit;

impl CpuTimeLimit {
    fn read() -> std::io::Result<libc::rlimit> {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: `limit` is a valid, writable rlimit for the duration of the call
        let rc = unsafe { libc::getrlimit(libc::RLIMIT_CPU, &mut limit) };
        if rc == 0 {
            Ok(limit)
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}

impl IExecutionLimit for CpuTimeLimit {
    fn current(&self) -> std::io::Result<Option<Duration>> {
        let limit = Self::read()?;
        if limit.rlim_cur == libc::RLIM_INFINITY {
            Ok(None)
        } else {
            Ok(Some(Duration::from_secs(limit.rlim_cur as u64)))
        }
    }

    fn raise_to(&self, target: Duration) -> std::io::Result<()> {
        let mut limit = Self::read()?;
        let wanted = target.as_secs() as libc::rlim_t;
        limit.rlim_cur = if limit.rlim_max == libc::RLIM_INFINITY {
            wanted
        } else {
            wanted.min(limit.rlim_max)
        };
        // SAFETY: `limit` is a valid rlimit read from the kernel above
        let rc = unsafe { libc::setrlimit(libc::RLIMIT_CPU, &limit) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}
