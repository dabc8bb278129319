//! Run options.

use std::time::Duration;

use crate::error::InvocationError;

/// Concurrency ceiling used when none is given.
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Limits for one run.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use fleetrun::dispatch::RunOptions;
///
/// let options = RunOptions::new()
///     .concurrency(5)
///     .per_host_timeout(Duration::from_secs(60))
///     .overall_timeout(Duration::from_secs(600));
/// assert_eq!(options.effective_concurrency(100), 5);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Hosts in flight at once. Default: `min(host_count, 20)`. Never more
    /// than the number of selected hosts.
    pub concurrency: Option<usize>,

    /// Limit for a single host, connection included.
    pub per_host_timeout: Option<Duration>,

    /// Limit for the whole run. Hosts not finished by then are cancelled.
    pub overall_timeout: Option<Duration>,
}

impl RunOptions {
    /// Options with no limits beyond the default concurrency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency ceiling.
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(limit);
        self
    }

    /// Set the per-host timeout.
    pub fn per_host_timeout(mut self, timeout: Duration) -> Self {
        self.per_host_timeout = Some(timeout);
        self
    }

    /// Set the overall timeout.
    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = Some(timeout);
        self
    }

    /// Reject unusable values.
    pub fn validate(&self) -> Result<(), InvocationError> {
        if self.concurrency == Some(0) {
            return Err(invalid("concurrency must be at least 1"));
        }
        if self.per_host_timeout == Some(Duration::ZERO) {
            return Err(invalid("per-host timeout must be positive"));
        }
        if self.overall_timeout == Some(Duration::ZERO) {
            return Err(invalid("overall timeout must be positive"));
        }
        Ok(())
    }

    /// Admission limit for `host_count` hosts, between 1 and `host_count`.
    pub fn effective_concurrency(&self, host_count: usize) -> usize {
        self.concurrency
            .unwrap_or(DEFAULT_CONCURRENCY)
            .min(host_count)
            .max(1)
    }
}

fn invalid(message: &str) -> InvocationError {
    InvocationError::InvalidOptions {
        message: message.to_string(),
    }
}
