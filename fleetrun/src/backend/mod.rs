//! Device backends.
//!
//! A backend performs the actual device communication. The engine knows two
//! capabilities:
//!
//! - [`FactBackend`]: read-only structured queries, addressed by getter name
//! - [`ConfigBackend`]: ordered command batches that may change device state
//!
//! Which backend serves a host is decided by the host's platform tag through
//! a [`BackendRegistry`]. Two reference implementations ship with the crate:
//! [`StaticFactBackend`] (in-memory facts) and [`ssh::SshCliBackend`]
//! (interactive CLI over SSH).

mod registry;
pub mod ssh;
mod fixed;

pub use fixed::StaticFactBackend;
pub use registry::{BackendRegistry, PlatformBackends};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::BackendError;
use crate::inventory::Host;

/// Read-only structured queries against a device.
#[async_trait]
pub trait FactBackend: Send + Sync {
    /// Backend name, used in error messages.
    fn name(&self) -> &str;

    /// Getters this backend can answer.
    fn supported_getters(&self) -> Vec<&str>;

    /// Whether `getter` is supported.
    fn supports(&self, getter: &str) -> bool {
        self.supported_getters().contains(&getter)
    }

    /// Reject unsupported getters before any connection is attempted.
    fn validate_getters(&self, getters: &[String]) -> Result<(), BackendError> {
        match getters.iter().find(|g| !self.supports(g)) {
            Some(getter) => Err(BackendError::UnsupportedGetter {
                getter: getter.clone(),
                backend: self.name().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Retrieve facts as a JSON object keyed by getter.
    ///
    /// Must not alter device state.
    async fn get_facts(&self, host: &Host, getters: &[String]) -> Result<Value, BackendError>;
}

/// Command and configuration submission.
#[async_trait]
pub trait ConfigBackend: Send + Sync {
    /// Backend name, used in error messages.
    fn name(&self) -> &str;

    /// Apply an ordered batch of configuration commands.
    ///
    /// Either the whole batch applies, or the outcome reports
    /// `applied == false` with a failure description. A rejected batch on a
    /// device without commit/rollback may still leave earlier lines in
    /// place; the outcome reports that as `changed`. Connection and
    /// authentication problems are returned as errors.
    async fn send_config(
        &self,
        host: &Host,
        commands: &[String],
    ) -> Result<ConfigOutcome, BackendError>;

    /// Run operational (non-configuration) commands in order.
    async fn send_commands(
        &self,
        host: &Host,
        commands: &[String],
    ) -> Result<Vec<CommandOutput>, BackendError> {
        let _ = commands;
        Err(BackendError::UnsupportedOperation {
            operation: "send_commands".to_string(),
            platform: host.platform.clone().unwrap_or_default(),
        })
    }
}

/// Outcome of a configuration batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigOutcome {
    /// Whether the batch was applied.
    pub applied: bool,

    /// Whether device state changed.
    pub changed: bool,

    /// Device output for the whole exchange.
    pub raw_output: String,

    /// Why the batch was not applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ConfigOutcome {
    /// The batch was applied.
    pub fn applied(changed: bool, raw_output: impl Into<String>) -> Self {
        Self {
            applied: true,
            changed,
            raw_output: raw_output.into(),
            failure: None,
        }
    }

    /// The batch was rejected and the device left as it was.
    pub fn rejected(failure: impl Into<String>, raw_output: impl Into<String>) -> Self {
        Self {
            applied: false,
            changed: false,
            raw_output: raw_output.into(),
            failure: Some(failure.into()),
        }
    }

    /// Mark whether some lines stayed on the device.
    pub fn with_changed(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }
}

/// Output of one operational command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// The command that was sent.
    pub command: String,

    /// Normalized output (echo and trailing prompt removed).
    pub output: String,
}

impl CommandOutput {
    pub fn new(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            output: output.into(),
        }
    }
}
