//! Error types for fleetrun.
//!
//! Two families live here. [`Error`] covers failures that stop a run before
//! any host is touched (bad inventory, unknown task, malformed parameters).
//! [`TaskError`] is the per-host failure recorded in a
//! [`TaskResult`](crate::result::TaskResult); it never escapes a run.

use std::fmt;
use std::io;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Main error type for fleetrun operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Inventory construction errors
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Run invocation errors (raised before dispatch)
    #[error("Invocation error: {0}")]
    Invocation(#[from] InvocationError),

    /// Backend errors outside of a run (registry setup, profile compilation)
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Inventory validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Two hosts declared with the same hostname
    #[error("Duplicate host '{name}'")]
    DuplicateHost { name: String },

    /// Two groups declared with the same name
    #[error("Duplicate group '{name}'")]
    DuplicateGroup { name: String },

    /// A host or group references a group that does not exist
    #[error("'{owner}' references unknown group '{group}'")]
    UnknownGroup { owner: String, group: String },

    /// Group parents form a cycle
    #[error("Cyclic group reference: {}", path.join(" -> "))]
    GroupCycle { path: Vec<String> },
}

/// Errors raised while validating a run request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// No task registered under this name
    #[error("Unknown task '{name}'")]
    UnknownTask { name: String },

    /// A task with this name is already registered
    #[error("Task '{name}' already registered")]
    DuplicateTask { name: String },

    /// Task parameters failed validation
    #[error("Invalid parameters for task '{task}': {message}")]
    InvalidParams { task: String, message: String },

    /// Run options are unusable (zero concurrency, zero timeout)
    #[error("Invalid run options: {message}")]
    InvalidOptions { message: String },
}

/// Errors raised by device backends.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Failed to open a TCP connection
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Credentials rejected by the device
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Host has no credentials to offer
    #[error("No credentials configured for host '{host}'")]
    MissingCredentials { host: String },

    /// Private key could not be loaded
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host key differs from the known_hosts entry
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host key not present in known_hosts under strict checking
    #[error("Host key for {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Device rejected a command
    #[error("Command '{command}' rejected: {message}")]
    CommandRejected {
        command: String,
        message: String,
        output: String,
    },

    /// Getter not offered by the backend
    #[error("Getter '{getter}' not supported by backend '{backend}'")]
    UnsupportedGetter { getter: String, backend: String },

    /// Operation not offered for the host's platform
    #[error("Operation '{operation}' not supported for platform '{platform}'")]
    UnsupportedOperation { operation: String, platform: String },

    /// Host has no platform tag to select a backend with
    #[error("Host '{host}' has no platform")]
    NoPlatform { host: String },

    /// Invalid regex in a platform profile
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

impl BackendError {
    /// Map this error onto the per-host error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::ConnectionFailed { .. }
            | BackendError::Ssh(_)
            | BackendError::Timeout(_)
            | BackendError::Disconnected
            | BackendError::HostKeyChanged { .. }
            | BackendError::HostKeyUnknown { .. }
            | BackendError::KnownHosts(_) => ErrorKind::Connection,
            BackendError::AuthenticationFailed { .. }
            | BackendError::MissingCredentials { .. }
            | BackendError::Key(_) => ErrorKind::Auth,
            BackendError::CommandRejected { .. } => ErrorKind::Command,
            BackendError::UnsupportedGetter { .. }
            | BackendError::UnsupportedOperation { .. }
            | BackendError::NoPlatform { .. } => ErrorKind::UnsupportedOperation,
            BackendError::InvalidPattern(_) => ErrorKind::Internal,
        }
    }
}

/// Classification of a per-host failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Device unreachable, connection dropped or timed out.
    #[serde(rename = "ConnectionError")]
    Connection,
    /// Credentials rejected or missing.
    #[serde(rename = "AuthError")]
    Auth,
    /// Device rejected a command or configuration payload.
    #[serde(rename = "CommandError")]
    Command,
    /// Getter or operation not offered for this host's platform.
    UnsupportedOperation,
    /// The unit did not finish before the run deadline.
    Cancelled,
    /// Unexpected failure inside task logic.
    #[serde(rename = "InternalError")]
    Internal,
}

impl ErrorKind {
    /// Whether retrying without operator intervention could help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Connection | ErrorKind::Cancelled)
    }

    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::Command => "CommandError",
            ErrorKind::UnsupportedOperation => "UnsupportedOperation",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure detail for a single host.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{kind}: {message}")]
pub struct TaskError {
    /// Failure classification.
    pub kind: ErrorKind,

    /// Human-readable summary.
    pub message: String,

    /// Raw device output backing the failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,

    /// Whether the device was left changed despite the failure.
    #[serde(skip)]
    pub changed: bool,
}

impl TaskError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            diagnostic: None,
            changed: false,
        }
    }

    /// Record that part of the work stuck on the device.
    pub fn with_changed(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }

    /// Attach raw device output.
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    /// A device rejected a command.
    pub fn command(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Command, message)
    }

    /// The unit never finished.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Unexpected failure in task logic.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<BackendError> for TaskError {
    fn from(err: BackendError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        match err {
            BackendError::CommandRejected { output, .. } => {
                TaskError::new(kind, message).with_diagnostic(output)
            }
            _ => TaskError::new(kind, message),
        }
    }
}

/// Result type alias using fleetrun's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_kinds() {
        assert_eq!(BackendError::Disconnected.kind(), ErrorKind::Connection);
        assert_eq!(
            BackendError::Timeout(Duration::from_secs(5)).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            BackendError::AuthenticationFailed {
                user: "admin".into()
            }
            .kind(),
            ErrorKind::Auth
        );
        assert_eq!(
            BackendError::UnsupportedGetter {
                getter: "bgp".into(),
                backend: "static".into()
            }
            .kind(),
            ErrorKind::UnsupportedOperation
        );
    }

    #[test]
    fn test_command_rejection_keeps_device_output() {
        let err = TaskError::from(BackendError::CommandRejected {
            command: "ntp server".into(),
            message: "% Incomplete command".into(),
            output: "ntp server\n% Incomplete command".into(),
        });
        assert_eq!(err.kind, ErrorKind::Command);
        assert_eq!(
            err.diagnostic.as_deref(),
            Some("ntp server\n% Incomplete command")
        );
    }

    #[test]
    fn test_group_cycle_display() {
        let err = InventoryError::GroupCycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cyclic group reference: a -> b -> a");
    }

    #[test]
    fn test_kind_serializes_as_taxonomy_name() {
        let json = serde_json::to_string(&ErrorKind::Connection).unwrap();
        assert_eq!(json, "\"ConnectionError\"");
        assert_eq!(ErrorKind::Internal.to_string(), "InternalError");
    }
}
