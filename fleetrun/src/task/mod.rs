//! Tasks: the unit of work run against each selected host.
//!
//! A [`Task`] validates its [`Params`] once per run, before any host is
//! contacted, then executes once per host with a [`TaskContext`]. Tasks
//! only return values; formatting output is left to whoever reads the
//! [`AggregatedResult`](crate::result::AggregatedResult).
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use fleetrun::error::TaskError;
//! use fleetrun::task::{Params, Task, TaskContext, TaskOutput};
//! use serde_json::json;
//!
//! struct Greet;
//!
//! #[async_trait]
//! impl Task for Greet {
//!     fn name(&self) -> &str {
//!         "greet"
//!     }
//!
//!     async fn execute(&self, ctx: &TaskContext<'_>) -> Result<TaskOutput, TaskError> {
//!         let site = ctx.host().get_str("site").unwrap_or("nowhere");
//!         Ok(TaskOutput::unchanged(json!(format!("{} in {}", ctx.host().hostname, site))))
//!     }
//! }
//! ```

mod builtin;
mod params;
mod registry;

pub use builtin::{FnTask, GetFacts, SendCommands, SendConfig};
pub use params::Params;
pub use registry::TaskRegistry;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::backend::{BackendRegistry, CommandOutput, ConfigOutcome};
use crate::error::{InvocationError, TaskError};
use crate::inventory::Host;

/// A named, parameterized operation run against one host at a time.
#[async_trait]
pub trait Task: Send + Sync {
    /// Name the task is registered under.
    fn name(&self) -> &str;

    /// Check parameters before the run starts.
    fn validate(&self, params: &Params) -> Result<(), InvocationError> {
        let _ = params;
        Ok(())
    }

    /// Run against the host in `ctx`.
    async fn execute(&self, ctx: &TaskContext<'_>) -> Result<TaskOutput, TaskError>;
}

/// Value returned by a successful task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub output: Value,
    pub changed: bool,
}

impl TaskOutput {
    pub fn new(output: Value, changed: bool) -> Self {
        Self { output, changed }
    }

    /// Output of a task that left the device untouched.
    pub fn unchanged(output: Value) -> Self {
        Self::new(output, false)
    }
}

/// What a task sees while running against one host.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    host: &'a Arc<Host>,
    params: &'a Params,
    backends: &'a BackendRegistry,
}

impl<'a> TaskContext<'a> {
    pub fn new(host: &'a Arc<Host>, params: &'a Params, backends: &'a BackendRegistry) -> Self {
        Self {
            host,
            params,
            backends,
        }
    }

    pub fn host(&self) -> &Host {
        self.host
    }

    pub fn params(&self) -> &Params {
        self.params
    }

    pub fn backends(&self) -> &BackendRegistry {
        self.backends
    }

    /// Retrieve facts through the host's fact backend.
    pub async fn get_facts(&self, getters: &[String]) -> Result<Value, TaskError> {
        let backend = self.backends.facts_for(self.host)?;
        backend.validate_getters(getters)?;
        Ok(backend.get_facts(self.host, getters).await?)
    }

    /// Submit configuration through the host's config backend.
    pub async fn send_config(&self, commands: &[String]) -> Result<ConfigOutcome, TaskError> {
        let backend = self.backends.config_for(self.host)?;
        Ok(backend.send_config(self.host, commands).await?)
    }

    /// Run operational commands through the host's config backend.
    pub async fn send_commands(&self, commands: &[String]) -> Result<Vec<CommandOutput>, TaskError> {
        let backend = self.backends.config_for(self.host)?;
        Ok(backend.send_commands(self.host, commands).await?)
    }

    /// Run another task against the same host.
    ///
    /// Sub-task parameters are validated here; a rejection is a bug in the
    /// calling task and is reported as an internal error.
    pub async fn run(&self, task: &dyn Task, params: Params) -> Result<TaskOutput, TaskError> {
        task.validate(&params)
            .map_err(|e| TaskError::internal(e.to_string()))?;
        let ctx = TaskContext::new(self.host, &params, self.backends);
        task.execute(&ctx).await
    }
}

/// JSON form of command outputs: a list of `{command, output}` objects.
pub(crate) fn outputs_to_value(outputs: &[CommandOutput]) -> Value {
    Value::Array(
        outputs
            .iter()
            .map(|o| json!({"command": o.command, "output": o.output}))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StaticFactBackend;
    use crate::error::ErrorKind;
    use crate::testing::ScriptedBackend;

    struct Chain;

    #[async_trait]
    impl Task for Chain {
        fn name(&self) -> &str {
            "chain"
        }

        async fn execute(&self, ctx: &TaskContext<'_>) -> Result<TaskOutput, TaskError> {
            let facts = ctx
                .run(&GetFacts, Params::new().with("getters", json!(["facts"])))
                .await?;
            Ok(TaskOutput::unchanged(json!({"inner": facts.output})))
        }
    }

    /// Configure the NTP server named in the host's `ntp` attribute.
    struct SetNtp;

    #[async_trait]
    impl Task for SetNtp {
        fn name(&self) -> &str {
            "set_ntp"
        }

        async fn execute(&self, ctx: &TaskContext<'_>) -> Result<TaskOutput, TaskError> {
            let server = ctx
                .host()
                .get_str("ntp")
                .ok_or_else(|| TaskError::internal("host has no 'ntp' attribute"))?;
            let params = Params::new().with("config_commands", json!([format!("ntp server {server}")]));
            ctx.run(&SendConfig, params).await
        }
    }

    fn registry() -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register_facts(
            "linux",
            Arc::new(StaticFactBackend::new("static").with_default_facts("facts", json!({"os": "linux"}))),
        );
        registry
    }

    #[tokio::test]
    async fn test_sub_task_shares_host() {
        let host = Arc::new(Host::new("h1").with_platform("linux"));
        let params = Params::new();
        let backends = registry();
        let ctx = TaskContext::new(&host, &params, &backends);

        let out = Chain.execute(&ctx).await.unwrap();
        assert_eq!(out.output, json!({"inner": {"facts": {"os": "linux"}}}));
        assert!(!out.changed);
    }

    #[tokio::test]
    async fn test_sub_task_validation_is_internal() {
        let host = Arc::new(Host::new("h1").with_platform("linux"));
        let params = Params::new();
        let backends = registry();
        let ctx = TaskContext::new(&host, &params, &backends);

        let err = ctx.run(&GetFacts, Params::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_sub_task_sends_config_from_host_data() {
        let mut backends = BackendRegistry::new();
        backends.register("ios", Arc::new(ScriptedBackend::new().reject_config("r2")));
        let params = Params::new();

        let r1 = Arc::new(Host::new("r1").with_platform("ios").with_extra("ntp", "10.0.0.1"));
        let out = SetNtp.execute(&TaskContext::new(&r1, &params, &backends)).await.unwrap();
        assert_eq!(out.output, json!("ntp server 10.0.0.1"));
        assert!(out.changed);

        let r2 = Arc::new(Host::new("r2").with_platform("ios").with_extra("ntp", "10.0.0.2"));
        let err = SetNtp.execute(&TaskContext::new(&r2, &params, &backends)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Command);
        assert_eq!(err.message, "command 'ntp server 10.0.0.2' rejected after 0 of 1 applied");

        let bare = Arc::new(Host::new("r3").with_platform("ios"));
        let err = SetNtp.execute(&TaskContext::new(&bare, &params, &backends)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_missing_config_backend() {
        let host = Arc::new(Host::new("h1").with_platform("linux"));
        let params = Params::new();
        let backends = registry();
        let ctx = TaskContext::new(&host, &params, &backends);

        let err = ctx.send_config(&["hostname x".to_string()]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
    }
}
