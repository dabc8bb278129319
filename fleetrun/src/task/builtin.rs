//! Built-in tasks.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use super::{Params, Task, TaskContext, TaskOutput, outputs_to_value};
use crate::error::{InvocationError, TaskError};
use crate::inventory::Host;

/// Retrieve structured facts. Param `getters`: list of getter names.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetFacts;

#[async_trait]
impl Task for GetFacts {
    fn name(&self) -> &str {
        "get_facts"
    }

    fn validate(&self, params: &Params) -> Result<(), InvocationError> {
        params.require_str_list(self.name(), "getters").map(|_| ())
    }

    async fn execute(&self, ctx: &TaskContext<'_>) -> Result<TaskOutput, TaskError> {
        let getters = ctx
            .params()
            .require_str_list(self.name(), "getters")
            .map_err(|e| TaskError::internal(e.to_string()))?;
        let facts = ctx.get_facts(&getters).await?;
        Ok(TaskOutput::unchanged(facts))
    }
}

/// Apply configuration.
///
/// Params: `config_commands` (list of lines) or `configuration` (text,
/// split into non-empty lines). A rejected batch fails the host with
/// `CommandError` carrying the device output, still flagged as changed when
/// lines before the rejected one stayed applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendConfig;

impl SendConfig {
    fn commands(&self, params: &Params) -> Result<Vec<String>, InvocationError> {
        if params.contains("config_commands") {
            return params.require_str_list(self.name(), "config_commands");
        }
        match params.get("configuration") {
            Some(Value::String(text)) => Ok(text
                .lines()
                .map(str::trim_end)
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Some(_) => Err(InvocationError::InvalidParams {
                task: self.name().to_string(),
                message: "'configuration' must be a string".to_string(),
            }),
            None => Err(InvocationError::InvalidParams {
                task: self.name().to_string(),
                message: "expected 'config_commands' or 'configuration'".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Task for SendConfig {
    fn name(&self) -> &str {
        "send_config"
    }

    fn validate(&self, params: &Params) -> Result<(), InvocationError> {
        self.commands(params).map(|_| ())
    }

    async fn execute(&self, ctx: &TaskContext<'_>) -> Result<TaskOutput, TaskError> {
        let commands = self
            .commands(ctx.params())
            .map_err(|e| TaskError::internal(e.to_string()))?;
        debug!("{}: sending {} config line(s)", ctx.host().hostname, commands.len());

        let outcome = ctx.send_config(&commands).await?;
        if !outcome.applied {
            let failure = outcome
                .failure
                .unwrap_or_else(|| "configuration not applied".to_string());
            return Err(TaskError::command(failure)
                .with_diagnostic(outcome.raw_output)
                .with_changed(outcome.changed));
        }
        Ok(TaskOutput::new(
            Value::String(outcome.raw_output),
            outcome.changed,
        ))
    }
}

/// Run operational commands. Param `commands`: list of commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendCommands;

#[async_trait]
impl Task for SendCommands {
    fn name(&self) -> &str {
        "send_commands"
    }

    fn validate(&self, params: &Params) -> Result<(), InvocationError> {
        params.require_str_list(self.name(), "commands").map(|_| ())
    }

    async fn execute(&self, ctx: &TaskContext<'_>) -> Result<TaskOutput, TaskError> {
        let commands = ctx
            .params()
            .require_str_list(self.name(), "commands")
            .map_err(|e| TaskError::internal(e.to_string()))?;
        let outputs = ctx.send_commands(&commands).await?;
        Ok(TaskOutput::unchanged(outputs_to_value(&outputs)))
    }
}

type TaskFn = dyn Fn(&Host, &Params) -> Result<Value, TaskError> + Send + Sync;

/// Task from a synchronous closure. Never reports a change.
///
/// ```rust
/// use fleetrun::task::FnTask;
/// use serde_json::json;
///
/// let greet = FnTask::new("greet", |host, params| {
///     let name = params.get_str("name").unwrap_or("there");
///     Ok(json!(format!("Hello {name}, this is {}", host.hostname)))
/// });
/// ```
#[derive(Clone)]
pub struct FnTask {
    name: String,
    func: Arc<TaskFn>,
}

impl FnTask {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Host, &Params) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

#[async_trait]
impl Task for FnTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &TaskContext<'_>) -> Result<TaskOutput, TaskError> {
        (self.func)(ctx.host(), ctx.params()).map(TaskOutput::unchanged)
    }
}

impl fmt::Debug for FnTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendRegistry, StaticFactBackend};
    use crate::error::ErrorKind;
    use crate::testing::ScriptedBackend;
    use serde_json::json;

    fn run_ctx<'a>(
        host: &'a Arc<Host>,
        params: &'a Params,
        backends: &'a BackendRegistry,
    ) -> TaskContext<'a> {
        TaskContext::new(host, params, backends)
    }

    #[test]
    fn test_get_facts_validation() {
        assert!(GetFacts.validate(&Params::new().with("getters", json!(["facts"]))).is_ok());
        assert!(GetFacts.validate(&Params::new()).is_err());
        assert!(GetFacts.validate(&Params::new().with("getters", "facts")).is_err());
    }

    #[test]
    fn test_send_config_params() {
        let params = Params::new().with("configuration", "hostname r1\n\n  \nntp server 1.1.1.1\n");
        assert_eq!(
            SendConfig.commands(&params).unwrap(),
            vec!["hostname r1", "ntp server 1.1.1.1"]
        );

        let params = Params::new().with("config_commands", json!(["a", "b"]));
        assert_eq!(SendConfig.commands(&params).unwrap(), vec!["a", "b"]);

        assert!(SendConfig.validate(&Params::new()).is_err());
        assert!(SendConfig.validate(&Params::new().with("configuration", 5)).is_err());
    }

    #[tokio::test]
    async fn test_get_facts_task() {
        let mut backends = BackendRegistry::new();
        backends.register_facts(
            "ios",
            Arc::new(StaticFactBackend::new("lab").with_default_facts("facts", json!({"vendor": "Cisco"}))),
        );
        let host = Arc::new(Host::new("r1").with_platform("ios"));
        let params = Params::new().with("getters", json!(["facts"]));

        let out = GetFacts.execute(&run_ctx(&host, &params, &backends)).await.unwrap();
        assert_eq!(out.output, json!({"facts": {"vendor": "Cisco"}}));
        assert!(!out.changed);

        let params = Params::new().with("getters", json!(["bgp_neighbors"]));
        let err = GetFacts.execute(&run_ctx(&host, &params, &backends)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedOperation);
    }

    #[tokio::test]
    async fn test_send_config_rejected_is_command_error() {
        let mut backends = BackendRegistry::new();
        backends.register("stub", Arc::new(ScriptedBackend::new().reject_config("r1")));
        let host = Arc::new(Host::new("r1").with_platform("stub"));
        let params = Params::new().with("config_commands", json!(["ntp srver 1.1.1.1"]));

        let err = SendConfig.execute(&run_ctx(&host, &params, &backends)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Command);
        assert!(!err.changed);
        assert!(err.diagnostic.unwrap().contains("% Invalid input"));
    }

    #[tokio::test]
    async fn test_send_config_partial_rejection_reports_change() {
        let mut backends = BackendRegistry::new();
        backends.register("stub", Arc::new(ScriptedBackend::new().reject_config_after("r1", 2)));
        let host = Arc::new(Host::new("r1").with_platform("stub"));
        let params = Params::new().with("config_commands", json!(["a", "b", "bad"]));

        let err = SendConfig.execute(&run_ctx(&host, &params, &backends)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Command);
        assert_eq!(err.message, "command 'bad' rejected after 2 of 3 applied");
        assert!(err.changed);
        assert!(err.diagnostic.unwrap().starts_with("a\nb\nbad"));
    }

    #[tokio::test]
    async fn test_send_config_and_commands() {
        let mut backends = BackendRegistry::new();
        backends.register("stub", Arc::new(ScriptedBackend::new()));
        let host = Arc::new(Host::new("r1").with_platform("stub"));

        let params = Params::new().with("config_commands", json!(["hostname r1"]));
        let out = SendConfig.execute(&run_ctx(&host, &params, &backends)).await.unwrap();
        assert!(out.changed);

        let params = Params::new().with("commands", json!(["show clock"]));
        let out = SendCommands.execute(&run_ctx(&host, &params, &backends)).await.unwrap();
        assert_eq!(out.output, json!([{"command": "show clock", "output": "r1: show clock"}]));
        assert!(!out.changed);
    }

    #[tokio::test]
    async fn test_fn_task() {
        let backends = BackendRegistry::new();
        let host = Arc::new(Host::new("r1").with_extra("site", "lab"));
        let params = Params::new().with("name", "Alice");

        let task = FnTask::new("greet", |host, params| {
            Ok(json!(format!(
                "Hello {} from {} at {}",
                params.get_str("name").unwrap_or("anon"),
                host.hostname,
                host.get_str("site").unwrap_or("?")
            )))
        });

        let out = task.execute(&run_ctx(&host, &params, &backends)).await.unwrap();
        assert_eq!(out.output, json!("Hello Alice from r1 at lab"));
        assert_eq!(task.name(), "greet");
    }
}
