//! Task dispatch across hosts.
//!
//! [`Runner`] bundles everything a run needs (inventory, backends, tasks,
//! default limits) into one immutable value. Each run:
//!
//! 1. validates options and task parameters; nothing is contacted if this
//!    fails
//! 2. spawns one unit per selected host; a semaphore admits at most
//!    `concurrency` of them at a time
//! 3. each unit runs the task under the per-host timeout, converting
//!    errors and panics into a [`TaskResult`]
//! 4. units send results over a channel to a single collector, which stops
//!    at the overall timeout and aborts whatever is still pending
//! 5. [`aggregate`] puts results in selection order and marks missing
//!    hosts as cancelled
//!
//! A failure on one host never fails the run. [`Runner::run`] only returns
//! `Err` for the pre-flight checks in step 1.

mod options;

pub use options::{DEFAULT_CONCURRENCY, RunOptions};

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use log::{debug, info, warn};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::backend::BackendRegistry;
use crate::error::{ErrorKind, InvocationError, Result, TaskError};
use crate::inventory::{Filter, Host, Inventory, Selection};
use crate::result::{AggregatedResult, TaskResult, aggregate};
use crate::task::{Params, Task, TaskContext, TaskRegistry};

/// Shared context for running tasks against an inventory.
///
/// # Example
///
/// ```rust
/// use fleetrun::backend::{BackendRegistry, StaticFactBackend};
/// use fleetrun::dispatch::Runner;
/// use fleetrun::inventory::{Filter, Host, Inventory};
/// use fleetrun::task::Params;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), fleetrun::Error> {
/// let inventory = Inventory::builder()
///     .host(Host::new("r1").with_platform("lab"))
///     .build()?;
///
/// let mut backends = BackendRegistry::new();
/// backends.register_facts(
///     "lab",
///     Arc::new(StaticFactBackend::new("lab").with_default_facts("facts", json!({"os": "ios"}))),
/// );
///
/// let runner = Runner::new(inventory, backends);
/// let result = runner
///     .run_task(&Filter::all(), "get_facts", Params::new().with("getters", json!(["facts"])), None)
///     .await?;
/// assert!(!result.any_failed());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Runner {
    inventory: Arc<Inventory>,
    backends: Arc<BackendRegistry>,
    tasks: TaskRegistry,
    defaults: RunOptions,
}

impl Runner {
    /// Create a runner with the built-in tasks and default options.
    pub fn new(inventory: Inventory, backends: BackendRegistry) -> Self {
        Self {
            inventory: Arc::new(inventory),
            backends: Arc::new(backends),
            tasks: TaskRegistry::with_builtins(),
            defaults: RunOptions::default(),
        }
    }

    /// Replace the task registry.
    pub fn with_tasks(mut self, tasks: TaskRegistry) -> Self {
        self.tasks = tasks;
        self
    }

    /// Options used by [`run_task`](Self::run_task) when none are given.
    pub fn with_default_options(mut self, options: RunOptions) -> Self {
        self.defaults = options;
        self
    }

    /// Add a task to the registry.
    pub fn register_task(&mut self, task: Arc<dyn Task>) -> std::result::Result<(), InvocationError> {
        self.tasks.register(task)
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// Run a registered task on every host matching `filter`.
    pub async fn run_task(
        &self,
        filter: &Filter,
        task_name: &str,
        params: Params,
        options: Option<RunOptions>,
    ) -> Result<AggregatedResult> {
        let task = self.tasks.get(task_name)?;
        let selection = self.inventory.filter(filter);
        self.run(&selection, task, params, options.unwrap_or(self.defaults))
            .await
    }

    /// Run `task` on every host of `selection`.
    pub async fn run(
        &self,
        selection: &Selection,
        task: Arc<dyn Task>,
        params: Params,
        options: RunOptions,
    ) -> Result<AggregatedResult> {
        options.validate()?;
        task.validate(&params)?;

        let start = Instant::now();
        info!("Running '{}' on {} host(s)", task.name(), selection.len());

        let result = self.dispatch(selection, task, params, options).await;

        info!(
            "Finished in {:?}: {} succeeded, {} failed, {} changed",
            start.elapsed(),
            result.succeeded().count(),
            result.failed().count(),
            result.changed().count()
        );
        Ok(result)
    }

    async fn dispatch(
        &self,
        selection: &Selection,
        task: Arc<dyn Task>,
        params: Params,
        options: RunOptions,
    ) -> AggregatedResult {
        if selection.is_empty() {
            return aggregate(selection, HashMap::new());
        }

        let limit = options.effective_concurrency(selection.len());
        debug!("Admitting {} host(s) at a time", limit);

        let semaphore = Arc::new(Semaphore::new(limit));
        let params = Arc::new(params);
        let (tx, mut rx) = mpsc::channel(selection.len());
        let mut units = JoinSet::new();

        for host in selection {
            let unit = Unit {
                host: host.clone(),
                task: task.clone(),
                params: params.clone(),
                backends: self.backends.clone(),
                timeout: options.per_host_timeout,
            };
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            units.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let result = unit.run().await;
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        let mut completed = HashMap::with_capacity(selection.len());
        let collect = async {
            while let Some(result) = rx.recv().await {
                completed.insert(result.hostname().to_string(), result);
            }
        };
        let finished = match options.overall_timeout {
            Some(limit) => tokio::time::timeout(limit, collect).await.is_ok(),
            None => {
                collect.await;
                true
            }
        };

        if !finished {
            warn!(
                "Overall timeout reached with {} of {} host(s) done; cancelling the rest",
                completed.len(),
                selection.len()
            );
            units.shutdown().await;
            // Units that finished right at the deadline
            while let Ok(result) = rx.try_recv() {
                completed.insert(result.hostname().to_string(), result);
            }
        }

        aggregate(selection, completed)
    }
}

/// Work for one host.
struct Unit {
    host: Arc<Host>,
    task: Arc<dyn Task>,
    params: Arc<Params>,
    backends: Arc<BackendRegistry>,
    timeout: Option<Duration>,
}

impl Unit {
    /// Never fails: every outcome becomes a `TaskResult`.
    async fn run(self) -> TaskResult {
        let start = Instant::now();
        let outcome = {
            let ctx = TaskContext::new(&self.host, &self.params, &self.backends);
            let execution = AssertUnwindSafe(self.task.execute(&ctx)).catch_unwind();
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, execution).await {
                    Ok(outcome) => outcome,
                    Err(_) => Ok(Err(TaskError::new(
                        ErrorKind::Connection,
                        format!("timed out after {limit:?}"),
                    ))),
                },
                None => execution.await,
            }
        };
        let elapsed = start.elapsed();

        match outcome {
            Ok(Ok(output)) => {
                debug!("{}: succeeded in {:?}", self.host.hostname, elapsed);
                TaskResult::success(self.host, output, elapsed)
            }
            Ok(Err(error)) => {
                warn!("{}: {}", self.host.hostname, error);
                TaskResult::failure(self.host, error, elapsed)
            }
            Err(panic) => {
                let message = format!("task panicked: {}", panic_message(&*panic));
                warn!("{}: {}", self.host.hostname, message);
                TaskResult::failure(self.host, TaskError::internal(message), elapsed)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string payload"
    }
}
