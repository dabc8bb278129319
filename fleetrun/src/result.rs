//! Per-host results and their aggregation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ErrorKind, TaskError};
use crate::inventory::{Host, Selection};
use crate::task::TaskOutput;

/// Outcome of running a task on one host.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// The host this result belongs to.
    pub host: Arc<Host>,

    /// Whether the task succeeded.
    pub succeeded: bool,

    /// Task output on success.
    pub output: Option<Value>,

    /// Failure detail otherwise.
    pub error: Option<TaskError>,

    /// Whether device state changed.
    pub changed: bool,

    /// Time spent on this host, admission wait excluded.
    pub elapsed: Duration,
}

impl TaskResult {
    /// Create a successful result.
    pub fn success(host: Arc<Host>, output: TaskOutput, elapsed: Duration) -> Self {
        Self {
            host,
            succeeded: true,
            output: Some(output.output),
            error: None,
            changed: output.changed,
            elapsed,
        }
    }

    /// Create a failed result. `changed` is taken from the error.
    pub fn failure(host: Arc<Host>, error: TaskError, elapsed: Duration) -> Self {
        Self {
            host,
            succeeded: false,
            output: None,
            changed: error.changed,
            error: Some(error),
            elapsed,
        }
    }

    /// Result for a host whose unit never completed.
    pub fn cancelled(host: Arc<Host>) -> Self {
        Self::failure(
            host,
            TaskError::cancelled("run ended before the host completed"),
            Duration::ZERO,
        )
    }

    pub fn hostname(&self) -> &str {
        &self.host.hostname
    }

    /// Error kind when failed.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Results of one run, one entry per selected host in selection order.
#[derive(Debug, Clone, Default)]
pub struct AggregatedResult {
    results: IndexMap<String, TaskResult>,
    any_failed: bool,
}

impl AggregatedResult {
    /// Result for a host.
    pub fn get(&self, hostname: &str) -> Option<&TaskResult> {
        self.results.get(hostname)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.values()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Whether any host failed.
    pub fn any_failed(&self) -> bool {
        self.any_failed
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskResult> {
        self.iter().filter(|r| !r.succeeded)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TaskResult> {
        self.iter().filter(|r| r.succeeded)
    }

    pub fn changed(&self) -> impl Iterator<Item = &TaskResult> {
        self.iter().filter(|r| r.changed)
    }

    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    /// Serializable summary of the run.
    pub fn report(&self) -> Report {
        Report {
            any_failed: self.any_failed,
            records: self
                .iter()
                .map(|r| ReportRecord {
                    hostname: r.hostname().to_string(),
                    succeeded: r.succeeded,
                    changed: r.changed,
                    elapsed_ms: r.elapsed.as_millis() as u64,
                    output: r.output.clone(),
                    error: r.error.clone(),
                })
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AggregatedResult {
    type Item = &'a TaskResult;
    type IntoIter = indexmap::map::Values<'a, String, TaskResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.values()
    }
}

/// Order completed results by selection and fill the gaps.
///
/// Hosts in `selection` with no entry in `completed` are reported as
/// [`ErrorKind::Cancelled`]. Entries for hosts outside the selection are
/// dropped.
pub fn aggregate(selection: &Selection, mut completed: HashMap<String, TaskResult>) -> AggregatedResult {
    let results: IndexMap<String, TaskResult> = selection
        .iter()
        .map(|host| {
            let result = completed
                .remove(&host.hostname)
                .unwrap_or_else(|| TaskResult::cancelled(host.clone()));
            (host.hostname.clone(), result)
        })
        .collect();
    let any_failed = results.values().any(|r| !r.succeeded);
    AggregatedResult {
        results,
        any_failed,
    }
}

/// JSON-ready run summary.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub any_failed: bool,
    pub records: Vec<ReportRecord>,
}

/// One host in a [`Report`].
#[derive(Debug, Clone, Serialize)]
pub struct ReportRecord {
    pub hostname: String,
    pub succeeded: bool,
    pub changed: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;
    use serde_json::json;

    fn inventory() -> Inventory {
        Inventory::builder()
            .host(Host::new("a"))
            .host(Host::new("b"))
            .host(Host::new("c"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_aggregate_orders_and_fills() {
        let inventory = inventory();
        let selection = inventory.all();

        let mut completed = HashMap::new();
        for name in ["c", "a"] {
            let host = inventory.host(name).unwrap().clone();
            completed.insert(
                name.to_string(),
                TaskResult::success(host, TaskOutput::unchanged(json!(name)), Duration::ZERO),
            );
        }
        completed.insert(
            "zz".to_string(),
            TaskResult::cancelled(Arc::new(Host::new("zz"))),
        );

        let result = aggregate(&selection, completed);
        assert_eq!(result.hostnames().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(result.any_failed());
        assert_eq!(result.get("b").unwrap().kind(), Some(ErrorKind::Cancelled));
        assert_eq!(result.failed().count(), 1);
        assert_eq!(result.succeeded().count(), 2);
        assert!(result.get("zz").is_none());
    }

    #[test]
    fn test_empty_selection() {
        let inventory = inventory();
        let selection = inventory.filter(&crate::inventory::Filter::hostname("nope"));
        let result = aggregate(&selection, HashMap::new());
        assert!(result.is_empty());
        assert!(!result.any_failed());
    }

    #[test]
    fn test_report_shape() {
        let inventory = inventory();
        let selection = inventory.filter(&crate::inventory::Filter::hostname("a"));
        let host = inventory.host("a").unwrap().clone();

        let mut completed = HashMap::new();
        completed.insert(
            "a".to_string(),
            TaskResult::failure(
                host,
                TaskError::command("rejected").with_diagnostic("% Invalid input"),
                Duration::from_millis(1500),
            ),
        );

        let report = serde_json::to_value(aggregate(&selection, completed).report()).unwrap();
        assert_eq!(
            report,
            json!({
                "any_failed": true,
                "records": [{
                    "hostname": "a",
                    "succeeded": false,
                    "changed": false,
                    "elapsed_ms": 1500,
                    "error": {
                        "kind": "CommandError",
                        "message": "rejected",
                        "diagnostic": "% Invalid input"
                    }
                }]
            })
        );
    }
}
