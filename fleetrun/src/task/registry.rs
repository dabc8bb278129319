//! Task lookup by name.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::{GetFacts, SendCommands, SendConfig, Task};
use crate::error::InvocationError;

/// Tasks addressable by name in [`Runner::run_task`](crate::dispatch::Runner::run_task).
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: IndexMap<String, Arc<dyn Task>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `get_facts`, `send_config` and `send_commands`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for task in [
            Arc::new(GetFacts) as Arc<dyn Task>,
            Arc::new(SendConfig),
            Arc::new(SendCommands),
        ] {
            registry.tasks.insert(task.name().to_string(), task);
        }
        registry
    }

    /// Register a task under its own name.
    pub fn register(&mut self, task: Arc<dyn Task>) -> Result<(), InvocationError> {
        let name = task.name().to_string();
        if self.tasks.contains_key(&name) {
            return Err(InvocationError::DuplicateTask { name });
        }
        self.tasks.insert(name, task);
        Ok(())
    }

    /// Look up a task.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Task>, InvocationError> {
        self.tasks
            .get(name)
            .cloned()
            .ok_or_else(|| InvocationError::UnknownTask {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tasks.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::FnTask;
    use serde_json::Value;

    #[test]
    fn test_builtins() {
        let registry = TaskRegistry::with_builtins();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["get_facts", "send_config", "send_commands"]
        );
        assert_eq!(registry.get("send_config").unwrap().name(), "send_config");
    }

    #[test]
    fn test_duplicate_and_unknown() {
        let mut registry = TaskRegistry::with_builtins();
        registry
            .register(Arc::new(FnTask::new("noop", |_, _| Ok(Value::Null))))
            .unwrap();
        assert!(registry.contains("noop"));

        let err = registry
            .register(Arc::new(FnTask::new("get_facts", |_, _| Ok(Value::Null))))
            .unwrap_err();
        assert_eq!(
            err,
            InvocationError::DuplicateTask {
                name: "get_facts".into()
            }
        );

        assert!(matches!(
            registry.get("reboot"),
            Err(InvocationError::UnknownTask { .. })
        ));
    }
}
