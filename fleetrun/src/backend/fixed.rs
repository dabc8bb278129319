//! In-memory fact backend.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use log::trace;
use serde_json::{Map, Value};

use super::FactBackend;
use crate::error::BackendError;
use crate::inventory::Host;

/// Fact backend that answers from data supplied up front.
///
/// Useful for dry runs and for exercising tasks without devices. Facts can
/// be set per host or as a fallback for every host; a supported getter with
/// no data yields `null`.
///
/// # Example
///
/// ```rust
/// use fleetrun::backend::StaticFactBackend;
/// use serde_json::json;
///
/// let backend = StaticFactBackend::new("lab")
///     .with_default_facts("facts", json!({"vendor": "Cisco"}))
///     .with_host_facts("r1", "facts", json!({"vendor": "Arista"}));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticFactBackend {
    name: String,
    getters: Vec<String>,
    per_host: HashMap<String, IndexMap<String, Value>>,
    fallback: IndexMap<String, Value>,
}

impl StaticFactBackend {
    /// Create a backend with no getters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Declare a getter as supported without providing data.
    pub fn with_getter(mut self, getter: impl Into<String>) -> Self {
        let getter = getter.into();
        if !self.getters.contains(&getter) {
            self.getters.push(getter);
        }
        self
    }

    /// Facts returned for one host.
    pub fn with_host_facts(
        mut self,
        hostname: impl Into<String>,
        getter: impl Into<String>,
        value: Value,
    ) -> Self {
        let getter = getter.into();
        self = self.with_getter(getter.clone());
        self.per_host
            .entry(hostname.into())
            .or_default()
            .insert(getter, value);
        self
    }

    /// Facts returned for any host without its own entry.
    pub fn with_default_facts(mut self, getter: impl Into<String>, value: Value) -> Self {
        let getter = getter.into();
        self = self.with_getter(getter.clone());
        self.fallback.insert(getter, value);
        self
    }
}

#[async_trait]
impl FactBackend for StaticFactBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_getters(&self) -> Vec<&str> {
        self.getters.iter().map(String::as_str).collect()
    }

    async fn get_facts(&self, host: &Host, getters: &[String]) -> Result<Value, BackendError> {
        self.validate_getters(getters)?;
        trace!("Serving {:?} for {} from '{}'", getters, host.hostname, self.name);

        let own = self.per_host.get(&host.hostname);
        let mut facts = Map::new();
        for getter in getters {
            let value = own
                .and_then(|f| f.get(getter))
                .or_else(|| self.fallback.get(getter))
                .cloned()
                .unwrap_or(Value::Null);
            facts.insert(getter.clone(), value);
        }
        Ok(Value::Object(facts))
    }
}
