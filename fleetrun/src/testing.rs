//! Scripted backend for unit tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::backend::{CommandOutput, ConfigBackend, ConfigOutcome, FactBackend};
use crate::error::BackendError;
use crate::inventory::Host;

/// Tracks calls in flight and the highest count seen.
#[derive(Debug, Default)]
pub(crate) struct Gauge {
    current: AtomicUsize,
    max: AtomicUsize,
    calls: AtomicUsize,
}

impl Gauge {
    fn enter(self: &Arc<Self>) -> GaugeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        GaugeGuard(self.clone())
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Decrements on drop, so cancelled calls are counted out too.
pub(crate) struct GaugeGuard(Arc<Gauge>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Connection,
    Auth,
}

/// Backend whose behaviour is set per hostname.
///
/// Facts for any host are `{"facts": {"hostname": <name>}}`. Config batches
/// apply and report a change unless the host is set to reject them.
#[derive(Debug, Default)]
pub(crate) struct ScriptedBackend {
    delays: HashMap<String, Duration>,
    failures: HashMap<String, Failure>,
    rejects: HashMap<String, usize>,
    panics: HashSet<String>,
    gauge: Arc<Gauge>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, hostname: &str, delay: Duration) -> Self {
        self.delays.insert(hostname.to_string(), delay);
        self
    }

    pub fn fail_connection(mut self, hostname: &str) -> Self {
        self.failures.insert(hostname.to_string(), Failure::Connection);
        self
    }

    pub fn fail_auth(mut self, hostname: &str) -> Self {
        self.failures.insert(hostname.to_string(), Failure::Auth);
        self
    }

    pub fn reject_config(self, hostname: &str) -> Self {
        self.reject_config_after(hostname, 0)
    }

    /// Reject the line after the first `applied`, which stay on the device.
    pub fn reject_config_after(mut self, hostname: &str, applied: usize) -> Self {
        self.rejects.insert(hostname.to_string(), applied);
        self
    }

    pub fn panic_on(mut self, hostname: &str) -> Self {
        self.panics.insert(hostname.to_string());
        self
    }

    pub fn gauge(&self) -> Arc<Gauge> {
        self.gauge.clone()
    }

    /// Common prelude of every call: count, wait, then fail if scripted.
    async fn call(&self, host: &Host) -> Result<GaugeGuard, BackendError> {
        let guard = self.gauge.enter();
        if let Some(delay) = self.delays.get(&host.hostname) {
            tokio::time::sleep(*delay).await;
        }
        if self.panics.contains(&host.hostname) {
            panic!("scripted panic on {}", host.hostname);
        }
        match self.failures.get(&host.hostname) {
            Some(Failure::Connection) => Err(BackendError::ConnectionFailed {
                host: host.connect_address().to_string(),
                port: host.port.unwrap_or(22),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            }),
            Some(Failure::Auth) => Err(BackendError::AuthenticationFailed {
                user: "admin".to_string(),
            }),
            None => Ok(guard),
        }
    }
}

#[async_trait]
impl FactBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn supported_getters(&self) -> Vec<&str> {
        vec!["facts"]
    }

    async fn get_facts(&self, host: &Host, getters: &[String]) -> Result<Value, BackendError> {
        self.validate_getters(getters)?;
        let _guard = self.call(host).await?;
        Ok(json!({"facts": {"hostname": host.hostname}}))
    }
}

#[async_trait]
impl ConfigBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send_config(
        &self,
        host: &Host,
        commands: &[String],
    ) -> Result<ConfigOutcome, BackendError> {
        let _guard = self.call(host).await?;
        if let Some(&applied) = self.rejects.get(&host.hostname) {
            let bad = commands.get(applied).map(String::as_str).unwrap_or_default();
            let mut transcript = commands[..applied.min(commands.len())].join("\n");
            if !transcript.is_empty() {
                transcript.push('\n');
            }
            transcript.push_str(&format!("{bad}\n% Invalid input detected at '^' marker."));
            return Ok(ConfigOutcome::rejected(
                format!("command '{bad}' rejected after {applied} of {} applied", commands.len()),
                transcript,
            )
            .with_changed(applied > 0));
        }
        Ok(ConfigOutcome::applied(!commands.is_empty(), commands.join("\n")))
    }

    async fn send_commands(
        &self,
        host: &Host,
        commands: &[String],
    ) -> Result<Vec<CommandOutput>, BackendError> {
        let _guard = self.call(host).await?;
        Ok(commands
            .iter()
            .map(|c| CommandOutput::new(c.clone(), format!("{}: {}", host.hostname, c)))
            .collect())
    }
}
