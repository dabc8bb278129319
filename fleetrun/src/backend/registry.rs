//! Platform tag to backend mapping.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::ssh::{SshCliBackend, SshOptions, profile};
use super::{ConfigBackend, FactBackend};
use crate::error::BackendError;
use crate::inventory::Host;

/// Backends serving one platform.
#[derive(Clone, Default)]
pub struct PlatformBackends {
    /// Fact retrieval, if offered.
    pub facts: Option<Arc<dyn FactBackend>>,

    /// Configuration and command submission, if offered.
    pub config: Option<Arc<dyn ConfigBackend>>,
}

/// Registry of backends keyed by platform tag.
///
/// Built once by the caller and handed to the runner; the engine only
/// queries it.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    platforms: HashMap<String, PlatformBackends>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            platforms: HashMap::new(),
        }
    }

    /// Registry with an SSH CLI backend for every built-in platform profile.
    pub fn with_ssh_platforms(options: SshOptions) -> Self {
        let mut registry = Self::new();
        for profile in profile::builtin_profiles() {
            let name = profile.name.clone();
            registry.register(name, Arc::new(SshCliBackend::new(profile, options.clone())));
        }
        registry
    }

    /// Register a fact backend for a platform, replacing any previous one.
    pub fn register_facts(&mut self, platform: impl Into<String>, backend: Arc<dyn FactBackend>) {
        self.platforms.entry(platform.into()).or_default().facts = Some(backend);
    }

    /// Register a config backend for a platform, replacing any previous one.
    pub fn register_config(
        &mut self,
        platform: impl Into<String>,
        backend: Arc<dyn ConfigBackend>,
    ) {
        self.platforms.entry(platform.into()).or_default().config = Some(backend);
    }

    /// Register one backend for both capabilities.
    pub fn register<B>(&mut self, platform: impl Into<String>, backend: Arc<B>)
    where
        B: FactBackend + ConfigBackend + 'static,
    {
        let platform = platform.into();
        self.register_facts(platform.clone(), backend.clone());
        self.register_config(platform, backend);
    }

    /// Backends for a platform tag.
    pub fn get(&self, platform: &str) -> Option<&PlatformBackends> {
        self.platforms.get(platform)
    }

    /// Check if a platform has any backend.
    pub fn contains(&self, platform: &str) -> bool {
        self.platforms.contains_key(platform)
    }

    /// List registered platform tags.
    pub fn platforms(&self) -> impl Iterator<Item = &String> {
        self.platforms.keys()
    }

    /// Fact backend for a host's platform.
    pub fn facts_for(&self, host: &Host) -> Result<Arc<dyn FactBackend>, BackendError> {
        let platform = platform_of(host)?;
        self.platforms
            .get(platform)
            .and_then(|b| b.facts.clone())
            .ok_or_else(|| BackendError::UnsupportedOperation {
                operation: "get_facts".to_string(),
                platform: platform.to_string(),
            })
    }

    /// Config backend for a host's platform.
    pub fn config_for(&self, host: &Host) -> Result<Arc<dyn ConfigBackend>, BackendError> {
        let platform = platform_of(host)?;
        self.platforms
            .get(platform)
            .and_then(|b| b.config.clone())
            .ok_or_else(|| BackendError::UnsupportedOperation {
                operation: "send_config".to_string(),
                platform: platform.to_string(),
            })
    }
}

fn platform_of(host: &Host) -> Result<&str, BackendError> {
    host.platform
        .as_deref()
        .ok_or_else(|| BackendError::NoPlatform {
            host: host.hostname.clone(),
        })
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (platform, backends) in &self.platforms {
            map.entry(platform, backends);
        }
        map.finish()
    }
}

impl fmt::Debug for PlatformBackends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformBackends")
            .field("facts", &self.facts.as_ref().map(|b| b.name().to_string()))
            .field("config", &self.config.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}
