//! Group records and inventory-wide defaults.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use super::credentials::Credentials;

/// A named bundle of attributes shared by its member hosts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Group {
    /// Group name.
    pub name: String,

    /// Parent groups, in priority order.
    #[serde(default)]
    pub groups: Vec<String>,

    /// Platform inherited by members that do not set one.
    #[serde(default)]
    pub platform: Option<String>,

    /// Port inherited by members that do not set one.
    #[serde(default)]
    pub port: Option<u16>,

    /// Credentials inherited by members that do not set any.
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Free-form attributes inherited key by key.
    #[serde(default)]
    pub extra: IndexMap<String, Value>,
}

impl Group {
    /// Create an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Append a parent group.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.groups.push(parent.into());
        self
    }

    /// Set the platform tag.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set a free-form attribute.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Fallback attributes applied after every group has been consulted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub platform: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub credentials: Option<Credentials>,

    #[serde(default)]
    pub extra: IndexMap<String, Value>,
}

impl Defaults {
    /// Set the default platform.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Set the default port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set default credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set a default free-form attribute.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}
