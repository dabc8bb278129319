//! Host records.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use super::credentials::Credentials;

/// One managed network device.
///
/// A `Host` as declared carries only its own attributes. Once it is part of
/// an [`Inventory`](super::Inventory), unset attributes have been filled in
/// from its groups and the inventory defaults, and [`Host::lineage`] lists
/// every group it belongs to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Host {
    /// Unique key within the inventory.
    pub hostname: String,

    /// Address to connect to. Falls back to `hostname` when unset.
    #[serde(default)]
    pub address: Option<String>,

    /// Connection port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Platform tag used to select a backend (e.g. "cisco_ios").
    #[serde(default)]
    pub platform: Option<String>,

    /// Declared groups, in priority order.
    #[serde(default)]
    pub groups: Vec<String>,

    /// Login material handed to backends.
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Free-form attributes (e.g. `ntp`).
    #[serde(default)]
    pub extra: IndexMap<String, Value>,

    /// Declared groups plus their ancestors, resolution order.
    #[serde(skip)]
    pub(crate) lineage: Vec<String>,
}

impl Host {
    /// Create a host with only a hostname.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Default::default()
        }
    }

    /// Set the connection address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the connection port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the platform tag.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Append a group membership.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
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

    /// Address used to reach the device.
    pub fn connect_address(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.hostname)
    }

    /// Look up a free-form attribute.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Look up a free-form attribute holding a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Whether the host belongs to `group`, directly or through a parent group.
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().chain(&self.lineage).any(|g| g == group)
    }

    /// Groups in attribute resolution order.
    pub fn lineage(&self) -> &[String] {
        &self.lineage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_address_falls_back_to_hostname() {
        let host = Host::new("r1");
        assert_eq!(host.connect_address(), "r1");

        let host = Host::new("r1").with_address("172.16.10.11");
        assert_eq!(host.connect_address(), "172.16.10.11");
    }

    #[test]
    fn test_extra_lookup() {
        let host = Host::new("r1").with_extra("ntp", "1.1.1.1").with_extra("rack", 4);
        assert_eq!(host.get_str("ntp"), Some("1.1.1.1"));
        assert_eq!(host.get("rack"), Some(&Value::from(4)));
        assert_eq!(host.get_str("rack"), None);
        assert!(host.get("missing").is_none());
    }

    #[test]
    fn test_deserialize_record() {
        let host: Host = serde_json::from_str(
            r#"{
                "hostname": "edge1",
                "address": "172.16.10.12",
                "platform": "cisco_ios",
                "groups": ["edge"],
                "extra": {"ntp": "10.0.0.1"}
            }"#,
        )
        .unwrap();
        assert_eq!(host.hostname, "edge1");
        assert_eq!(host.platform.as_deref(), Some("cisco_ios"));
        assert_eq!(host.groups, vec!["edge"]);
        assert_eq!(host.get_str("ntp"), Some("10.0.0.1"));
        assert!(host.lineage().is_empty());
    }
}
