//! Inventory of hosts and groups.
//!
//! The inventory is built once, validated, and then shared read-only for the
//! whole run. Building resolves group inheritance up front so every [`Host`]
//! handed to a task already carries its effective platform, port,
//! credentials and attributes.
//!
//! # Inheritance
//!
//! For each unset host attribute the declared groups are consulted in order,
//! each group followed immediately by its own parents (depth-first), and
//! finally the inventory [`Defaults`]. The first value found wins. `extra`
//! is merged key by key with the same priority.
//!
//! ```text
//! host.groups = [edge, lab]      edge.groups = [site1]
//! resolution order: host -> edge -> site1 -> lab -> defaults
//! ```
//!
//! # Example
//!
//! ```rust
//! use fleetrun::inventory::{Filter, Group, Host, Inventory};
//!
//! # fn main() -> Result<(), fleetrun::error::InventoryError> {
//! let inventory = Inventory::builder()
//!     .group(Group::new("edge").with_platform("cisco_ios").with_extra("ntp", "1.1.1.1"))
//!     .host(Host::new("r1").with_group("edge"))
//!     .host(Host::new("r2").with_platform("linux"))
//!     .build()?;
//!
//! let edge = inventory.filter(&Filter::in_group("edge"));
//! assert_eq!(edge.hostnames(), vec!["r1"]);
//! assert_eq!(inventory.host("r1").unwrap().get_str("ntp"), Some("1.1.1.1"));
//! # Ok(())
//! # }
//! ```

mod credentials;
pub mod filter;
mod group;
mod host;

pub use credentials::Credentials;
pub use filter::{Filter, Selection};
pub use group::{Defaults, Group};
pub use host::Host;

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;

use crate::error::InventoryError;

/// The full set of hosts and groups for a run.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    /// Resolved hosts in declaration order.
    hosts: IndexMap<String, Arc<Host>>,

    /// Groups in declaration order.
    groups: IndexMap<String, Group>,

    /// Inventory-wide fallbacks.
    defaults: Defaults,
}

impl Inventory {
    /// Start building an inventory.
    pub fn builder() -> InventoryBuilder {
        InventoryBuilder::default()
    }

    /// Validate records and resolve inheritance.
    ///
    /// Fails on duplicate hostnames or group names, references to unknown
    /// groups, and cyclic group parents.
    pub fn from_parts(
        hosts: Vec<Host>,
        groups: Vec<Group>,
        defaults: Defaults,
    ) -> Result<Self, InventoryError> {
        let mut group_map: IndexMap<String, Group> = IndexMap::with_capacity(groups.len());
        for group in groups {
            if group_map.contains_key(&group.name) {
                return Err(InventoryError::DuplicateGroup { name: group.name });
            }
            group_map.insert(group.name.clone(), group);
        }

        for group in group_map.values() {
            if let Some(parent) = group.groups.iter().find(|p| !group_map.contains_key(*p)) {
                return Err(InventoryError::UnknownGroup {
                    owner: group.name.clone(),
                    group: parent.clone(),
                });
            }
        }

        check_acyclic(&group_map)?;

        let mut host_map: IndexMap<String, Arc<Host>> = IndexMap::with_capacity(hosts.len());
        for host in hosts {
            if host_map.contains_key(&host.hostname) {
                return Err(InventoryError::DuplicateHost {
                    name: host.hostname,
                });
            }
            if let Some(group) = host.groups.iter().find(|g| !group_map.contains_key(*g)) {
                return Err(InventoryError::UnknownGroup {
                    owner: host.hostname.clone(),
                    group: group.clone(),
                });
            }

            let host = resolve_host(host, &group_map, &defaults);
            host_map.insert(host.hostname.clone(), Arc::new(host));
        }

        debug!(
            "Inventory built with {} hosts and {} groups",
            host_map.len(),
            group_map.len()
        );

        Ok(Self {
            hosts: host_map,
            groups: group_map,
            defaults,
        })
    }

    /// Get a host by hostname.
    pub fn host(&self, hostname: &str) -> Option<&Arc<Host>> {
        self.hosts.get(hostname)
    }

    /// Get a group by name.
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// All hosts in canonical (declaration) order.
    pub fn hosts(&self) -> impl Iterator<Item = &Arc<Host>> {
        self.hosts.values()
    }

    /// All groups in declaration order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Inventory-wide fallbacks.
    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Hosts belonging to `group`, directly or through a parent group.
    pub fn members(&self, group: &str) -> Selection {
        self.filter(&Filter::in_group(group))
    }

    /// Select every host.
    pub fn all(&self) -> Selection {
        Selection::new(self.hosts.values().cloned().collect())
    }

    /// Select the hosts matching `filter`, in canonical order.
    pub fn filter(&self, filter: &Filter) -> Selection {
        Selection::new(
            self.hosts
                .values()
                .filter(|host| filter.matches(host))
                .cloned()
                .collect(),
        )
    }

    /// Number of hosts.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the inventory has no hosts.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Builder for [`Inventory`].
#[derive(Debug, Default)]
pub struct InventoryBuilder {
    hosts: Vec<Host>,
    groups: Vec<Group>,
    defaults: Defaults,
}

impl InventoryBuilder {
    /// Add a host. Declaration order becomes the canonical order.
    pub fn host(mut self, host: Host) -> Self {
        self.hosts.push(host);
        self
    }

    /// Add a group.
    pub fn group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }

    /// Set inventory-wide defaults.
    pub fn defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Validate and build the inventory.
    pub fn build(self) -> Result<Inventory, InventoryError> {
        Inventory::from_parts(self.hosts, self.groups, self.defaults)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Reject cyclic parent references with the offending path.
fn check_acyclic(groups: &IndexMap<String, Group>) -> Result<(), InventoryError> {
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(groups.len());
    let mut stack: Vec<&str> = Vec::new();

    for name in groups.keys() {
        visit(name, groups, &mut marks, &mut stack)?;
    }
    Ok(())
}

fn visit<'a>(
    name: &'a str,
    groups: &'a IndexMap<String, Group>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
) -> Result<(), InventoryError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|g| *g == name).unwrap_or(0);
            let mut path: Vec<String> = stack[start..].iter().map(|g| g.to_string()).collect();
            path.push(name.to_string());
            return Err(InventoryError::GroupCycle { path });
        }
        None => {}
    }

    marks.insert(name, Mark::Visiting);
    stack.push(name);
    if let Some(group) = groups.get(name) {
        for parent in &group.groups {
            visit(parent, groups, marks, stack)?;
        }
    }
    stack.pop();
    marks.insert(name, Mark::Done);
    Ok(())
}

/// Append `name`'s ancestors depth-first, skipping groups already present.
fn push_ancestors(name: &str, groups: &IndexMap<String, Group>, out: &mut Vec<String>) {
    let Some(group) = groups.get(name) else {
        return;
    };
    for parent in &group.groups {
        if !out.contains(parent) {
            out.push(parent.clone());
            push_ancestors(parent, groups, out);
        }
    }
}

fn resolve_host(mut host: Host, groups: &IndexMap<String, Group>, defaults: &Defaults) -> Host {
    let mut lineage = Vec::new();
    for group in &host.groups {
        if !lineage.contains(group) {
            lineage.push(group.clone());
            push_ancestors(group, groups, &mut lineage);
        }
    }

    let chain: Vec<&Group> = lineage.iter().filter_map(|g| groups.get(g)).collect();

    if host.platform.is_none() {
        host.platform = chain
            .iter()
            .find_map(|g| g.platform.clone())
            .or_else(|| defaults.platform.clone());
    }
    if host.port.is_none() {
        host.port = chain.iter().find_map(|g| g.port).or(defaults.port);
    }
    if host.credentials.is_none() {
        host.credentials = chain
            .iter()
            .find_map(|g| g.credentials.clone())
            .or_else(|| defaults.credentials.clone());
    }

    for (key, value) in chain
        .iter()
        .flat_map(|g| g.extra.iter())
        .chain(defaults.extra.iter())
    {
        host.extra
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    host.lineage = lineage;
    host
}
