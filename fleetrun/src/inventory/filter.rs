//! Host selection.
//!
//! A [`Filter`] is a pure predicate over a [`Host`], built from explicit
//! combinators rather than attribute lookups by name. Applying a filter to an
//! [`Inventory`](super::Inventory) yields a [`Selection`]: shared references
//! to the matching hosts, always in the inventory's canonical order.

use std::fmt;
use std::ops::Not;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use super::host::Host;

type HostPredicate = dyn Fn(&Host) -> bool + Send + Sync;

/// Composable host predicate.
#[derive(Clone)]
pub enum Filter {
    /// Matches every host.
    All,
    /// `hostname == value`.
    Hostname(String),
    /// `platform == value`.
    Platform(String),
    /// Member of the group, directly or through a parent.
    InGroup(String),
    /// `extra[key] == value`.
    ExtraEq(String, Value),
    /// `extra` has the key.
    HasExtra(String),
    /// Hostname matches a regular expression.
    HostnameMatches(Regex),
    /// Arbitrary predicate.
    Custom(Arc<HostPredicate>),
    /// Every inner filter matches.
    And(Vec<Filter>),
    /// At least one inner filter matches.
    Or(Vec<Filter>),
    /// The inner filter does not match.
    Not(Box<Filter>),
}

impl Filter {
    /// Match every host.
    pub fn all() -> Self {
        Filter::All
    }

    /// Match a single hostname.
    pub fn hostname(hostname: impl Into<String>) -> Self {
        Filter::Hostname(hostname.into())
    }

    /// Match a platform tag.
    pub fn platform(platform: impl Into<String>) -> Self {
        Filter::Platform(platform.into())
    }

    /// Match group members, including members of child groups.
    pub fn in_group(group: impl Into<String>) -> Self {
        Filter::InGroup(group.into())
    }

    /// Match an attribute value.
    pub fn extra_eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::ExtraEq(key.into(), value.into())
    }

    /// Match hosts that carry an attribute.
    pub fn has_extra(key: impl Into<String>) -> Self {
        Filter::HasExtra(key.into())
    }

    /// Match hostnames against a regular expression.
    pub fn hostname_matches(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Filter::HostnameMatches(Regex::new(pattern)?))
    }

    /// Match with an arbitrary predicate.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Host) -> bool + Send + Sync + 'static,
    {
        Filter::Custom(Arc::new(predicate))
    }

    /// Both filters must match.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), f) => {
                left.push(f);
                Filter::And(left)
            }
            (f, Filter::And(mut right)) => {
                right.insert(0, f);
                Filter::And(right)
            }
            (left, right) => Filter::And(vec![left, right]),
        }
    }

    /// Either filter may match.
    pub fn or(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::Or(mut left), Filter::Or(right)) => {
                left.extend(right);
                Filter::Or(left)
            }
            (Filter::Or(mut left), f) => {
                left.push(f);
                Filter::Or(left)
            }
            (left, right) => Filter::Or(vec![left, right]),
        }
    }

    /// Evaluate the predicate.
    pub fn matches(&self, host: &Host) -> bool {
        match self {
            Filter::All => true,
            Filter::Hostname(name) => host.hostname == *name,
            Filter::Platform(platform) => host.platform.as_deref() == Some(platform.as_str()),
            Filter::InGroup(group) => host.has_group(group),
            Filter::ExtraEq(key, value) => host.get(key) == Some(value),
            Filter::HasExtra(key) => host.extra.contains_key(key),
            Filter::HostnameMatches(re) => re.is_match(&host.hostname),
            Filter::Custom(predicate) => predicate(host),
            Filter::And(filters) => filters.iter().all(|f| f.matches(host)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(host)),
            Filter::Not(inner) => !inner.matches(host),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::All
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        match self {
            Filter::Not(inner) => *inner,
            f => Filter::Not(Box::new(f)),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => f.write_str("All"),
            Filter::Hostname(v) => f.debug_tuple("Hostname").field(v).finish(),
            Filter::Platform(v) => f.debug_tuple("Platform").field(v).finish(),
            Filter::InGroup(v) => f.debug_tuple("InGroup").field(v).finish(),
            Filter::ExtraEq(k, v) => f.debug_tuple("ExtraEq").field(k).field(v).finish(),
            Filter::HasExtra(k) => f.debug_tuple("HasExtra").field(k).finish(),
            Filter::HostnameMatches(re) => {
                f.debug_tuple("HostnameMatches").field(&re.as_str()).finish()
            }
            Filter::Custom(_) => f.write_str("Custom(<predicate>)"),
            Filter::And(v) => f.debug_tuple("And").field(v).finish(),
            Filter::Or(v) => f.debug_tuple("Or").field(v).finish(),
            Filter::Not(v) => f.debug_tuple("Not").field(v).finish(),
        }
    }
}

/// Hosts chosen by a filter, in canonical inventory order.
///
/// Holds shared references, not copies. Only an
/// [`Inventory`](super::Inventory) creates selections, so hostnames within
/// one selection are unique.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    hosts: Vec<Arc<Host>>,
}

impl Selection {
    pub(crate) fn new(hosts: Vec<Arc<Host>>) -> Self {
        Self { hosts }
    }

    /// Narrow the selection further (logical AND with the filter that
    /// produced it).
    pub fn filter(&self, filter: &Filter) -> Selection {
        Selection::new(
            self.hosts
                .iter()
                .filter(|host| filter.matches(host))
                .cloned()
                .collect(),
        )
    }

    /// Selected hosts.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Host>> {
        self.hosts.iter()
    }

    /// Hostnames in selection order.
    pub fn hostnames(&self) -> Vec<&str> {
        self.hosts.iter().map(|h| h.hostname.as_str()).collect()
    }

    /// Whether a hostname is part of the selection.
    pub fn contains(&self, hostname: &str) -> bool {
        self.hosts.iter().any(|h| h.hostname == hostname)
    }

    /// Number of selected hosts.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl<'a> IntoIterator for &'a Selection {
    type Item = &'a Arc<Host>;
    type IntoIter = std::slice::Iter<'a, Arc<Host>>;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts.iter()
    }
}
