//! # Fleetrun
//!
//! Concurrent task runner for network device fleets.
//!
//! Fleetrun runs one task against many devices at once, with bounded
//! concurrency, and hands back one result per device. A failure on one
//! device never affects the others.
//!
//! ## Features
//!
//! - Inventory of hosts and groups with inherited attributes
//! - Composable host filters
//! - Pluggable fact and configuration backends per platform
//! - SSH CLI backend for Linux, Cisco IOS, Arista EOS and Juniper JUNOS
//! - Per-host and overall timeouts, results in inventory order
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleetrun::backend::ssh::SshOptions;
//! use fleetrun::inventory::{Credentials, Filter, Group, Host, Inventory};
//! use fleetrun::task::Params;
//! use fleetrun::{BackendRegistry, RunOptions, Runner};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fleetrun::Error> {
//!     let inventory = Inventory::builder()
//!         .group(
//!             Group::new("core")
//!                 .with_platform("cisco_ios")
//!                 .with_credentials(Credentials::new("admin").with_password("secret")),
//!         )
//!         .host(Host::new("r1").with_address("192.168.1.1").with_group("core"))
//!         .host(Host::new("r2").with_address("192.168.1.2").with_group("core"))
//!         .build()?;
//!
//!     let runner = Runner::new(inventory, BackendRegistry::with_ssh_platforms(SshOptions::default()))
//!         .with_default_options(RunOptions::new().per_host_timeout(Duration::from_secs(60)));
//!
//!     let result = runner
//!         .run_task(
//!             &Filter::in_group("core"),
//!             "send_config",
//!             Params::new().with("config_commands", json!(["ntp server 10.0.0.1"])),
//!             None,
//!         )
//!         .await?;
//!
//!     println!("{}", serde_json::to_string_pretty(&result.report()).unwrap());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod dispatch;
pub mod error;
pub mod inventory;
pub mod result;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use backend::{BackendRegistry, ConfigBackend, FactBackend};
pub use dispatch::{RunOptions, Runner};
pub use error::{Error, ErrorKind, TaskError};
pub use inventory::{Filter, Host, Inventory};
pub use result::{AggregatedResult, TaskResult};
pub use task::{Params, Task};
