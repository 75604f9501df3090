//! Backend-facing driver surface: handle types, open options, and the
//! entry-point traits a backend exposes to the dispatch layer.
//!
//! Handles are local caches of the last reply that produced them; the
//! daemon stays the authority on true state. They are only ever built
//! from successful protocol replies, never from untrusted input.

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::Result;

/// A managed virtual machine, running or defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    pub uuid: Uuid,
    /// Runtime id; `None` for defined-but-not-running domains.
    pub id: Option<u32>,
}

impl Domain {
    pub fn is_running(&self) -> bool {
        self.id.is_some()
    }
}

/// A managed virtual network. Networks have no runtime id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub uuid: Uuid,
}

/// Run state derived from the daemon's state enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainState {
    Running,
    Paused,
    Shutoff,
}

impl DomainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainState::Running => "running",
            DomainState::Paused => "paused",
            DomainState::Shutoff => "shutoff",
        }
    }
}

/// Snapshot of one domain's runtime accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainInfo {
    pub state: DomainState,
    /// Maximum memory in KiB.
    pub max_mem: u64,
    /// Current memory in KiB.
    pub memory: u64,
    pub nr_virt_cpu: u32,
    /// Cumulative CPU time in nanoseconds.
    pub cpu_time: u64,
}

/// Host capability summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub model: String,
    /// Total memory in KiB.
    pub memory: u64,
    pub cpus: u32,
    pub mhz: u32,
    pub nodes: u32,
    pub sockets: u32,
    pub cores: u32,
    pub threads: u32,
}

/// How a connection should be opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Use the read-only endpoint where the backend provides one.
    pub read_only: bool,
    /// Spawn the daemon on demand when the endpoint is unreachable.
    pub autostart: bool,
}

impl OpenOptions {
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }
}

/// One registered backend: claims URIs and opens connections to them.
pub trait Driver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this backend owns the given URI.
    fn probe(&self, uri: &Url) -> bool;

    fn open(&self, uri: &Url, opts: OpenOptions) -> Result<Box<dyn Hypervisor>>;
}

/// The full entry-point surface a backend exposes upward. One connection
/// serves both domain and network operations.
///
/// List operations take a caller-supplied capacity: counts reported by the
/// daemon beyond `max` are silently truncated to `max`. That is a
/// documented contract, not an error, and it applies uniformly to every
/// list operation.
pub trait Hypervisor: Send + std::fmt::Debug {
    /// Release the connection. Idempotent; later calls are no-ops and
    /// later operations fail with a closed-connection error.
    fn close(&mut self) -> Result<()>;

    fn version(&self) -> Result<u32>;
    fn node_info(&self) -> Result<NodeInfo>;

    fn num_domains(&self) -> Result<u32>;
    fn list_domains(&self, max: usize) -> Result<Vec<u32>>;
    fn num_defined_domains(&self) -> Result<u32>;
    fn list_defined_domains(&self, max: usize) -> Result<Vec<String>>;

    fn domain_lookup_by_id(&self, id: u32) -> Result<Domain>;
    fn domain_lookup_by_uuid(&self, uuid: &Uuid) -> Result<Domain>;
    fn domain_lookup_by_name(&self, name: &str) -> Result<Domain>;

    /// Create and immediately boot a domain from a configuration document.
    fn domain_create(&self, config: &str) -> Result<Domain>;
    /// Persist a domain definition without starting it.
    fn domain_define(&self, config: &str) -> Result<Domain>;
    /// Boot a defined domain, filling in its runtime id.
    fn domain_start(&self, domain: &mut Domain) -> Result<()>;

    fn domain_suspend(&self, domain: &Domain) -> Result<()>;
    fn domain_resume(&self, domain: &Domain) -> Result<()>;
    /// Hard-stop a running domain. The handle keeps its identity; only
    /// the runtime id is cleared.
    fn domain_destroy(&self, domain: &mut Domain) -> Result<()>;
    /// Graceful shutdown. The daemon contract currently treats this as
    /// destroy.
    fn domain_shutdown(&self, domain: &mut Domain) -> Result<()>;

    /// Remove a persisted definition. Consumes the handle: local cleanup
    /// happens whether or not the daemon call succeeds, and a daemon
    /// failure is still reported.
    fn domain_undefine(&self, domain: Domain) -> Result<()>;

    fn domain_info(&self, domain: &Domain) -> Result<DomainInfo>;
    fn domain_dump_config(&self, domain: &Domain) -> Result<String>;

    /// Not provided by the daemon contract; always `Unsupported`.
    fn domain_save(&self, domain: &Domain, file: &str) -> Result<()>;
    /// Not provided by the daemon contract; always `Unsupported`.
    fn domain_restore(&self, file: &str) -> Result<()>;

    fn num_networks(&self) -> Result<u32>;
    fn list_networks(&self, max: usize) -> Result<Vec<String>>;
    fn num_defined_networks(&self) -> Result<u32>;
    fn list_defined_networks(&self, max: usize) -> Result<Vec<String>>;

    fn network_lookup_by_uuid(&self, uuid: &Uuid) -> Result<Network>;
    fn network_lookup_by_name(&self, name: &str) -> Result<Network>;

    fn network_create(&self, config: &str) -> Result<Network>;
    fn network_define(&self, config: &str) -> Result<Network>;
    /// Same consume-and-always-clean-up contract as `domain_undefine`.
    fn network_undefine(&self, network: Network) -> Result<()>;
    fn network_start(&self, network: &Network) -> Result<()>;
    fn network_destroy(&self, network: &Network) -> Result<()>;

    fn network_dump_config(&self, network: &Network) -> Result<String>;
    fn network_bridge_name(&self, network: &Network) -> Result<String>;
}
