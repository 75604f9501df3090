//! Client driver for the qemud virtualization daemon.
//!
//! Talks a fixed binary request/reply protocol to the privileged `qemud`
//! daemon over a Unix domain socket, autostarting the daemon on demand,
//! and exposes generic domain/network lifecycle operations through the
//! [`driver::Hypervisor`] trait. Backends register in a [`registry::Registry`]
//! consumed by the dispatch layer above.

pub mod clienv;
pub mod driver;
pub mod error;
pub mod qemud;
pub mod registry;

pub use driver::{
    Domain, DomainInfo, DomainState, Driver, Hypervisor, Network, NodeInfo, OpenOptions,
};
pub use error::{DriverError, Result};
pub use registry::Registry;
