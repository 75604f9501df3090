//! The qemud protocol backend.
//!
//! Maps the generic lifecycle verbs onto protocol request/reply pairs over
//! one Unix-domain-socket connection to the qemud daemon.
//!
//! ```text
//! caller ─> QemudConnection ─> Transport ─> socket ─> qemud
//!                 ^  one mutex around each whole exchange
//! ```
//!
//! The connection is strictly request-then-reply with no request ids, so
//! every exchange is serialized behind a single lock covering both the
//! write and the read half.

pub mod autostart;
pub mod connect;
pub mod protocol;
pub mod transport;

use std::sync::Mutex;

use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::driver::{
    Domain, DomainInfo, DomainState, Driver, Hypervisor, Network, NodeInfo, OpenOptions,
};
use crate::error::{DriverError, Result};
use autostart::{DaemonLauncher, ForkLauncher};
use connect::Endpoint;
use protocol::{Reply, Request, MAX_CONFIG_LEN};
use transport::Transport;

/// Daemon run-state enumeration carried in get-info replies.
pub const STATE_STOPPED: u32 = 0;
pub const STATE_RUNNING: u32 = 1;
pub const STATE_PAUSED: u32 = 2;

/// Backend registered for `qemu://` URIs.
pub struct QemudDriver;

impl Driver for QemudDriver {
    fn name(&self) -> &'static str {
        "qemud"
    }

    fn probe(&self, uri: &Url) -> bool {
        uri.scheme() == "qemu"
    }

    fn open(&self, uri: &Url, opts: OpenOptions) -> Result<Box<dyn Hypervisor>> {
        let endpoint = connect::resolve(uri, opts.read_only)?;
        let conn = QemudConnection::open(&endpoint, opts, &ForkLauncher)?;
        Ok(Box::new(conn))
    }
}

/// One open connection to the daemon, owned by a single caller session.
#[derive(Debug)]
pub struct QemudConnection {
    endpoint: Endpoint,
    /// `None` once closed; closing is idempotent.
    inner: Mutex<Option<Transport>>,
}

impl QemudConnection {
    /// Connect to a resolved endpoint, autostarting the daemon per `opts`.
    pub fn open(
        endpoint: &Endpoint,
        opts: OpenOptions,
        launcher: &dyn DaemonLauncher,
    ) -> Result<Self> {
        let stream = connect::open(endpoint, opts.autostart, launcher)?;
        Ok(QemudConnection {
            endpoint: endpoint.clone(),
            inner: Mutex::new(Some(Transport::new(stream))),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// One serialized request/reply exchange.
    fn call(&self, req: Request) -> Result<Reply> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| DriverError::ConnectionClosed)?;
        let transport = guard.as_mut().ok_or(DriverError::ConnectionClosed)?;
        transport.exchange(&req)
    }

    /// Pre-flight bound check for configuration documents; oversize input
    /// fails locally without any round trip.
    fn check_config(config: &str) -> Result<()> {
        if config.len() >= MAX_CONFIG_LEN {
            return Err(DriverError::TooLarge {
                len: config.len(),
                max: MAX_CONFIG_LEN - 1,
            });
        }
        Ok(())
    }

    fn running_id(domain: &Domain) -> Result<u32> {
        domain.id.ok_or_else(|| {
            DriverError::NotFound(format!("running instance of domain '{}'", domain.name))
        })
    }
}

fn unexpected(reply: &Reply) -> DriverError {
    DriverError::InvalidReply(format!(
        "reply variant {:?} does not answer the request",
        reply.message_type()
    ))
}

/// Lookups report protocol-level refusals from the daemon as plain
/// not-found; transport failures stay typed.
fn not_found(what: impl Into<String>) -> impl FnOnce(DriverError) -> DriverError {
    let what = what.into();
    move |err| match err {
        DriverError::Daemon { .. } => DriverError::NotFound(what),
        other => other,
    }
}

impl Hypervisor for QemudConnection {
    fn close(&mut self) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| DriverError::ConnectionClosed)?;
        if guard.take().is_some() {
            debug!(endpoint = %self.endpoint, "connection closed");
        }
        Ok(())
    }

    fn version(&self) -> Result<u32> {
        match self.call(Request::GetVersion)? {
            Reply::GetVersion { version } => Ok(version),
            other => Err(unexpected(&other)),
        }
    }

    fn node_info(&self) -> Result<NodeInfo> {
        match self.call(Request::GetNodeInfo)? {
            Reply::GetNodeInfo {
                model,
                memory,
                cpus,
                mhz,
                nodes,
                sockets,
                cores,
                threads,
            } => Ok(NodeInfo {
                model,
                memory,
                cpus,
                mhz,
                nodes,
                sockets,
                cores,
                threads,
            }),
            other => Err(unexpected(&other)),
        }
    }

    fn num_domains(&self) -> Result<u32> {
        match self.call(Request::NumDomains)? {
            Reply::NumDomains { count } => Ok(count),
            other => Err(unexpected(&other)),
        }
    }

    fn list_domains(&self, max: usize) -> Result<Vec<u32>> {
        match self.call(Request::ListDomains)? {
            Reply::ListDomains { mut ids } => {
                ids.truncate(max);
                Ok(ids)
            }
            other => Err(unexpected(&other)),
        }
    }

    fn num_defined_domains(&self) -> Result<u32> {
        match self.call(Request::NumDefinedDomains)? {
            Reply::NumDefinedDomains { count } => Ok(count),
            other => Err(unexpected(&other)),
        }
    }

    fn list_defined_domains(&self, max: usize) -> Result<Vec<String>> {
        match self.call(Request::ListDefinedDomains)? {
            Reply::ListDefinedDomains { mut names } => {
                names.truncate(max);
                Ok(names)
            }
            other => Err(unexpected(&other)),
        }
    }

    fn domain_lookup_by_id(&self, id: u32) -> Result<Domain> {
        let reply = self
            .call(Request::DomainLookupById { id })
            .map_err(not_found(format!("domain {id}")))?;
        match reply {
            Reply::DomainLookupById { uuid, name } => Ok(Domain {
                name,
                uuid,
                id: Some(id),
            }),
            other => Err(unexpected(&other)),
        }
    }

    fn domain_lookup_by_uuid(&self, uuid: &Uuid) -> Result<Domain> {
        let reply = self
            .call(Request::DomainLookupByUuid { uuid: *uuid })
            .map_err(not_found(format!("domain {uuid}")))?;
        match reply {
            Reply::DomainLookupByUuid { id, name } => Ok(Domain {
                name,
                uuid: *uuid,
                id: id.try_into().ok(),
            }),
            other => Err(unexpected(&other)),
        }
    }

    fn domain_lookup_by_name(&self, name: &str) -> Result<Domain> {
        let reply = self
            .call(Request::DomainLookupByName { name: name.into() })
            .map_err(not_found(format!("domain '{name}'")))?;
        match reply {
            Reply::DomainLookupByName { id, uuid } => Ok(Domain {
                name: name.to_owned(),
                uuid,
                id: id.try_into().ok(),
            }),
            other => Err(unexpected(&other)),
        }
    }

    fn domain_create(&self, config: &str) -> Result<Domain> {
        Self::check_config(config)?;
        match self.call(Request::DomainCreate {
            config: config.into(),
        })? {
            Reply::DomainCreate { id, uuid, name } => Ok(Domain {
                name,
                uuid,
                id: id.try_into().ok(),
            }),
            other => Err(unexpected(&other)),
        }
    }

    fn domain_define(&self, config: &str) -> Result<Domain> {
        Self::check_config(config)?;
        match self.call(Request::DomainDefine {
            config: config.into(),
        })? {
            // Defined domains are not running; they get an id on start.
            Reply::DomainDefine { name, uuid } => Ok(Domain {
                name,
                uuid,
                id: None,
            }),
            other => Err(unexpected(&other)),
        }
    }

    fn domain_start(&self, domain: &mut Domain) -> Result<()> {
        match self.call(Request::DomainStart { uuid: domain.uuid })? {
            Reply::DomainStart { id } => {
                domain.id = Some(id.try_into().map_err(|_| {
                    DriverError::InvalidReply(format!("negative domain id {id} after start"))
                })?);
                Ok(())
            }
            other => Err(unexpected(&other)),
        }
    }

    fn domain_suspend(&self, domain: &Domain) -> Result<()> {
        let id = Self::running_id(domain)?;
        match self.call(Request::DomainSuspend { id })? {
            Reply::DomainSuspend => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn domain_resume(&self, domain: &Domain) -> Result<()> {
        let id = Self::running_id(domain)?;
        match self.call(Request::DomainResume { id })? {
            Reply::DomainResume => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn domain_destroy(&self, domain: &mut Domain) -> Result<()> {
        let id = Self::running_id(domain)?;
        match self.call(Request::DomainDestroy { id })? {
            Reply::DomainDestroy => {
                domain.id = None;
                Ok(())
            }
            other => Err(unexpected(&other)),
        }
    }

    fn domain_shutdown(&self, domain: &mut Domain) -> Result<()> {
        // The daemon contract has no graceful shutdown yet.
        self.domain_destroy(domain)
    }

    fn domain_undefine(&self, domain: Domain) -> Result<()> {
        // The handle is consumed whatever the daemon says: local cleanup
        // is unconditional, the remote failure is still reported.
        match self.call(Request::DomainUndefine { uuid: domain.uuid })? {
            Reply::DomainUndefine => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn domain_info(&self, domain: &Domain) -> Result<DomainInfo> {
        match self.call(Request::DomainGetInfo { uuid: domain.uuid })? {
            Reply::DomainGetInfo {
                runstate,
                cpu_time,
                max_mem,
                memory,
                nr_virt_cpu,
            } => {
                let state = match runstate {
                    STATE_RUNNING => DomainState::Running,
                    STATE_PAUSED => DomainState::Paused,
                    STATE_STOPPED => DomainState::Shutoff,
                    // No silent default for states this driver does not
                    // know about.
                    other => {
                        return Err(DriverError::InvalidReply(format!(
                            "unknown domain run state {other}"
                        )))
                    }
                };
                Ok(DomainInfo {
                    state,
                    max_mem,
                    memory,
                    nr_virt_cpu,
                    cpu_time,
                })
            }
            other => Err(unexpected(&other)),
        }
    }

    fn domain_dump_config(&self, domain: &Domain) -> Result<String> {
        match self.call(Request::DomainDumpConfig { uuid: domain.uuid })? {
            Reply::DomainDumpConfig { config } => Ok(config),
            other => Err(unexpected(&other)),
        }
    }

    fn domain_save(&self, _domain: &Domain, _file: &str) -> Result<()> {
        Err(DriverError::Unsupported("domain save"))
    }

    fn domain_restore(&self, _file: &str) -> Result<()> {
        Err(DriverError::Unsupported("domain restore"))
    }

    fn num_networks(&self) -> Result<u32> {
        match self.call(Request::NumNetworks)? {
            Reply::NumNetworks { count } => Ok(count),
            other => Err(unexpected(&other)),
        }
    }

    fn list_networks(&self, max: usize) -> Result<Vec<String>> {
        match self.call(Request::ListNetworks)? {
            Reply::ListNetworks { mut names } => {
                names.truncate(max);
                Ok(names)
            }
            other => Err(unexpected(&other)),
        }
    }

    fn num_defined_networks(&self) -> Result<u32> {
        match self.call(Request::NumDefinedNetworks)? {
            Reply::NumDefinedNetworks { count } => Ok(count),
            other => Err(unexpected(&other)),
        }
    }

    fn list_defined_networks(&self, max: usize) -> Result<Vec<String>> {
        match self.call(Request::ListDefinedNetworks)? {
            Reply::ListDefinedNetworks { mut names } => {
                names.truncate(max);
                Ok(names)
            }
            other => Err(unexpected(&other)),
        }
    }

    fn network_lookup_by_uuid(&self, uuid: &Uuid) -> Result<Network> {
        let reply = self
            .call(Request::NetworkLookupByUuid { uuid: *uuid })
            .map_err(not_found(format!("network {uuid}")))?;
        match reply {
            Reply::NetworkLookupByUuid { name } => Ok(Network { name, uuid: *uuid }),
            other => Err(unexpected(&other)),
        }
    }

    fn network_lookup_by_name(&self, name: &str) -> Result<Network> {
        let reply = self
            .call(Request::NetworkLookupByName { name: name.into() })
            .map_err(not_found(format!("network '{name}'")))?;
        match reply {
            Reply::NetworkLookupByName { uuid } => Ok(Network {
                name: name.to_owned(),
                uuid,
            }),
            other => Err(unexpected(&other)),
        }
    }

    fn network_create(&self, config: &str) -> Result<Network> {
        Self::check_config(config)?;
        match self.call(Request::NetworkCreate {
            config: config.into(),
        })? {
            Reply::NetworkCreate { name, uuid } => Ok(Network { name, uuid }),
            other => Err(unexpected(&other)),
        }
    }

    fn network_define(&self, config: &str) -> Result<Network> {
        Self::check_config(config)?;
        match self.call(Request::NetworkDefine {
            config: config.into(),
        })? {
            Reply::NetworkDefine { name, uuid } => Ok(Network { name, uuid }),
            other => Err(unexpected(&other)),
        }
    }

    fn network_undefine(&self, network: Network) -> Result<()> {
        match self.call(Request::NetworkUndefine { uuid: network.uuid })? {
            Reply::NetworkUndefine => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn network_start(&self, network: &Network) -> Result<()> {
        match self.call(Request::NetworkStart { uuid: network.uuid })? {
            Reply::NetworkStart => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn network_destroy(&self, network: &Network) -> Result<()> {
        match self.call(Request::NetworkDestroy { uuid: network.uuid })? {
            Reply::NetworkDestroy => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn network_dump_config(&self, network: &Network) -> Result<String> {
        match self.call(Request::NetworkDumpConfig { uuid: network.uuid })? {
            Reply::NetworkDumpConfig { config } => Ok(config),
            other => Err(unexpected(&other)),
        }
    }

    fn network_bridge_name(&self, network: &Network) -> Result<String> {
        match self.call(Request::NetworkGetBridgeName { uuid: network.uuid })? {
            Reply::NetworkGetBridgeName { ifname } => Ok(ifname),
            other => Err(unexpected(&other)),
        }
    }
}
