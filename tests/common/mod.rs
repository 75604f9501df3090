//! Scripted qemud stand-in for the integration tests.
//!
//! Listens on a real Unix socket, speaks the wire codec, and keeps an
//! in-memory table of domains and networks so lifecycle scenarios behave
//! like a live daemon.

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use uuid::Uuid;

use qemuctl::qemud::protocol::{Header, MessageType, Reply, Request, HEADER_LEN};
use qemuctl::qemud::{STATE_PAUSED, STATE_RUNNING, STATE_STOPPED};

pub struct MockDomain {
    pub name: String,
    pub uuid: Uuid,
    /// Runtime id; `None` while only defined.
    pub id: Option<u32>,
    pub paused: bool,
    pub config: String,
}

pub struct MockNetwork {
    pub name: String,
    pub uuid: Uuid,
    pub active: bool,
    pub bridge: String,
    pub config: String,
}

#[derive(Default)]
pub struct MockState {
    pub domains: Vec<MockDomain>,
    pub networks: Vec<MockNetwork>,
    pub next_id: u32,
    pub version: u32,
    /// Packets served, for asserting that an operation sent nothing.
    pub requests: u64,
}

impl MockState {
    fn fresh_uuid(&mut self) -> Uuid {
        self.next_id += 1;
        let mut raw = [0u8; 16];
        raw[12..].copy_from_slice(&self.next_id.to_be_bytes());
        Uuid::from_bytes(raw)
    }

    fn fresh_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct MockDaemon {
    pub socket_path: PathBuf,
    pub state: Arc<Mutex<MockState>>,
    // Tempdir keeps the socket path alive for the daemon's lifetime.
    _dir: tempfile::TempDir,
}

impl MockDaemon {
    pub fn spawn() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket_path = dir.path().join("qemud.sock");
        let listener = UnixListener::bind(&socket_path).expect("bind mock socket");
        let state = Arc::new(Mutex::new(MockState {
            version: 2_000_042,
            ..MockState::default()
        }));

        let thread_state = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let state = Arc::clone(&thread_state);
                thread::spawn(move || serve_connection(stream, state));
            }
        });

        MockDaemon {
            socket_path,
            state,
            _dir: dir,
        }
    }

    pub fn requests_served(&self) -> u64 {
        self.state.lock().unwrap().requests
    }
}

fn serve_connection(mut stream: UnixStream, state: Arc<Mutex<MockState>>) {
    loop {
        let mut raw = [0u8; HEADER_LEN];
        if stream.read_exact(&mut raw).is_err() {
            return;
        }
        let Ok(header) = Header::decode(&raw) else { return };
        let mut body = vec![0u8; header.body_len as usize];
        if stream.read_exact(&mut body).is_err() {
            return;
        }
        let Some(tag) = MessageType::from_wire(header.tag) else { return };
        let Ok(request) = Request::decode(tag, &body) else { return };

        let reply = {
            let mut state = state.lock().unwrap();
            state.requests += 1;
            serve_request(&mut state, request)
        };
        let packet = reply.encode().expect("mock reply encode");
        if stream.write_all(&packet).is_err() {
            return;
        }
    }
}

fn failure(message: &str) -> Reply {
    Reply::Failure {
        code: 1,
        message: message.into(),
    }
}

/// Pull the `<name>…</name>` element out of a configuration document the
/// way tests write them.
fn config_name(config: &str) -> Option<String> {
    let start = config.find("<name>")? + "<name>".len();
    let end = config[start..].find("</name>")? + start;
    Some(config[start..end].to_owned())
}

fn serve_request(state: &mut MockState, request: Request) -> Reply {
    match request {
        Request::GetVersion => Reply::GetVersion {
            version: state.version,
        },

        Request::GetNodeInfo => Reply::GetNodeInfo {
            model: "x86_64".into(),
            memory: 8 * 1024 * 1024,
            cpus: 4,
            mhz: 2600,
            nodes: 1,
            sockets: 1,
            cores: 4,
            threads: 1,
        },

        Request::NumDomains => Reply::NumDomains {
            count: state.domains.iter().filter(|d| d.id.is_some()).count() as u32,
        },

        Request::ListDomains => Reply::ListDomains {
            ids: state.domains.iter().filter_map(|d| d.id).collect(),
        },

        Request::NumDefinedDomains => Reply::NumDefinedDomains {
            count: state.domains.iter().filter(|d| d.id.is_none()).count() as u32,
        },

        Request::ListDefinedDomains => Reply::ListDefinedDomains {
            names: state
                .domains
                .iter()
                .filter(|d| d.id.is_none())
                .map(|d| d.name.clone())
                .collect(),
        },

        Request::DomainCreate { config } => {
            let Some(name) = config_name(&config) else {
                return failure("config has no name");
            };
            let id = state.fresh_id();
            let uuid = state.fresh_uuid();
            state.domains.push(MockDomain {
                name: name.clone(),
                uuid,
                id: Some(id),
                paused: false,
                config,
            });
            Reply::DomainCreate {
                id: id as i32,
                uuid,
                name,
            }
        }

        Request::DomainDefine { config } => {
            let Some(name) = config_name(&config) else {
                return failure("config has no name");
            };
            let uuid = state.fresh_uuid();
            state.domains.push(MockDomain {
                name: name.clone(),
                uuid,
                id: None,
                paused: false,
                config,
            });
            Reply::DomainDefine { name, uuid }
        }

        Request::DomainLookupById { id } => {
            match state.domains.iter().find(|d| d.id == Some(id)) {
                Some(d) => Reply::DomainLookupById {
                    uuid: d.uuid,
                    name: d.name.clone(),
                },
                None => failure("no domain with that id"),
            }
        }

        Request::DomainLookupByUuid { uuid } => {
            match state.domains.iter().find(|d| d.uuid == uuid) {
                Some(d) => Reply::DomainLookupByUuid {
                    id: d.id.map_or(-1, |id| id as i32),
                    name: d.name.clone(),
                },
                None => failure("no domain with that uuid"),
            }
        }

        Request::DomainLookupByName { name } => {
            match state.domains.iter().find(|d| d.name == name) {
                Some(d) => Reply::DomainLookupByName {
                    id: d.id.map_or(-1, |id| id as i32),
                    uuid: d.uuid,
                },
                None => failure("no domain with that name"),
            }
        }

        Request::DomainStart { uuid } => {
            let id = state.fresh_id();
            match state.domains.iter_mut().find(|d| d.uuid == uuid) {
                Some(d) if d.id.is_none() => {
                    d.id = Some(id);
                    Reply::DomainStart { id: id as i32 }
                }
                Some(_) => failure("domain already running"),
                None => failure("no domain with that uuid"),
            }
        }

        Request::DomainSuspend { id } => {
            match state.domains.iter_mut().find(|d| d.id == Some(id)) {
                Some(d) => {
                    d.paused = true;
                    Reply::DomainSuspend
                }
                None => failure("no domain with that id"),
            }
        }

        Request::DomainResume { id } => {
            match state.domains.iter_mut().find(|d| d.id == Some(id)) {
                Some(d) => {
                    d.paused = false;
                    Reply::DomainResume
                }
                None => failure("no domain with that id"),
            }
        }

        Request::DomainDestroy { id } => {
            match state.domains.iter().position(|d| d.id == Some(id)) {
                Some(idx) => {
                    // Destroying a transient domain removes it entirely.
                    state.domains.remove(idx);
                    Reply::DomainDestroy
                }
                None => failure("no domain with that id"),
            }
        }

        Request::DomainUndefine { uuid } => {
            match state
                .domains
                .iter()
                .position(|d| d.uuid == uuid && d.id.is_none())
            {
                Some(idx) => {
                    state.domains.remove(idx);
                    Reply::DomainUndefine
                }
                None => failure("no defined domain with that uuid"),
            }
        }

        Request::DomainGetInfo { uuid } => {
            match state.domains.iter().find(|d| d.uuid == uuid) {
                Some(d) => Reply::DomainGetInfo {
                    runstate: match (d.id, d.paused) {
                        (None, _) => STATE_STOPPED,
                        (Some(_), true) => STATE_PAUSED,
                        (Some(_), false) => STATE_RUNNING,
                    },
                    cpu_time: 1_000_000,
                    max_mem: 524_288,
                    memory: 262_144,
                    nr_virt_cpu: 2,
                },
                None => failure("no domain with that uuid"),
            }
        }

        Request::DomainDumpConfig { uuid } => {
            match state.domains.iter().find(|d| d.uuid == uuid) {
                Some(d) => Reply::DomainDumpConfig {
                    config: d.config.clone(),
                },
                None => failure("no domain with that uuid"),
            }
        }

        Request::NumNetworks => Reply::NumNetworks {
            count: state.networks.iter().filter(|n| n.active).count() as u32,
        },

        Request::ListNetworks => Reply::ListNetworks {
            names: state
                .networks
                .iter()
                .filter(|n| n.active)
                .map(|n| n.name.clone())
                .collect(),
        },

        Request::NumDefinedNetworks => Reply::NumDefinedNetworks {
            count: state.networks.iter().filter(|n| !n.active).count() as u32,
        },

        Request::ListDefinedNetworks => Reply::ListDefinedNetworks {
            names: state
                .networks
                .iter()
                .filter(|n| !n.active)
                .map(|n| n.name.clone())
                .collect(),
        },

        Request::NetworkCreate { config } => {
            let Some(name) = config_name(&config) else {
                return failure("config has no name");
            };
            let uuid = state.fresh_uuid();
            let bridge = format!("virbr{}", state.networks.len());
            state.networks.push(MockNetwork {
                name: name.clone(),
                uuid,
                active: true,
                bridge,
                config,
            });
            Reply::NetworkCreate { name, uuid }
        }

        Request::NetworkDefine { config } => {
            let Some(name) = config_name(&config) else {
                return failure("config has no name");
            };
            let uuid = state.fresh_uuid();
            let bridge = format!("virbr{}", state.networks.len());
            state.networks.push(MockNetwork {
                name: name.clone(),
                uuid,
                active: false,
                bridge,
                config,
            });
            Reply::NetworkDefine { name, uuid }
        }

        Request::NetworkLookupByUuid { uuid } => {
            match state.networks.iter().find(|n| n.uuid == uuid) {
                Some(n) => Reply::NetworkLookupByUuid {
                    name: n.name.clone(),
                },
                None => failure("no network with that uuid"),
            }
        }

        Request::NetworkLookupByName { name } => {
            match state.networks.iter().find(|n| n.name == name) {
                Some(n) => Reply::NetworkLookupByName { uuid: n.uuid },
                None => failure("no network with that name"),
            }
        }

        Request::NetworkStart { uuid } => {
            match state.networks.iter_mut().find(|n| n.uuid == uuid) {
                Some(n) => {
                    n.active = true;
                    Reply::NetworkStart
                }
                None => failure("no network with that uuid"),
            }
        }

        Request::NetworkDestroy { uuid } => {
            match state.networks.iter_mut().find(|n| n.uuid == uuid) {
                Some(n) => {
                    n.active = false;
                    Reply::NetworkDestroy
                }
                None => failure("no network with that uuid"),
            }
        }

        Request::NetworkUndefine { uuid } => {
            match state
                .networks
                .iter()
                .position(|n| n.uuid == uuid && !n.active)
            {
                Some(idx) => {
                    state.networks.remove(idx);
                    Reply::NetworkUndefine
                }
                None => failure("no inactive network with that uuid"),
            }
        }

        Request::NetworkDumpConfig { uuid } => {
            match state.networks.iter().find(|n| n.uuid == uuid) {
                Some(n) => Reply::NetworkDumpConfig {
                    config: n.config.clone(),
                },
                None => failure("no network with that uuid"),
            }
        }

        Request::NetworkGetBridgeName { uuid } => {
            match state.networks.iter().find(|n| n.uuid == uuid) {
                Some(n) => Reply::NetworkGetBridgeName {
                    ifname: n.bridge.clone(),
                },
                None => failure("no network with that uuid"),
            }
        }
    }
}
