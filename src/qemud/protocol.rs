//! Wire protocol spoken with the qemud daemon.
//!
//! Every packet is a fixed 8-byte header (message type tag + declared body
//! length, both little-endian u32) followed by a type-tagged body of fixed
//! size. String fields occupy fixed-capacity buffers and must be
//! NUL-terminated within their capacity; UUIDs are 16 raw bytes. A header
//! declaring a body larger than any defined variant is rejected before the
//! body is read.
//!
//! The codec is symmetric: requests and replies both encode and decode, so
//! the test suite can run a scripted daemon over the same code.

use uuid::Uuid;

use crate::error::{DriverError, Result};

/// Raw UUID length on the wire.
pub const UUID_LEN: usize = 16;
/// Capacity of name and bridge-interface fields, including the NUL.
pub const MAX_NAME_LEN: usize = 50;
/// Capacity of configuration-document fields, including the NUL.
pub const MAX_CONFIG_LEN: usize = 4096;
/// Capacity of the failure-reply message field, including the NUL.
pub const MAX_ERROR_LEN: usize = 1024;
/// Fixed slot count of the domain-list reply arrays.
pub const MAX_LIST_DOMAINS: usize = 100;
/// Fixed slot count of the network-list reply arrays.
pub const MAX_LIST_NETWORKS: usize = 100;

/// Size of the packet header on the wire.
pub const HEADER_LEN: usize = 8;

/// Largest defined body variant: the name-list replies
/// (count + MAX_LIST_DOMAINS fixed name slots).
pub const MAX_BODY_LEN: usize = 4 + MAX_LIST_DOMAINS * MAX_NAME_LEN;

/// Message type tags. One tag covers both the request and its reply;
/// `Failure` only ever appears as a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    Failure = 0,
    GetVersion = 1,
    GetNodeInfo = 2,
    ListDomains = 3,
    NumDomains = 4,
    DomainCreate = 5,
    DomainLookupById = 6,
    DomainLookupByUuid = 7,
    DomainLookupByName = 8,
    DomainSuspend = 9,
    DomainResume = 10,
    DomainDestroy = 11,
    DomainGetInfo = 12,
    DomainDumpConfig = 13,
    NumDefinedDomains = 14,
    ListDefinedDomains = 15,
    DomainStart = 16,
    DomainDefine = 17,
    DomainUndefine = 18,
    NumNetworks = 19,
    ListNetworks = 20,
    NumDefinedNetworks = 21,
    ListDefinedNetworks = 22,
    NetworkLookupByUuid = 23,
    NetworkLookupByName = 24,
    NetworkCreate = 25,
    NetworkDefine = 26,
    NetworkUndefine = 27,
    NetworkStart = 28,
    NetworkDestroy = 29,
    NetworkDumpConfig = 30,
    NetworkGetBridgeName = 31,
}

impl MessageType {
    pub fn from_wire(tag: u32) -> Option<Self> {
        use MessageType::*;
        Some(match tag {
            0 => Failure,
            1 => GetVersion,
            2 => GetNodeInfo,
            3 => ListDomains,
            4 => NumDomains,
            5 => DomainCreate,
            6 => DomainLookupById,
            7 => DomainLookupByUuid,
            8 => DomainLookupByName,
            9 => DomainSuspend,
            10 => DomainResume,
            11 => DomainDestroy,
            12 => DomainGetInfo,
            13 => DomainDumpConfig,
            14 => NumDefinedDomains,
            15 => ListDefinedDomains,
            16 => DomainStart,
            17 => DomainDefine,
            18 => DomainUndefine,
            19 => NumNetworks,
            20 => ListNetworks,
            21 => NumDefinedNetworks,
            22 => ListDefinedNetworks,
            23 => NetworkLookupByUuid,
            24 => NetworkLookupByName,
            25 => NetworkCreate,
            26 => NetworkDefine,
            27 => NetworkUndefine,
            28 => NetworkStart,
            29 => NetworkDestroy,
            30 => NetworkDumpConfig,
            31 => NetworkGetBridgeName,
            _ => return None,
        })
    }
}

/// Packet header: message type tag and declared body length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: u32,
    pub body_len: u32,
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&self.tag.to_le_bytes());
        out[4..].copy_from_slice(&self.body_len.to_le_bytes());
        out
    }

    /// Decode and validate a header. The declared body length is checked
    /// against the maximum variant size here, before any body byte is
    /// trusted or read.
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self> {
        let tag = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let body_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if body_len as usize > MAX_BODY_LEN {
            return Err(DriverError::MalformedHeader {
                declared: body_len,
                max: MAX_BODY_LEN as u32,
            });
        }
        Ok(Header { tag, body_len })
    }
}

/// Requests sent by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GetVersion,
    GetNodeInfo,
    ListDomains,
    NumDomains,
    DomainCreate { config: String },
    DomainLookupById { id: u32 },
    DomainLookupByUuid { uuid: Uuid },
    DomainLookupByName { name: String },
    DomainSuspend { id: u32 },
    DomainResume { id: u32 },
    DomainDestroy { id: u32 },
    DomainGetInfo { uuid: Uuid },
    DomainDumpConfig { uuid: Uuid },
    NumDefinedDomains,
    ListDefinedDomains,
    DomainStart { uuid: Uuid },
    DomainDefine { config: String },
    DomainUndefine { uuid: Uuid },
    NumNetworks,
    ListNetworks,
    NumDefinedNetworks,
    ListDefinedNetworks,
    NetworkLookupByUuid { uuid: Uuid },
    NetworkLookupByName { name: String },
    NetworkCreate { config: String },
    NetworkDefine { config: String },
    NetworkUndefine { uuid: Uuid },
    NetworkStart { uuid: Uuid },
    NetworkDestroy { uuid: Uuid },
    NetworkDumpConfig { uuid: Uuid },
    NetworkGetBridgeName { uuid: Uuid },
}

/// Replies received from the daemon. Tags mirror [`Request`] except for
/// `Failure`, which any request may receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Failure {
        code: u32,
        message: String,
    },
    GetVersion {
        version: u32,
    },
    GetNodeInfo {
        model: String,
        memory: u64,
        cpus: u32,
        mhz: u32,
        nodes: u32,
        sockets: u32,
        cores: u32,
        threads: u32,
    },
    ListDomains {
        ids: Vec<u32>,
    },
    NumDomains {
        count: u32,
    },
    DomainCreate {
        id: i32,
        uuid: Uuid,
        name: String,
    },
    DomainLookupById {
        uuid: Uuid,
        name: String,
    },
    DomainLookupByUuid {
        id: i32,
        name: String,
    },
    DomainLookupByName {
        id: i32,
        uuid: Uuid,
    },
    DomainSuspend,
    DomainResume,
    DomainDestroy,
    DomainGetInfo {
        runstate: u32,
        cpu_time: u64,
        max_mem: u64,
        memory: u64,
        nr_virt_cpu: u32,
    },
    DomainDumpConfig {
        config: String,
    },
    NumDefinedDomains {
        count: u32,
    },
    ListDefinedDomains {
        names: Vec<String>,
    },
    DomainStart {
        id: i32,
    },
    DomainDefine {
        name: String,
        uuid: Uuid,
    },
    DomainUndefine,
    NumNetworks {
        count: u32,
    },
    ListNetworks {
        names: Vec<String>,
    },
    NumDefinedNetworks {
        count: u32,
    },
    ListDefinedNetworks {
        names: Vec<String>,
    },
    NetworkLookupByUuid {
        name: String,
    },
    NetworkLookupByName {
        uuid: Uuid,
    },
    NetworkCreate {
        name: String,
        uuid: Uuid,
    },
    NetworkDefine {
        name: String,
        uuid: Uuid,
    },
    NetworkUndefine,
    NetworkStart,
    NetworkDestroy,
    NetworkDumpConfig {
        config: String,
    },
    NetworkGetBridgeName {
        ifname: String,
    },
}

// ---------------------------------------------------------------------------
// Field encoding helpers
// ---------------------------------------------------------------------------

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_uuid(buf: &mut Vec<u8>, uuid: &Uuid) {
    buf.extend_from_slice(uuid.as_bytes());
}

/// Write `s` into a fixed-capacity field of `cap` bytes, zero padded.
/// Refuses input that would not leave room for the terminating NUL.
fn put_str(buf: &mut Vec<u8>, s: &str, cap: usize) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() >= cap {
        return Err(DriverError::TooLarge {
            len: bytes.len(),
            max: cap - 1,
        });
    }
    buf.extend_from_slice(bytes);
    buf.resize(buf.len() + (cap - bytes.len()), 0);
    Ok(())
}

/// Sequential reader over one packet body. Every variant has an exact wire
/// size; `finish` rejects bodies with trailing bytes.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(DriverError::InvalidReply(format!(
                "body truncated: wanted {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.bytes.len()
            )));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn take_uuid(&mut self) -> Result<Uuid> {
        let b = self.take(UUID_LEN)?;
        let mut raw = [0u8; UUID_LEN];
        raw.copy_from_slice(b);
        Ok(Uuid::from_bytes(raw))
    }

    /// Read a fixed-capacity string field. The field must contain a NUL
    /// within its capacity and valid UTF-8 before it; anything else is
    /// rejected rather than truncated.
    fn take_str(&mut self, cap: usize) -> Result<String> {
        let field = self.take(cap)?;
        let nul = field
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| DriverError::InvalidReply("unterminated string field".into()))?;
        let s = std::str::from_utf8(&field[..nul])
            .map_err(|_| DriverError::InvalidReply("non-UTF-8 string field".into()))?;
        Ok(s.to_owned())
    }

    fn finish(self) -> Result<()> {
        if self.pos != self.bytes.len() {
            return Err(DriverError::InvalidReply(format!(
                "body has {} trailing bytes",
                self.bytes.len() - self.pos
            )));
        }
        Ok(())
    }
}

fn finish_packet(tag: MessageType, body: Vec<u8>) -> Vec<u8> {
    let header = Header {
        tag: tag as u32,
        body_len: body.len() as u32,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&body);
    out
}

fn wrong_type(tag: MessageType) -> DriverError {
    DriverError::InvalidReply(format!("body does not match type tag {:?}", tag))
}

// ---------------------------------------------------------------------------
// Request codec
// ---------------------------------------------------------------------------

impl Request {
    pub fn message_type(&self) -> MessageType {
        use MessageType as T;
        match self {
            Request::GetVersion => T::GetVersion,
            Request::GetNodeInfo => T::GetNodeInfo,
            Request::ListDomains => T::ListDomains,
            Request::NumDomains => T::NumDomains,
            Request::DomainCreate { .. } => T::DomainCreate,
            Request::DomainLookupById { .. } => T::DomainLookupById,
            Request::DomainLookupByUuid { .. } => T::DomainLookupByUuid,
            Request::DomainLookupByName { .. } => T::DomainLookupByName,
            Request::DomainSuspend { .. } => T::DomainSuspend,
            Request::DomainResume { .. } => T::DomainResume,
            Request::DomainDestroy { .. } => T::DomainDestroy,
            Request::DomainGetInfo { .. } => T::DomainGetInfo,
            Request::DomainDumpConfig { .. } => T::DomainDumpConfig,
            Request::NumDefinedDomains => T::NumDefinedDomains,
            Request::ListDefinedDomains => T::ListDefinedDomains,
            Request::DomainStart { .. } => T::DomainStart,
            Request::DomainDefine { .. } => T::DomainDefine,
            Request::DomainUndefine { .. } => T::DomainUndefine,
            Request::NumNetworks => T::NumNetworks,
            Request::ListNetworks => T::ListNetworks,
            Request::NumDefinedNetworks => T::NumDefinedNetworks,
            Request::ListDefinedNetworks => T::ListDefinedNetworks,
            Request::NetworkLookupByUuid { .. } => T::NetworkLookupByUuid,
            Request::NetworkLookupByName { .. } => T::NetworkLookupByName,
            Request::NetworkCreate { .. } => T::NetworkCreate,
            Request::NetworkDefine { .. } => T::NetworkDefine,
            Request::NetworkUndefine { .. } => T::NetworkUndefine,
            Request::NetworkStart { .. } => T::NetworkStart,
            Request::NetworkDestroy { .. } => T::NetworkDestroy,
            Request::NetworkDumpConfig { .. } => T::NetworkDumpConfig,
            Request::NetworkGetBridgeName { .. } => T::NetworkGetBridgeName,
        }
    }

    /// Encode header + body. The body length in the header is always the
    /// exact variant size.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        match self {
            Request::GetVersion
            | Request::GetNodeInfo
            | Request::ListDomains
            | Request::NumDomains
            | Request::NumDefinedDomains
            | Request::ListDefinedDomains
            | Request::NumNetworks
            | Request::ListNetworks
            | Request::NumDefinedNetworks
            | Request::ListDefinedNetworks => {}

            Request::DomainCreate { config }
            | Request::DomainDefine { config }
            | Request::NetworkCreate { config }
            | Request::NetworkDefine { config } => {
                put_str(&mut body, config, MAX_CONFIG_LEN)?;
            }

            Request::DomainLookupById { id }
            | Request::DomainSuspend { id }
            | Request::DomainResume { id }
            | Request::DomainDestroy { id } => put_u32(&mut body, *id),

            Request::DomainLookupByUuid { uuid }
            | Request::DomainGetInfo { uuid }
            | Request::DomainDumpConfig { uuid }
            | Request::DomainStart { uuid }
            | Request::DomainUndefine { uuid }
            | Request::NetworkLookupByUuid { uuid }
            | Request::NetworkUndefine { uuid }
            | Request::NetworkStart { uuid }
            | Request::NetworkDestroy { uuid }
            | Request::NetworkDumpConfig { uuid }
            | Request::NetworkGetBridgeName { uuid } => put_uuid(&mut body, uuid),

            Request::DomainLookupByName { name } | Request::NetworkLookupByName { name } => {
                put_str(&mut body, name, MAX_NAME_LEN)?;
            }
        }
        Ok(finish_packet(self.message_type(), body))
    }

    /// Decode a request body against an already-validated header tag.
    /// Used by the scripted daemon in tests; the driver itself only ever
    /// decodes replies.
    pub fn decode(tag: MessageType, body: &[u8]) -> Result<Request> {
        use MessageType as T;
        let mut c = Cursor::new(body);
        let req = match tag {
            T::Failure => return Err(wrong_type(tag)),
            T::GetVersion => Request::GetVersion,
            T::GetNodeInfo => Request::GetNodeInfo,
            T::ListDomains => Request::ListDomains,
            T::NumDomains => Request::NumDomains,
            T::DomainCreate => Request::DomainCreate {
                config: c.take_str(MAX_CONFIG_LEN)?,
            },
            T::DomainLookupById => Request::DomainLookupById { id: c.take_u32()? },
            T::DomainLookupByUuid => Request::DomainLookupByUuid {
                uuid: c.take_uuid()?,
            },
            T::DomainLookupByName => Request::DomainLookupByName {
                name: c.take_str(MAX_NAME_LEN)?,
            },
            T::DomainSuspend => Request::DomainSuspend { id: c.take_u32()? },
            T::DomainResume => Request::DomainResume { id: c.take_u32()? },
            T::DomainDestroy => Request::DomainDestroy { id: c.take_u32()? },
            T::DomainGetInfo => Request::DomainGetInfo {
                uuid: c.take_uuid()?,
            },
            T::DomainDumpConfig => Request::DomainDumpConfig {
                uuid: c.take_uuid()?,
            },
            T::NumDefinedDomains => Request::NumDefinedDomains,
            T::ListDefinedDomains => Request::ListDefinedDomains,
            T::DomainStart => Request::DomainStart {
                uuid: c.take_uuid()?,
            },
            T::DomainDefine => Request::DomainDefine {
                config: c.take_str(MAX_CONFIG_LEN)?,
            },
            T::DomainUndefine => Request::DomainUndefine {
                uuid: c.take_uuid()?,
            },
            T::NumNetworks => Request::NumNetworks,
            T::ListNetworks => Request::ListNetworks,
            T::NumDefinedNetworks => Request::NumDefinedNetworks,
            T::ListDefinedNetworks => Request::ListDefinedNetworks,
            T::NetworkLookupByUuid => Request::NetworkLookupByUuid {
                uuid: c.take_uuid()?,
            },
            T::NetworkLookupByName => Request::NetworkLookupByName {
                name: c.take_str(MAX_NAME_LEN)?,
            },
            T::NetworkCreate => Request::NetworkCreate {
                config: c.take_str(MAX_CONFIG_LEN)?,
            },
            T::NetworkDefine => Request::NetworkDefine {
                config: c.take_str(MAX_CONFIG_LEN)?,
            },
            T::NetworkUndefine => Request::NetworkUndefine {
                uuid: c.take_uuid()?,
            },
            T::NetworkStart => Request::NetworkStart {
                uuid: c.take_uuid()?,
            },
            T::NetworkDestroy => Request::NetworkDestroy {
                uuid: c.take_uuid()?,
            },
            T::NetworkDumpConfig => Request::NetworkDumpConfig {
                uuid: c.take_uuid()?,
            },
            T::NetworkGetBridgeName => Request::NetworkGetBridgeName {
                uuid: c.take_uuid()?,
            },
        };
        c.finish()?;
        Ok(req)
    }
}

// ---------------------------------------------------------------------------
// Reply codec
// ---------------------------------------------------------------------------

/// Width of the fixed CPU model field in the node-info reply.
const MODEL_LEN: usize = 32;

impl Reply {
    pub fn message_type(&self) -> MessageType {
        use MessageType as T;
        match self {
            Reply::Failure { .. } => T::Failure,
            Reply::GetVersion { .. } => T::GetVersion,
            Reply::GetNodeInfo { .. } => T::GetNodeInfo,
            Reply::ListDomains { .. } => T::ListDomains,
            Reply::NumDomains { .. } => T::NumDomains,
            Reply::DomainCreate { .. } => T::DomainCreate,
            Reply::DomainLookupById { .. } => T::DomainLookupById,
            Reply::DomainLookupByUuid { .. } => T::DomainLookupByUuid,
            Reply::DomainLookupByName { .. } => T::DomainLookupByName,
            Reply::DomainSuspend => T::DomainSuspend,
            Reply::DomainResume => T::DomainResume,
            Reply::DomainDestroy => T::DomainDestroy,
            Reply::DomainGetInfo { .. } => T::DomainGetInfo,
            Reply::DomainDumpConfig { .. } => T::DomainDumpConfig,
            Reply::NumDefinedDomains { .. } => T::NumDefinedDomains,
            Reply::ListDefinedDomains { .. } => T::ListDefinedDomains,
            Reply::DomainStart { .. } => T::DomainStart,
            Reply::DomainDefine { .. } => T::DomainDefine,
            Reply::DomainUndefine => T::DomainUndefine,
            Reply::NumNetworks { .. } => T::NumNetworks,
            Reply::ListNetworks { .. } => T::ListNetworks,
            Reply::NumDefinedNetworks { .. } => T::NumDefinedNetworks,
            Reply::ListDefinedNetworks { .. } => T::ListDefinedNetworks,
            Reply::NetworkLookupByUuid { .. } => T::NetworkLookupByUuid,
            Reply::NetworkLookupByName { .. } => T::NetworkLookupByName,
            Reply::NetworkCreate { .. } => T::NetworkCreate,
            Reply::NetworkDefine { .. } => T::NetworkDefine,
            Reply::NetworkUndefine => T::NetworkUndefine,
            Reply::NetworkStart => T::NetworkStart,
            Reply::NetworkDestroy => T::NetworkDestroy,
            Reply::NetworkDumpConfig { .. } => T::NetworkDumpConfig,
            Reply::NetworkGetBridgeName { .. } => T::NetworkGetBridgeName,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        match self {
            Reply::Failure { code, message } => {
                put_u32(&mut body, *code);
                put_str(&mut body, message, MAX_ERROR_LEN)?;
            }
            Reply::GetVersion { version } => put_u32(&mut body, *version),
            Reply::GetNodeInfo {
                model,
                memory,
                cpus,
                mhz,
                nodes,
                sockets,
                cores,
                threads,
            } => {
                put_str(&mut body, model, MODEL_LEN)?;
                put_u64(&mut body, *memory);
                put_u32(&mut body, *cpus);
                put_u32(&mut body, *mhz);
                put_u32(&mut body, *nodes);
                put_u32(&mut body, *sockets);
                put_u32(&mut body, *cores);
                put_u32(&mut body, *threads);
            }
            Reply::ListDomains { ids } => {
                let n = ids.len().min(MAX_LIST_DOMAINS);
                put_u32(&mut body, n as u32);
                for i in 0..MAX_LIST_DOMAINS {
                    put_u32(&mut body, ids.get(i).copied().unwrap_or(0));
                }
            }
            Reply::NumDomains { count }
            | Reply::NumDefinedDomains { count }
            | Reply::NumNetworks { count }
            | Reply::NumDefinedNetworks { count } => put_u32(&mut body, *count),
            Reply::DomainCreate { id, uuid, name } => {
                put_i32(&mut body, *id);
                put_uuid(&mut body, uuid);
                put_str(&mut body, name, MAX_NAME_LEN)?;
            }
            Reply::DomainLookupById { uuid, name } => {
                put_uuid(&mut body, uuid);
                put_str(&mut body, name, MAX_NAME_LEN)?;
            }
            Reply::DomainLookupByUuid { id, name } => {
                put_i32(&mut body, *id);
                put_str(&mut body, name, MAX_NAME_LEN)?;
            }
            Reply::DomainLookupByName { id, uuid } => {
                put_i32(&mut body, *id);
                put_uuid(&mut body, uuid);
            }
            Reply::DomainSuspend
            | Reply::DomainResume
            | Reply::DomainDestroy
            | Reply::DomainUndefine
            | Reply::NetworkUndefine
            | Reply::NetworkStart
            | Reply::NetworkDestroy => {}
            Reply::DomainGetInfo {
                runstate,
                cpu_time,
                max_mem,
                memory,
                nr_virt_cpu,
            } => {
                put_u32(&mut body, *runstate);
                put_u64(&mut body, *cpu_time);
                put_u64(&mut body, *max_mem);
                put_u64(&mut body, *memory);
                put_u32(&mut body, *nr_virt_cpu);
            }
            Reply::DomainDumpConfig { config } | Reply::NetworkDumpConfig { config } => {
                put_str(&mut body, config, MAX_CONFIG_LEN)?;
            }
            Reply::ListDefinedDomains { names } => {
                encode_name_list(&mut body, names, MAX_LIST_DOMAINS)?;
            }
            Reply::ListNetworks { names } | Reply::ListDefinedNetworks { names } => {
                encode_name_list(&mut body, names, MAX_LIST_NETWORKS)?;
            }
            Reply::DomainStart { id } => put_i32(&mut body, *id),
            Reply::DomainDefine { name, uuid }
            | Reply::NetworkCreate { name, uuid }
            | Reply::NetworkDefine { name, uuid } => {
                put_str(&mut body, name, MAX_NAME_LEN)?;
                put_uuid(&mut body, uuid);
            }
            Reply::NetworkLookupByUuid { name } => put_str(&mut body, name, MAX_NAME_LEN)?,
            Reply::NetworkLookupByName { uuid } => put_uuid(&mut body, uuid),
            Reply::NetworkGetBridgeName { ifname } => {
                put_str(&mut body, ifname, MAX_NAME_LEN)?;
            }
        }
        Ok(finish_packet(self.message_type(), body))
    }

    /// Decode a reply body against an already-validated header tag.
    pub fn decode(tag: MessageType, body: &[u8]) -> Result<Reply> {
        use MessageType as T;
        let mut c = Cursor::new(body);
        let reply = match tag {
            T::Failure => Reply::Failure {
                code: c.take_u32()?,
                message: c.take_str(MAX_ERROR_LEN)?,
            },
            T::GetVersion => Reply::GetVersion {
                version: c.take_u32()?,
            },
            T::GetNodeInfo => Reply::GetNodeInfo {
                model: c.take_str(MODEL_LEN)?,
                memory: c.take_u64()?,
                cpus: c.take_u32()?,
                mhz: c.take_u32()?,
                nodes: c.take_u32()?,
                sockets: c.take_u32()?,
                cores: c.take_u32()?,
                threads: c.take_u32()?,
            },
            T::ListDomains => {
                let count = c.take_u32()? as usize;
                let mut all = Vec::with_capacity(MAX_LIST_DOMAINS);
                for _ in 0..MAX_LIST_DOMAINS {
                    all.push(c.take_u32()?);
                }
                all.truncate(count.min(MAX_LIST_DOMAINS));
                Reply::ListDomains { ids: all }
            }
            T::NumDomains => Reply::NumDomains {
                count: c.take_u32()?,
            },
            T::DomainCreate => Reply::DomainCreate {
                id: c.take_i32()?,
                uuid: c.take_uuid()?,
                name: c.take_str(MAX_NAME_LEN)?,
            },
            T::DomainLookupById => Reply::DomainLookupById {
                uuid: c.take_uuid()?,
                name: c.take_str(MAX_NAME_LEN)?,
            },
            T::DomainLookupByUuid => Reply::DomainLookupByUuid {
                id: c.take_i32()?,
                name: c.take_str(MAX_NAME_LEN)?,
            },
            T::DomainLookupByName => Reply::DomainLookupByName {
                id: c.take_i32()?,
                uuid: c.take_uuid()?,
            },
            T::DomainSuspend => Reply::DomainSuspend,
            T::DomainResume => Reply::DomainResume,
            T::DomainDestroy => Reply::DomainDestroy,
            T::DomainGetInfo => Reply::DomainGetInfo {
                runstate: c.take_u32()?,
                cpu_time: c.take_u64()?,
                max_mem: c.take_u64()?,
                memory: c.take_u64()?,
                nr_virt_cpu: c.take_u32()?,
            },
            T::DomainDumpConfig => Reply::DomainDumpConfig {
                config: c.take_str(MAX_CONFIG_LEN)?,
            },
            T::NumDefinedDomains => Reply::NumDefinedDomains {
                count: c.take_u32()?,
            },
            T::ListDefinedDomains => Reply::ListDefinedDomains {
                names: decode_name_list(&mut c, MAX_LIST_DOMAINS)?,
            },
            T::DomainStart => Reply::DomainStart { id: c.take_i32()? },
            T::DomainDefine => Reply::DomainDefine {
                name: c.take_str(MAX_NAME_LEN)?,
                uuid: c.take_uuid()?,
            },
            T::DomainUndefine => Reply::DomainUndefine,
            T::NumNetworks => Reply::NumNetworks {
                count: c.take_u32()?,
            },
            T::ListNetworks => Reply::ListNetworks {
                names: decode_name_list(&mut c, MAX_LIST_NETWORKS)?,
            },
            T::NumDefinedNetworks => Reply::NumDefinedNetworks {
                count: c.take_u32()?,
            },
            T::ListDefinedNetworks => Reply::ListDefinedNetworks {
                names: decode_name_list(&mut c, MAX_LIST_NETWORKS)?,
            },
            T::NetworkLookupByUuid => Reply::NetworkLookupByUuid {
                name: c.take_str(MAX_NAME_LEN)?,
            },
            T::NetworkLookupByName => Reply::NetworkLookupByName {
                uuid: c.take_uuid()?,
            },
            T::NetworkCreate => Reply::NetworkCreate {
                name: c.take_str(MAX_NAME_LEN)?,
                uuid: c.take_uuid()?,
            },
            T::NetworkDefine => Reply::NetworkDefine {
                name: c.take_str(MAX_NAME_LEN)?,
                uuid: c.take_uuid()?,
            },
            T::NetworkUndefine => Reply::NetworkUndefine,
            T::NetworkStart => Reply::NetworkStart,
            T::NetworkDestroy => Reply::NetworkDestroy,
            T::NetworkDumpConfig => Reply::NetworkDumpConfig {
                config: c.take_str(MAX_CONFIG_LEN)?,
            },
            T::NetworkGetBridgeName => Reply::NetworkGetBridgeName {
                ifname: c.take_str(MAX_NAME_LEN)?,
            },
        };
        c.finish()?;
        Ok(reply)
    }
}

/// Name-list replies carry a count plus a fixed array of name slots.
/// Unused slots are zero filled; counts beyond the slot capacity are
/// clamped rather than trusted.
fn encode_name_list(body: &mut Vec<u8>, names: &[String], slots: usize) -> Result<()> {
    let n = names.len().min(slots);
    put_u32(body, n as u32);
    for i in 0..slots {
        match names.get(i) {
            Some(name) => put_str(body, name, MAX_NAME_LEN)?,
            None => body.resize(body.len() + MAX_NAME_LEN, 0),
        }
    }
    Ok(())
}

fn decode_name_list(c: &mut Cursor<'_>, slots: usize) -> Result<Vec<String>> {
    let count = (c.take_u32()? as usize).min(slots);
    let mut names = Vec::with_capacity(count);
    for i in 0..slots {
        if i < count {
            names.push(c.take_str(MAX_NAME_LEN)?);
        } else {
            c.take(MAX_NAME_LEN)?;
        }
    }
    Ok(names)
}
