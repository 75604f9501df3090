//! Socket endpoint resolution and connection establishment.
//!
//! The connection URI selects between the host-wide daemon (`/system`,
//! with a separate read-only socket) and a per-user instance (`/session`,
//! an abstract socket under the caller's home so no filesystem entry is
//! needed). Remote hosts are rejected; this driver is local-only.

use std::fmt;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use tracing::{debug, info};
use url::Url;

use super::autostart::DaemonLauncher;
use crate::clienv;
use crate::error::{DriverError, Result};

/// Hard contract: at most this many daemon-spawn attempts per open.
const MAX_SPAWN_ATTEMPTS: u32 = 3;

/// Resolved socket endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Filesystem(std::path::PathBuf),
    /// Abstract-namespace socket (no filesystem entry); Linux only, with a
    /// filesystem fallback elsewhere.
    Abstract(String),
}

impl Endpoint {
    /// Parse the `@`-prefix convention used by the session path and the
    /// `$QEMUD_SOCKET` override.
    fn from_name(name: &str) -> Self {
        match name.strip_prefix('@') {
            Some(rest) => Endpoint::Abstract(rest.to_owned()),
            None => Endpoint::Filesystem(name.into()),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Filesystem(path) => write!(f, "{}", path.display()),
            Endpoint::Abstract(name) => write!(f, "@{name}"),
        }
    }
}

/// Resolve a connection URI to a socket endpoint.
pub fn resolve(uri: &Url, read_only: bool) -> Result<Endpoint> {
    if uri.scheme() != "qemu" {
        return Err(DriverError::InvalidUri(format!(
            "unsupported scheme {:?}",
            uri.scheme()
        )));
    }
    if uri.host_str().is_some_and(|h| !h.is_empty()) {
        return Err(DriverError::InvalidUri(
            "remote connections are not supported".into(),
        ));
    }

    if let Some(name) = clienv::socket_override() {
        let endpoint = Endpoint::from_name(&name);
        debug!(%endpoint, "socket endpoint overridden by QEMUD_SOCKET");
        return Ok(endpoint);
    }

    match uri.path() {
        "/system" => Ok(Endpoint::Filesystem(clienv::system_socket_path(read_only))),
        "/session" => {
            let name = clienv::session_socket_name().ok_or_else(|| {
                DriverError::InvalidUri("no home directory for session socket".into())
            })?;
            Ok(Endpoint::from_name(&name))
        }
        other => Err(DriverError::InvalidUri(format!(
            "unknown connection path {other:?}"
        ))),
    }
}

fn connect_stream(endpoint: &Endpoint) -> std::io::Result<UnixStream> {
    match endpoint {
        Endpoint::Filesystem(path) => UnixStream::connect(path),
        #[cfg(target_os = "linux")]
        Endpoint::Abstract(name) => {
            use std::os::linux::net::SocketAddrExt;
            let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
            UnixStream::connect_addr(&addr)
        }
        #[cfg(not(target_os = "linux"))]
        Endpoint::Abstract(name) => UnixStream::connect(name),
    }
}

/// Connect to the endpoint, autostarting the daemon on failure.
///
/// On a failed connect, if autostart is enabled and fewer than
/// [`MAX_SPAWN_ATTEMPTS`] spawns have happened, the daemon is launched and
/// the connect retried after `5ms x attempt^2`. The bound applies to the
/// connect phase only; transactional requests are never retried.
pub fn open(
    endpoint: &Endpoint,
    autostart: bool,
    launcher: &dyn DaemonLauncher,
) -> Result<UnixStream> {
    let mut attempts: u32 = 0;
    loop {
        match connect_stream(endpoint) {
            Ok(stream) => {
                info!(%endpoint, "connected to daemon");
                return Ok(stream);
            }
            Err(err) => {
                if !autostart || attempts >= MAX_SPAWN_ATTEMPTS {
                    debug!(%endpoint, error = %err, "connect failed");
                    return Err(DriverError::ConnectFailed {
                        path: endpoint.to_string(),
                    });
                }
                launcher.launch()?;
                attempts += 1;
                std::thread::sleep(Duration::from_micros(5_000 * u64::from(attempts * attempts)));
            }
        }
    }
}
