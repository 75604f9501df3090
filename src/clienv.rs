//! Environment and path policy.
//!
//! Every environment variable the crate reads is named and resolved here,
//! so the rest of the code never touches `std::env` directly.

use std::path::PathBuf;

/// Alternate daemon executable, checked before the fixed install paths.
/// Primarily a debugging aid.
pub const ENV_DAEMON: &str = "QEMUD_SERVER";

/// Direct socket-endpoint override, bypassing URI path resolution.
pub const ENV_SOCKET: &str = "QEMUD_SOCKET";

/// Root of the local state tree holding the system sockets.
pub const ENV_STATE_DIR: &str = "QEMUD_STATE_DIR";

const DEFAULT_STATE_DIR: &str = "/var";

/// Daemon executable override ($QEMUD_SERVER).
pub fn daemon_override() -> Option<PathBuf> {
    let val = std::env::var_os(ENV_DAEMON).map(PathBuf::from);
    tracing::trace!(value = ?val, "QEMUD_SERVER env var");
    val
}

/// Socket endpoint override ($QEMUD_SOCKET). A leading `@` names an
/// abstract socket, as in the session path convention.
pub fn socket_override() -> Option<String> {
    let val = std::env::var(ENV_SOCKET).ok();
    tracing::trace!(value = ?val, "QEMUD_SOCKET env var");
    val
}

/// Local state directory ($QEMUD_STATE_DIR or /var). The system sockets
/// live under `<state-dir>/run/qemud/`.
pub fn state_dir() -> PathBuf {
    std::env::var_os(ENV_STATE_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
}

/// System socket path; read-only opens use the separate `-ro` socket.
pub fn system_socket_path(read_only: bool) -> PathBuf {
    let name = if read_only { "sock-ro" } else { "sock" };
    state_dir().join("run").join("qemud").join(name)
}

/// Per-user session socket under the caller's home directory. The `@`
/// prefix marks the abstract namespace on platforms that support it.
pub fn session_socket_name() -> Option<String> {
    let home = dirs::home_dir()?;
    Some(format!("@{}/.qemud/sock", home.display()))
}

/// Default connection URI when the caller gives none: the host-wide
/// instance for root, the per-user instance otherwise.
pub fn default_uri() -> &'static str {
    if unsafe { libc::geteuid() } == 0 {
        "qemu:///system"
    } else {
        "qemu:///session"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_socket_honors_state_dir() {
        std::env::set_var(ENV_STATE_DIR, "/tmp/qemud-test");
        let rw = system_socket_path(false);
        let ro = system_socket_path(true);
        std::env::remove_var(ENV_STATE_DIR);
        assert_eq!(rw, PathBuf::from("/tmp/qemud-test/run/qemud/sock"));
        assert_eq!(ro, PathBuf::from("/tmp/qemud-test/run/qemud/sock-ro"));
    }

    #[test]
    fn session_socket_is_abstract_under_home() {
        let name = session_socket_name().unwrap();
        assert!(name.starts_with('@'));
        assert!(name.ends_with("/.qemud/sock"));
    }
}
