//! On-demand daemon autostart.
//!
//! When the socket is unreachable the connection manager asks this module
//! to bring a daemon up. The spawn is a classic double detachment: the
//! first fork redirects its standard streams to the null device, closes
//! every other inherited descriptor and becomes a session leader; the
//! second fork execs the daemon. The intermediate child exits immediately
//! and is reaped here so no zombie is left behind. An exec failure kills
//! the spawned process only; the caller observes it as a later connect
//! failure.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::clienv;
use crate::error::{DriverError, Result};

/// Idle timeout passed to the daemon so an autostarted instance shuts
/// itself down once no client or guest needs it.
const DAEMON_IDLE_TIMEOUT_SECS: &str = "30";

/// Fixed install locations probed after the environment override.
const DAEMON_PATHS: &[&str] = &["/usr/bin/qemud", "/usr/local/bin/qemud", "/usr/libexec/qemud"];

/// Seam between connect-retry logic and process spawning, so the retry
/// bound is testable without forking.
pub trait DaemonLauncher {
    fn launch(&self) -> Result<()>;
}

/// Locate the daemon executable: `$QEMUD_SERVER` first, then the fixed
/// install list. The candidate must be readable and executable.
pub fn find_daemon() -> Result<PathBuf> {
    if let Some(path) = clienv::daemon_override() {
        debug!(path = %path.display(), "using daemon from QEMUD_SERVER");
        return Ok(path);
    }
    for candidate in DAEMON_PATHS {
        if is_executable(Path::new(candidate)) {
            return Ok(PathBuf::from(candidate));
        }
    }
    Err(DriverError::NoDaemon)
}

fn is_executable(path: &Path) -> bool {
    let Ok(cpath) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // access(2) with X_OK|R_OK, matching the daemon contract.
    unsafe { libc::access(cpath.as_ptr(), libc::X_OK | libc::R_OK) == 0 }
}

/// Default launcher: locates the daemon and spawns it detached.
pub struct ForkLauncher;

impl DaemonLauncher for ForkLauncher {
    fn launch(&self) -> Result<()> {
        let path = find_daemon()?;
        spawn_detached(&path)
    }
}

/// Double-fork the daemon with standard streams on the null device.
///
/// Only async-signal-safe calls happen between fork and exec. The
/// intermediate child is reaped with an EINTR-safe waitpid.
pub fn spawn_detached(daemon: &Path) -> Result<()> {
    let cpath = CString::new(daemon.as_os_str().as_bytes())
        .map_err(|_| DriverError::NoDaemon)?;
    let timeout_flag = CString::new("--timeout").expect("static string");
    let timeout_val = CString::new(DAEMON_IDLE_TIMEOUT_SECS).expect("static string");
    let devnull = CString::new("/dev/null").expect("static string");

    debug!(daemon = %daemon.display(), "spawning daemon");

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    if pid == 0 {
        // Intermediate child: detach, then fork the daemon proper.
        unsafe {
            let stdin_fd = libc::open(devnull.as_ptr(), libc::O_RDONLY);
            let stdout_fd = libc::open(devnull.as_ptr(), libc::O_WRONLY);
            if stdin_fd < 0
                || stdout_fd < 0
                || libc::dup2(stdin_fd, libc::STDIN_FILENO) != libc::STDIN_FILENO
                || libc::dup2(stdout_fd, libc::STDOUT_FILENO) != libc::STDOUT_FILENO
                || libc::dup2(stdout_fd, libc::STDERR_FILENO) != libc::STDERR_FILENO
            {
                libc::_exit(1);
            }
            libc::close(stdin_fd);
            libc::close(stdout_fd);

            let open_max = libc::sysconf(libc::_SC_OPEN_MAX);
            let open_max = if open_max > 0 { open_max as i32 } else { 1024 };
            for fd in 0..open_max {
                if fd != libc::STDIN_FILENO
                    && fd != libc::STDOUT_FILENO
                    && fd != libc::STDERR_FILENO
                {
                    libc::close(fd);
                }
            }

            libc::setsid();

            if libc::fork() == 0 {
                let argv = [
                    cpath.as_ptr(),
                    timeout_flag.as_ptr(),
                    timeout_val.as_ptr(),
                    std::ptr::null(),
                ];
                libc::execv(cpath.as_ptr(), argv.as_ptr());
                // Exec failed; fatal to this process only.
                libc::_exit(1);
            }
            libc::_exit(0);
        }
    }

    // Reap the intermediate child so it never lingers as a zombie.
    let mut status = 0;
    loop {
        let reaped = unsafe { libc::waitpid(pid, &mut status, 0) };
        if reaped >= 0 {
            break;
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            warn!(error = %err, "waitpid on daemon launcher failed");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_daemon_honors_env_override() {
        // Touch only this test's variable; other tests leave it alone.
        std::env::set_var("QEMUD_SERVER", "/tmp/custom-qemud");
        let found = find_daemon().unwrap();
        std::env::remove_var("QEMUD_SERVER");
        assert_eq!(found, PathBuf::from("/tmp/custom-qemud"));
    }

    #[test]
    fn spawn_reaps_intermediate_and_tolerates_missing_daemon() {
        // Exec failure must be fatal to the spawned process only.
        spawn_detached(Path::new("/nonexistent/qemud")).unwrap();
    }
}
