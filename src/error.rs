use thiserror::Error;

/// Errors surfaced by the driver and the protocol layer.
///
/// Protocol- and I/O-level failures are always reported to the immediate
/// caller; nothing is swallowed or silently retried. A broken connection is
/// not reopened behind the caller's back.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("invalid connection URI: {0}")]
    InvalidUri(String),

    #[error("no backend registered for {0}")]
    NoBackend(String),

    #[error("unable to connect to daemon at {path}")]
    ConnectFailed { path: String },

    #[error("daemon executable not found")]
    NoDaemon,

    #[error("i/o error during exchange")]
    Io(#[from] std::io::Error),

    #[error("daemon closed the connection")]
    ConnectionClosed,

    #[error("malformed packet header: declared body of {declared} bytes (max {max})")]
    MalformedHeader { declared: u32, max: u32 },

    #[error("unexpected reply type {got} to request type {expected}")]
    UnexpectedReply { expected: u32, got: u32 },

    /// Explicit failure reply from the daemon, code and message as sent.
    #[error("daemon error {code}: {message}")]
    Daemon { code: u32, message: String },

    #[error("invalid reply: {0}")]
    InvalidReply(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("configuration document of {len} bytes exceeds maximum of {max}")]
    TooLarge { len: usize, max: usize },

    #[error("{0} is not supported by this driver")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, DriverError>;
