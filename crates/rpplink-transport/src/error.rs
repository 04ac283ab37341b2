use std::path::PathBuf;

/// Errors that can occur while opening or driving a target link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to spawn the target VM as a child process.
    #[error("failed to spawn target {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// A spawned child did not expose the expected piped stdio handle.
    #[error("target {program} has no piped {stream}")]
    MissingPipe {
        program: PathBuf,
        stream: &'static str,
    },

    /// Failed to open a serial device.
    #[error("failed to open serial port {port}: {reason}")]
    Open { port: String, reason: String },

    /// Failed to connect to a unix socket exposed by a target.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation is not available on this platform.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The read half was already handed out.
    #[error("link reader already taken")]
    ReaderTaken,
}

pub type Result<T> = std::result::Result<T, TransportError>;
