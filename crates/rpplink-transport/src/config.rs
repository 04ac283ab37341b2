use std::path::PathBuf;

use crate::error::Result;
use crate::pipe::PipeTransport;
use crate::serial::SerialConfig;
use crate::stream::Link;

/// Default target executable: the desktop RPM sample build.
pub const DEFAULT_PIPE_TARGET: &str = "sample/rpm-desktop/main.out";

/// Which transport to open for a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkConfig {
    /// Spawn the target VM and talk over its stdin/stdout.
    Pipe { program: PathBuf, args: Vec<String> },
    /// Talk to a target attached to a serial port.
    Serial(SerialConfig),
    /// Connect to a target listening on a unix socket.
    #[cfg(unix)]
    Unix { path: PathBuf },
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::Pipe {
            program: PathBuf::from(DEFAULT_PIPE_TARGET),
            args: Vec::new(),
        }
    }
}

impl LinkConfig {
    /// Pipe transport for `program` without extra arguments.
    pub fn pipe(program: impl Into<PathBuf>) -> Self {
        Self::Pipe {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Pipe { .. } => "pipe",
            Self::Serial(_) => "serial",
            #[cfg(unix)]
            Self::Unix { .. } => "unix-socket",
        }
    }

    /// Open the configured transport.
    pub fn open(&self) -> Result<Link> {
        match self {
            Self::Pipe { program, args } => PipeTransport::spawn(program, args),
            #[cfg(feature = "serial")]
            Self::Serial(config) => crate::serial::SerialTransport::open(config),
            #[cfg(not(feature = "serial"))]
            Self::Serial(config) => Err(crate::serial::unsupported(config)),
            #[cfg(unix)]
            Self::Unix { path } => crate::uds::UnixSocketTransport::connect(path),
        }
    }
}

impl std::fmt::Display for LinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pipe { program, .. } => write!(f, "pipe:{}", program.display()),
            Self::Serial(config) => write!(f, "serial:{}@{}", config.port, config.baud_rate),
            #[cfg(unix)]
            Self::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}
