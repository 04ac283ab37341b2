use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use rpplink_session::{Channel, Session, SessionConfig};
use rpplink_transport::{LinkConfig, SerialConfig, DEFAULT_BAUD_RATE, DEFAULT_PIPE_TARGET};

use crate::exit::{session_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod autorun;
pub mod dump;
pub mod load;
pub mod mem;
pub mod monitor;
pub mod start;
pub mod sync;
pub mod threads;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synchronize with a target and print its link parameters.
    Sync(SyncArgs),
    /// List the target's running threads.
    Threads(ThreadsArgs),
    /// List the target's memory spaces.
    Mem(MemArgs),
    /// Show or replace the modules the target starts on boot.
    Autorun(AutorunArgs),
    /// Start a thread running a loaded module.
    Start(StartArgs),
    /// Load a precompiled module image into the target.
    Load(LoadArgs),
    /// Print target output until interrupted.
    Monitor(MonitorArgs),
    /// Decode and print a module image (offline).
    Dump(DumpArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Sync(args) => sync::run(args, format),
        Command::Threads(args) => threads::run(args, format),
        Command::Mem(args) => mem::run(args, format),
        Command::Autorun(args) => autorun::run(args, format),
        Command::Start(args) => start::run(args, format),
        Command::Load(args) => load::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Dump(args) => dump::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// How to reach the target and how patiently to talk to it.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Target VM executable to spawn, talking RPP over its stdin/stdout.
    #[arg(long, value_name = "EXE", env = "RPPLINK_TARGET")]
    pub pipe: Option<PathBuf>,
    /// Serial device the target is attached to (takes precedence over --pipe).
    #[arg(long, value_name = "PORT")]
    pub serial: Option<String>,
    /// Serial baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Unix socket a target listens on (takes precedence over --serial).
    #[arg(long, value_name = "PATH")]
    pub socket: Option<PathBuf>,
    /// Time to wait for each answer (e.g. 3s, 500ms).
    #[arg(long, default_value = "3s")]
    pub timeout: String,
    /// Transmissions per operation before giving up.
    #[arg(long, default_value_t = 3)]
    pub retries: u32,
}

impl TargetArgs {
    pub fn link_config(&self) -> CliResult<LinkConfig> {
        if let Some(path) = &self.socket {
            return unix_link(path);
        }
        if let Some(port) = &self.serial {
            let mut serial = SerialConfig::new(port.clone());
            serial.baud_rate = self.baud;
            return Ok(LinkConfig::Serial(serial));
        }
        let program = self
            .pipe
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PIPE_TARGET));
        Ok(LinkConfig::pipe(program))
    }

    pub fn session_config(&self) -> CliResult<SessionConfig> {
        if self.retries == 0 {
            return Err(CliError::new(USAGE, "retries must be greater than zero"));
        }
        Ok(SessionConfig {
            timeout: parse_duration(&self.timeout)?,
            comm_retries: self.retries,
            ..SessionConfig::default()
        })
    }

    /// Open the link and attach a session to it.
    pub fn open(&self) -> CliResult<Session> {
        let config = self.session_config()?;
        let link = self.link_config()?;
        tracing::debug!(%link, ?config, "opening session");
        Session::open(Channel::new(link), config).map_err(|err| session_error("connect failed", err))
    }
}

#[cfg(unix)]
fn unix_link(path: &std::path::Path) -> CliResult<LinkConfig> {
    Ok(LinkConfig::Unix {
        path: path.to_path_buf(),
    })
}

#[cfg(not(unix))]
fn unix_link(_path: &std::path::Path) -> CliResult<LinkConfig> {
    Err(CliError::new(
        USAGE,
        "--socket is only available on unix platforms",
    ))
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Debug)]
pub struct ThreadsArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Debug)]
pub struct MemArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Debug)]
pub struct AutorunArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Replace the list with these modules (comma-separated).
    #[arg(long, value_delimiter = ',', conflicts_with = "clear")]
    pub set: Option<Vec<String>>,
    /// Empty the list.
    #[arg(long)]
    pub clear: bool,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Name of a module already loaded on the target.
    pub module: String,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Module name the target will know the image by.
    pub name: String,
    /// Precompiled module image (.pmm).
    pub image: PathBuf,
    /// Start a thread running the module once loaded.
    #[arg(long)]
    pub start: bool,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    /// Exit after printing N lines.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Module image (.pmm) to decode.
    pub image: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
