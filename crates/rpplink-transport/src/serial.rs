use std::time::Duration;

#[cfg(feature = "serial")]
use tracing::info;

use crate::error::TransportError;
#[cfg(feature = "serial")]
use crate::error::Result;
#[cfg(feature = "serial")]
use crate::stream::{CloserInner, Link, LinkCloser, LinkReader, LinkWriter};

/// Baud rate PyMite targets use for RPP over a UART.
pub const DEFAULT_BAUD_RATE: u32 = 19_200;

/// Read timeout that bounds how long a reader stays parked in `read`.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial port link configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Baud rate. Default: 19200.
    pub baud_rate: u32,
    /// Per-read timeout. Reads that time out surface `ErrorKind::TimedOut`.
    pub read_timeout: Duration,
}

impl SerialConfig {
    /// Configuration for `port` with default baud rate and timeout.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Serial port transport (8N1, no flow control).
#[cfg(feature = "serial")]
pub struct SerialTransport;

#[cfg(feature = "serial")]
impl SerialTransport {
    /// List serial devices visible to the host.
    pub fn list_ports() -> Result<Vec<String>> {
        let ports = serialport::available_ports().map_err(|err| TransportError::Open {
            port: "*".to_string(),
            reason: err.to_string(),
        })?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    /// Open the device described by `config`.
    pub fn open(config: &SerialConfig) -> Result<Link> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(|err| TransportError::Open {
                port: config.port.clone(),
                reason: err.to_string(),
            })?;
        let reader = port.try_clone().map_err(|err| TransportError::Open {
            port: config.port.clone(),
            reason: err.to_string(),
        })?;

        info!(port = %config.port, baud = config.baud_rate, "serial port opened");

        Ok(Link::from_parts(
            LinkReader::serial(reader),
            LinkWriter::serial(port),
            LinkCloser::new(CloserInner::Serial),
            format!("serial:{}@{}", config.port, config.baud_rate),
        ))
    }
}

#[cfg(not(feature = "serial"))]
pub(crate) fn unsupported(config: &SerialConfig) -> TransportError {
    TransportError::Unsupported(format!(
        "serial port {} requested but rpplink was built without the `serial` feature",
        config.port
    ))
}
