//! Byte-stream transports to a PyMite target.
//!
//! Provides a unified duplex link over the ways a host reaches a target VM:
//! - a child process speaking RPP on its stdin/stdout
//! - a serial port (behind the `serial` feature)
//! - a unix domain socket (Linux/macOS)
//!
//! This is the lowest layer of rpplink. A [`Link`] splits into a
//! [`LinkReader`] for the channel's reader thread, a [`LinkWriter`] for
//! outgoing frames, and a [`LinkCloser`] that unblocks the reader on quit.

pub mod config;
pub mod error;
pub mod pipe;
pub mod serial;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use config::{LinkConfig, DEFAULT_PIPE_TARGET};
pub use error::{Result, TransportError};
pub use pipe::PipeTransport;
pub use serial::{SerialConfig, DEFAULT_BAUD_RATE};
#[cfg(feature = "serial")]
pub use serial::SerialTransport;
pub use stream::{Link, LinkCloser, LinkReader, LinkWriter};

#[cfg(unix)]
pub use uds::UnixSocketTransport;
