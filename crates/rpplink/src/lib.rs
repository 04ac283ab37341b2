//! Host-side stack for the Remote PyMite Protocol (RPP).
//!
//! rpplink talks to a PyMite virtual machine running on a microcontroller
//! or as a desktop process: it frames messages with CRC16 protection,
//! reassembles overlong messages, runs the sync handshake and exposes the
//! target's thread list, memory spaces, autorun list and module loading as
//! blocking calls.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream links (child-process pipe, serial port, unix socket)
//! - [`marshal`]: the type-tagged binary codec for module images
//! - [`frame`]: RPP frames, the stream decoder and the message types
//! - [`session`]: the channel reader thread and the synchronous session

/// Re-export transport types.
pub mod transport {
    pub use rpplink_transport::*;
}

/// Re-export marshal codec types.
pub mod marshal {
    pub use rpplink_marshal::*;
}

/// Re-export frame and message types.
pub mod frame {
    pub use rpplink_frame::*;
}

/// Re-export channel and session types.
pub mod session {
    pub use rpplink_session::*;
}
