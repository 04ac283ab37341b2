//! Talking to a PyMite target over RPP.
//!
//! [`Channel`] owns the link: it frames outgoing messages and runs a reader
//! thread that decodes incoming frames and dispatches each message to the
//! registered [`MessageHandler`]s. [`Session`] sits on top and turns the
//! asynchronous exchange into blocking calls with a sync handshake,
//! acknowledgment tracking, retries and timeouts.
//!
//! ```no_run
//! use rpplink_session::{Channel, Session, SessionConfig};
//! use rpplink_transport::LinkConfig;
//!
//! # fn main() -> rpplink_session::Result<()> {
//! let channel = Channel::new(LinkConfig::pipe("./pymite-desktop"));
//! let mut session = Session::open(channel, SessionConfig::default())?;
//! session.synchronize()?;
//! for thread in session.read_thread_list()? {
//!     println!("thread {thread:#X}");
//! }
//! session.terminate()?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod error;
pub mod image;
pub mod session;

pub use channel::{Channel, MessageHandler, MessageSender, READER_THREAD_NAME};
pub use error::{Result, SessionError};
pub use image::{ImageBuilder, PrecompiledImage};
pub use session::{OutputLine, Session, SessionConfig, SyncState};
