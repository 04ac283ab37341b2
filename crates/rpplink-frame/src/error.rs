/// Errors that can occur while writing frames to a link.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A message's data section does not fit the one-byte length field.
    #[error("frame data too long ({size} bytes, max {max})")]
    DataTooLong { size: usize, max: usize },

    /// The message could not be turned into a data section.
    #[error(transparent)]
    Message(#[from] MessageError),

    /// An I/O error occurred while writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer stopped accepting bytes mid-frame.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

/// Errors raised while mapping data sections to typed messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// The data section does not match the message's layout.
    #[error("malformed {kind} message: {reason}")]
    Malformed { kind: &'static str, reason: String },

    /// Sentinel messages never go on the wire.
    #[error("{0} message cannot be encoded")]
    NotEncodable(&'static str),

    /// A message payload exceeds what its layout can describe.
    #[error("{kind} payload too long ({size} bytes, max {max})")]
    TooLong {
        kind: &'static str,
        size: usize,
        max: usize,
    },

    /// The type byte is not in the registry.
    #[error("unknown message type {0}")]
    UnknownType(u8),
}

impl MessageError {
    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
