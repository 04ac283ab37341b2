/// Errors that can occur while talking to a target.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] rpplink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] rpplink_frame::FrameError),

    /// A message could not be built or interpreted.
    #[error("message error: {0}")]
    Message(#[from] rpplink_frame::MessageError),

    /// A module image could not be decoded.
    #[error("marshal error: {0}")]
    Marshal(#[from] rpplink_marshal::MarshalError),

    /// The target did not answer within the retry budget.
    #[error("{operation} timed out after {attempts} attempts{}", last_message_suffix(.last_message))]
    Timeout {
        operation: &'static str,
        attempts: u32,
        last_message: Option<String>,
    },

    /// The link closed or failed while the channel was running.
    #[error("channel broken: {0}")]
    ChannelBroken(String),

    /// The channel has not been connected, or has already quit.
    #[error("channel not connected")]
    NotConnected,

    /// A module image could not be produced.
    #[error("module image error: {0}")]
    Image(String),
}

fn last_message_suffix(last_message: &Option<String>) -> String {
    match last_message {
        Some(message) => format!(" (last message {message})"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
