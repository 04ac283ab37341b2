/// Errors that can occur while marshaling or unmarshaling values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MarshalError {
    /// The input holds a tag byte the format does not define.
    #[error("unknown marshal tag 0x{tag:02X} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    /// The input ended before the value it started was complete.
    #[error("truncated input: need {needed} more bytes at offset {offset}")]
    Truncated { needed: usize, offset: usize },

    /// A length or count does not fit its wire field.
    #[error("{what} out of range ({value}, max {max})")]
    OutOfRange {
        what: &'static str,
        value: usize,
        max: usize,
    },

    /// Containers nest deeper than the decoder allows.
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),

    /// A code object field held a value of the wrong kind.
    #[error("invalid code object: {0}")]
    InvalidCodeObject(&'static str),

    /// A complete value was decoded but input bytes remain.
    #[error("trailing bytes after value ({consumed} of {total} consumed)")]
    TrailingBytes { consumed: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, MarshalError>;
