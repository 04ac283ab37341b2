//! RPP framing and message types.
//!
//! Every message travels in one or more frames:
//! - a start byte (0xFF) for stream synchronization
//! - a sequence number, a message type and a one-byte data length
//! - the data section
//! - a little-endian CRC16 over everything before it
//!
//! A frame whose data length equals the sender's receive buffer size is one
//! segment of an overlong message; [`Decoder`] reassembles those transparently. Corrupt
//! frames surface as [`Message::Defective`] rather than as errors.

pub mod codec;
pub mod crc;
pub mod decoder;
pub mod error;
pub mod message;
pub mod writer;

pub use codec::{
    encode_frame, hexdump, segment_size_for, DEFAULT_INCOMING_SEGMENT_SIZE,
    DEFAULT_RECEIVE_BUFFER_SIZE, DEFAULT_SEGMENT_SIZE, FRAME_OVERHEAD, HEADER_SIZE,
    MAX_DATA_LENGTH, START_BYTE,
};
pub use crc::crc16;
pub use decoder::{Decoder, MAX_OVERLONG_LENGTH};
pub use error::{FrameError, MessageError, Result};
pub use message::{
    lookup, AutorunList, MemAddBlock, MemList, MemSpace, Message, MessageKind, MessageType,
    SyncParameters, ThreadList, ThreadPrint, ThreadStart, MODULE_MEMSPACE, REGISTRY,
    SYNC_DATA_LENGTH, SYNC_ID_LENGTH,
};
pub use writer::FrameWriter;
