use std::fmt::Write as _;

use bytes::{BufMut, BytesMut};

use crate::crc::crc16;
use crate::error::{FrameError, Result};

/// First byte of every frame.
pub const START_BYTE: u8 = 0xFF;

/// Start byte, sequence number, type and data length.
pub const HEADER_SIZE: usize = 4;

/// Header plus the trailing two-byte checksum.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + 2;

/// Largest data section the one-byte length field can describe.
pub const MAX_DATA_LENGTH: usize = u8::MAX as usize;

/// Receive buffer size assumed for a target that has not synced yet.
pub const DEFAULT_RECEIVE_BUFFER_SIZE: u8 = 50;

/// Data capacity of one outgoing frame at the default receive buffer size.
pub const DEFAULT_SEGMENT_SIZE: usize = DEFAULT_RECEIVE_BUFFER_SIZE as usize - FRAME_OVERHEAD;

/// Data length of a full incoming segment before the target has synced.
///
/// A target flushes its send buffer whenever it holds a whole receive
/// buffer's worth of data, so incoming segments are full at the advertised
/// size itself, not at the outgoing data capacity.
pub const DEFAULT_INCOMING_SEGMENT_SIZE: usize = DEFAULT_RECEIVE_BUFFER_SIZE as usize;

pub(crate) const SEQUENCE_OFFSET: usize = 1;
pub(crate) const TYPE_OFFSET: usize = 2;
pub(crate) const LENGTH_OFFSET: usize = 3;
pub(crate) const DATA_OFFSET: usize = HEADER_SIZE;

/// Data capacity of one outgoing frame for a peer with the given receive
/// buffer.
///
/// Returns `None` when the buffer cannot hold a frame with any data.
pub fn segment_size_for(receive_buffer_size: u8) -> Option<usize> {
    let size = (receive_buffer_size as usize).checked_sub(FRAME_OVERHEAD)?;
    (size > 0).then_some(size)
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────┬──────┬──────┬──────┬──────────────┬────────────┐
/// │ 0xFF  │ Seq  │ Type │ Len  │ Data         │ CRC16      │
/// │ (1B)  │ (1B) │ (1B) │ (1B) │ (Len bytes)  │ (2B LE)    │
/// └───────┴──────┴──────┴──────┴──────────────┴────────────┘
/// ```
/// The checksum covers the start byte through the last data byte.
pub fn encode_frame(sequence: u8, kind: u8, data: &[u8], dst: &mut BytesMut) -> Result<()> {
    if data.len() > MAX_DATA_LENGTH {
        return Err(FrameError::DataTooLong {
            size: data.len(),
            max: MAX_DATA_LENGTH,
        });
    }
    let start = dst.len();
    dst.reserve(FRAME_OVERHEAD + data.len());
    dst.put_u8(START_BYTE);
    dst.put_u8(sequence);
    dst.put_u8(kind);
    dst.put_u8(data.len() as u8);
    dst.put_slice(data);
    let checksum = crc16(&dst[start..]);
    dst.put_u16_le(checksum);
    Ok(())
}

/// Space-separated hex bytes for log output.
pub fn hexdump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02X}");
    }
    out
}
