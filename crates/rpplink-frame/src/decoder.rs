use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::{
    hexdump, DATA_OFFSET, FRAME_OVERHEAD, HEADER_SIZE, LENGTH_OFFSET, SEQUENCE_OFFSET, START_BYTE,
    TYPE_OFFSET,
};
use crate::crc::crc16;
use crate::message::{lookup, Message};

const INITIAL_BUFFER_CAPACITY: usize = 512;

/// Largest overlong message kept while reassembling.
pub const MAX_OVERLONG_LENGTH: usize = u16::MAX as usize;

/// Incremental RPP frame decoder.
///
/// Bytes go in as they arrive from the link; complete, checksum-valid
/// messages come out one per call. Overlong messages (frames whose data
/// section is exactly the segment size) are reassembled across frames and
/// delivered once, when a shorter segment of the same type ends them.
///
/// The buffer always starts at a start byte or is empty.
#[derive(Debug)]
pub struct Decoder {
    buf: BytesMut,
    last_sequence: Option<u8>,
    overlong: Option<Overlong>,
}

#[derive(Debug)]
struct Overlong {
    kind: u8,
    data: BytesMut,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            last_sequence: None,
            overlong: None,
        }
    }

    /// Append `bytes` and return the next complete message, if any.
    ///
    /// `segment_size` is the peer's per-frame data capacity; a frame carrying
    /// exactly that many data bytes continues an overlong message.
    ///
    /// At most one message is returned per call. Call [`Decoder::decode_next`]
    /// until it returns `None` to drain messages that are already buffered.
    pub fn feed(&mut self, bytes: &[u8], segment_size: usize) -> Option<Message> {
        self.buf.extend_from_slice(bytes);
        self.decode_next(segment_size)
    }

    /// Return the next complete message from already buffered bytes.
    pub fn decode_next(&mut self, segment_size: usize) -> Option<Message> {
        loop {
            match self.buf.iter().position(|&b| b == START_BYTE) {
                Some(0) => {}
                Some(skip) => {
                    debug!(skipped = skip, "discarding bytes before start byte");
                    self.buf.advance(skip);
                }
                None => {
                    if !self.buf.is_empty() {
                        debug!(skipped = self.buf.len(), "no start byte in buffered data");
                        self.buf.clear();
                    }
                    return None;
                }
            }

            if self.buf.len() < 2 {
                return None;
            }

            if let Some(&kind) = self.buf.get(TYPE_OFFSET) {
                if lookup(kind).is_none() {
                    warn!(
                        kind,
                        dropped = self.buf.len(),
                        "unknown message type, discarding buffer"
                    );
                    self.buf.clear();
                    return None;
                }
            }

            if self.buf.len() < FRAME_OVERHEAD {
                return None;
            }
            let data_len = self.buf[LENGTH_OFFSET] as usize;
            let total = FRAME_OVERHEAD + data_len;
            if self.buf.len() < total {
                return None;
            }

            let frame = self.buf.split_to(total).freeze();
            trace!(frame = %hexdump(&frame), "received frame");

            let expected = crc16(&frame[..HEADER_SIZE + data_len]);
            let received = u16::from_le_bytes([frame[total - 2], frame[total - 1]]);
            if expected != received {
                debug!(expected, received, "checksum mismatch, dropping frame");
                return Some(Message::Defective);
            }

            self.note_sequence(frame[SEQUENCE_OFFSET]);

            let kind = frame[TYPE_OFFSET];
            let data = frame.slice(DATA_OFFSET..DATA_OFFSET + data_len);
            let is_full = segment_size > 0 && data_len == segment_size;

            if let Some(mut overlong) = self.overlong.take() {
                if overlong.kind == kind {
                    overlong.data.extend_from_slice(&data);
                    if overlong.data.len() > MAX_OVERLONG_LENGTH {
                        warn!(
                            kind,
                            discarded = overlong.data.len(),
                            max = MAX_OVERLONG_LENGTH,
                            "overlong message too large, discarding partial data"
                        );
                        continue;
                    }
                    if is_full {
                        trace!(kind, accumulated = overlong.data.len(), "overlong segment");
                        self.overlong = Some(overlong);
                        continue;
                    }
                    debug!(kind, len = overlong.data.len(), "overlong message complete");
                    return Some(build(overlong.kind, overlong.data.freeze()));
                }
                warn!(
                    expected = overlong.kind,
                    received = kind,
                    discarded = overlong.data.len(),
                    "overlong message interrupted, discarding partial data"
                );
            }

            if is_full {
                trace!(kind, "first overlong segment");
                self.overlong = Some(Overlong {
                    kind,
                    data: BytesMut::from(&data[..]),
                });
                continue;
            }

            return Some(build(kind, data));
        }
    }

    fn note_sequence(&mut self, sequence: u8) {
        if let Some(last) = self.last_sequence {
            let expected = last.wrapping_add(1);
            if sequence != expected {
                debug!(expected, received = sequence, "sequence number gap");
            }
        }
        self.last_sequence = Some(sequence);
    }

    /// Sequence number of the last checksum-valid frame.
    pub fn last_sequence_number(&self) -> Option<u8> {
        self.last_sequence
    }

    /// Whether an overlong message is partially received.
    pub fn is_reassembling(&self) -> bool {
        self.overlong.is_some()
    }

    /// Number of buffered, not yet decoded bytes.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

}

fn build(kind: u8, data: Bytes) -> Message {
    match Message::from_wire(kind, data) {
        Ok(message) => message,
        Err(err) => {
            warn!(kind, %err, "undecodable message data");
            Message::Defective
        }
    }
}
