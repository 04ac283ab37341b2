use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, hexdump, FRAME_OVERHEAD, MAX_DATA_LENGTH};
use crate::error::{FrameError, Result};
use crate::message::Message;

/// Writes complete frames to any `Write` stream, numbering them.
///
/// Sequence numbers start at 1 and wrap modulo 256.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    last_sequence: u8,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(FRAME_OVERHEAD + MAX_DATA_LENGTH),
            last_sequence: 0,
        }
    }

    /// Frame and write `message` under the next sequence number (blocking).
    ///
    /// Returns the sequence number used.
    pub fn send(&mut self, message: &Message) -> Result<u8> {
        let kind = message.wire_id()?;
        let data = message.to_bytes()?;
        let sequence = self.last_sequence.wrapping_add(1);
        self.write_raw(sequence, kind, &data)?;
        self.last_sequence = sequence;
        Ok(sequence)
    }

    fn write_raw(&mut self, sequence: u8, kind: u8, data: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(sequence, kind, data, &mut self.buf)?;
        trace!(frame = %hexdump(&self.buf), "sending frame");

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Sequence number of the last frame written by [`FrameWriter::send`].
    pub fn last_sequence(&self) -> u8 {
        self.last_sequence
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
