use std::io::{Read, Write};

use crate::error::{Result, TransportError};

/// Read half of an open target link.
///
/// Owned by the channel's reader thread. A read returning `Ok(0)` means the
/// target closed its side; serial links additionally surface
/// `ErrorKind::TimedOut` periodically so the reader can observe shutdown.
pub struct LinkReader {
    inner: ReaderInner,
}

enum ReaderInner {
    Pipe(std::process::ChildStdout),
    #[cfg(feature = "serial")]
    Serial(Box<dyn serialport::SerialPort>),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

/// Write half of an open target link.
pub struct LinkWriter {
    inner: WriterInner,
}

enum WriterInner {
    Pipe(std::process::ChildStdin),
    #[cfg(feature = "serial")]
    Serial(Box<dyn serialport::SerialPort>),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

/// Releases the link and unblocks a reader parked in `read`.
pub struct LinkCloser {
    inner: CloserInner,
    closed: bool,
}

pub(crate) enum CloserInner {
    Pipe(crate::pipe::PipeProcess),
    #[cfg(feature = "serial")]
    Serial,
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

/// An open duplex link to a target VM.
pub struct Link {
    reader: Option<LinkReader>,
    writer: LinkWriter,
    closer: LinkCloser,
    description: String,
}

impl Read for LinkReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ReaderInner::Pipe(stdout) => stdout.read(buf),
            #[cfg(feature = "serial")]
            ReaderInner::Serial(port) => port.read(buf),
            #[cfg(unix)]
            ReaderInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for LinkWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            WriterInner::Pipe(stdin) => stdin.write(buf),
            #[cfg(feature = "serial")]
            WriterInner::Serial(port) => port.write(buf),
            #[cfg(unix)]
            WriterInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            WriterInner::Pipe(stdin) => stdin.flush(),
            #[cfg(feature = "serial")]
            WriterInner::Serial(port) => port.flush(),
            #[cfg(unix)]
            WriterInner::Unix(stream) => stream.flush(),
        }
    }
}

impl LinkReader {
    pub(crate) fn pipe(stdout: std::process::ChildStdout) -> Self {
        Self {
            inner: ReaderInner::Pipe(stdout),
        }
    }

    #[cfg(feature = "serial")]
    pub(crate) fn serial(port: Box<dyn serialport::SerialPort>) -> Self {
        Self {
            inner: ReaderInner::Serial(port),
        }
    }

    #[cfg(unix)]
    pub(crate) fn unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: ReaderInner::Unix(stream),
        }
    }
}

impl LinkWriter {
    pub(crate) fn pipe(stdin: std::process::ChildStdin) -> Self {
        Self {
            inner: WriterInner::Pipe(stdin),
        }
    }

    #[cfg(feature = "serial")]
    pub(crate) fn serial(port: Box<dyn serialport::SerialPort>) -> Self {
        Self {
            inner: WriterInner::Serial(port),
        }
    }

    #[cfg(unix)]
    pub(crate) fn unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: WriterInner::Unix(stream),
        }
    }
}

impl LinkCloser {
    pub(crate) fn new(inner: CloserInner) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    /// Close the link. Calling this more than once is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match &mut self.inner {
            CloserInner::Pipe(process) => process.kill(),
            #[cfg(feature = "serial")]
            CloserInner::Serial => Ok(()),
            #[cfg(unix)]
            CloserInner::Unix(stream) => match stream.shutdown(std::net::Shutdown::Both) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(TransportError::Io(err)),
            },
        }
    }

    /// Whether `close` has already run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Link {
    pub(crate) fn from_parts(
        reader: LinkReader,
        writer: LinkWriter,
        closer: LinkCloser,
        description: String,
    ) -> Self {
        Self {
            reader: Some(reader),
            writer,
            closer,
            description,
        }
    }

    /// Wrap an already connected unix stream, e.g. one end of
    /// `UnixStream::pair()` driven by an in-process target.
    #[cfg(unix)]
    pub fn from_unix_stream(stream: std::os::unix::net::UnixStream) -> Result<Self> {
        let reader = stream.try_clone()?;
        let closer = stream.try_clone()?;
        Ok(Self::from_parts(
            LinkReader::unix(reader),
            LinkWriter::unix(stream),
            LinkCloser::new(CloserInner::Unix(closer)),
            "unix-stream".to_string(),
        ))
    }

    /// Hand the read half to a reader thread. Succeeds once.
    pub fn take_reader(&mut self) -> Result<LinkReader> {
        self.reader.take().ok_or(TransportError::ReaderTaken)
    }

    /// Borrow the write half.
    pub fn writer(&mut self) -> &mut LinkWriter {
        &mut self.writer
    }

    /// Split into read half (if not taken yet), write half and closer.
    pub fn into_parts(self) -> (Option<LinkReader>, LinkWriter, LinkCloser) {
        (self.reader, self.writer, self.closer)
    }

    /// Human-readable description for diagnostics.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("description", &self.description)
            .field("reader_taken", &self.reader.is_none())
            .field("closed", &self.closer.closed)
            .finish()
    }
}
