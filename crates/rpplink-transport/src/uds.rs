use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::Link;

/// Unix domain socket transport, for targets (or simulators) that expose RPP
/// on a socket instead of their stdio.
pub struct UnixSocketTransport;

impl UnixSocketTransport {
    /// Connect to a listening target socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<Link> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "connected to target socket");
        Link::from_unix_stream(stream)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixListener;

    use super::*;

    #[test]
    fn connect_to_listening_socket() {
        let dir = std::env::temp_dir().join(format!("rpplink-uds-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("target.sock");
        let _ = std::fs::remove_file(&sock_path);
        let listener = UnixListener::bind(&sock_path).unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 3];
            stream.read_exact(&mut buf).unwrap();
            buf
        });

        let mut link = UnixSocketTransport::connect(&sock_path).unwrap();
        link.writer().write_all(b"rpp").unwrap();

        assert_eq!(&server.join().unwrap(), b"rpp");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn connect_missing_socket_fails() {
        let result = UnixSocketTransport::connect("/tmp/rpplink-missing-target.sock");
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
