use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::stream::{CloserInner, Link, LinkCloser, LinkReader, LinkWriter};

/// Child-process transport: the target VM runs as a subprocess and speaks
/// RPP on its stdin/stdout. Its stderr is inherited so target diagnostics
/// reach the host terminal.
pub struct PipeTransport;

impl PipeTransport {
    /// Spawn `program` with `args` and attach to its stdio.
    pub fn spawn(program: impl AsRef<Path>, args: &[String]) -> Result<Link> {
        let program = program.as_ref().to_path_buf();
        let mut child = Command::new(&program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| TransportError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| TransportError::MissingPipe {
            program: program.clone(),
            stream: "stdin",
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::MissingPipe {
                program: program.clone(),
                stream: "stdout",
            })?;

        info!(?program, pid = child.id(), "spawned target process");

        let description = format!("pipe:{} (pid {})", program.display(), child.id());
        Ok(Link::from_parts(
            LinkReader::pipe(stdout),
            LinkWriter::pipe(stdin),
            LinkCloser::new(CloserInner::Pipe(PipeProcess { child, program })),
            description,
        ))
    }
}

/// Handle to the spawned target, killed when the link closes.
pub(crate) struct PipeProcess {
    child: Child,
    program: PathBuf,
}

impl PipeProcess {
    pub(crate) fn kill(&mut self) -> Result<()> {
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!(program = ?self.program, %status, "target already exited");
            return Ok(());
        }

        match self.child.kill() {
            Ok(()) => {}
            // Exited between the check above and the signal.
            Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(err) => return Err(TransportError::Io(err)),
        }

        match self.child.wait() {
            Ok(status) => debug!(program = ?self.program, %status, "target process reaped"),
            Err(err) => warn!(program = ?self.program, %err, "failed to reap target process"),
        }
        Ok(())
    }
}
