//! stdio transport to an MCP server child process.
//!
//! This module implements the client end of the MCP stdio transport:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - child stdin: receives messages from the probe
//! - child stdout: sends messages to the probe
//! - child stderr: inherited, so server logs reach the probe's own stderr
//!
//! # Lifecycle
//!
//! [`ServerProcess::spawn`] starts the child. [`Transport::terminate`] kills
//! and reaps it; calling it again is a no-op. If a `ServerProcess` is dropped
//! without being terminated, `Drop` sends the kill instead.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace};

use crate::error::HarnessError;

/// Line-oriented duplex channel to a server.
///
/// The probe holds exactly one transport per run and calls
/// [`terminate`](Self::terminate) once when the run ends.
pub trait Transport {
    /// Writes one message line. A trailing newline is appended and the
    /// stream is flushed.
    fn write_line(&mut self, line: &str) -> impl Future<Output = io::Result<()>>;

    /// Reads the next line without its terminator.
    ///
    /// Returns `None` once the server has closed its output (EOF).
    fn read_line(&mut self) -> impl Future<Output = io::Result<Option<String>>>;

    /// Stops the server and releases the pipes.
    fn terminate(&mut self) -> impl Future<Output = io::Result<()>>;
}

/// A spawned MCP server with piped stdin and stdout.
#[derive(Debug)]
pub struct ServerProcess {
    /// Handle to the child process.
    child: Child,
    /// Child stdin. Writes are flushed per line.
    stdin: ChildStdin,
    /// Buffered reader over child stdout.
    stdout: BufReader<ChildStdout>,
    /// Set once `terminate` has run.
    terminated: bool,
}

impl ServerProcess {
    /// Spawns `program` with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ExecutableNotFound`] if `program` does not
    /// exist, or [`HarnessError::Spawn`] if the OS cannot start it.
    pub fn spawn(program: &Path, args: &[OsString]) -> Result<Self, HarnessError> {
        if !program.exists() {
            return Err(HarnessError::ExecutableNotFound {
                path: program.to_path_buf(),
            });
        }

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                path: program.to_path_buf(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            HarnessError::Io(io::Error::other("child stdin unavailable after spawn"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            HarnessError::Io(io::Error::other("child stdout unavailable after spawn"))
        })?;

        debug!(pid = ?child.id(), program = %program.display(), "Server process started");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            terminated: false,
        })
    }

    /// Returns the OS process id, if the child is still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

impl Transport for ServerProcess {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        // stdio framing: one message per line
        debug_assert!(
            !line.contains('\n'),
            "JSON message must not contain embedded newlines"
        );
        trace!(line, "-> server");

        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;

        Ok(())
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let bytes_read = self.stdout.read_line(&mut line).await?;

        if bytes_read == 0 {
            // EOF - server closed stdout
            return Ok(None);
        }

        // Remove the trailing newline
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        trace!(line = %line, "<- server");

        Ok(Some(line))
    }

    async fn terminate(&mut self) -> io::Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;

        match self.child.try_wait()? {
            Some(status) => {
                debug!(%status, "Server process had already exited");
                Ok(())
            }
            None => {
                self.child.start_kill()?;
                let status = self.child.wait().await?;
                debug!(%status, "Server process terminated");
                Ok(())
            }
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if !self.terminated {
            // Best effort; kill_on_drop covers the rest.
            let _ = self.child.start_kill();
        }
    }
}
