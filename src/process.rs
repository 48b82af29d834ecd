//! External process execution and free port allocation.

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::process::Command;
use tracing::debug;

/// Byte stream produced by a running process.
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Resolves once a streaming process has exited. Its `stdout` is always
/// empty; `stderr` holds whatever was not handed out as a stream.
pub type ExitFuture = Pin<Box<dyn Future<Output = std::io::Result<CommandOutput>> + Send>>;

/// A running process: its output pipes and a handle on its exit.
pub struct StreamingProcess {
    pub streams: Vec<OutputStream>,
    pub exit: ExitFuture,
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into [`GatewayError::CommandFailed`].
    pub fn into_result(self, command: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(GatewayError::CommandFailed {
                command: command.to_string(),
                code: self.code,
                stderr: self.stderr,
            })
        }
    }
}

/// Runs external commands on behalf of the container manager.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, capturing stdout and stderr.
    async fn output(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;

    /// Start a process and hand back its stdout, plus stderr when asked.
    fn spawn_streams(
        &self,
        program: &str,
        args: &[String],
        include_stderr: bool,
    ) -> std::io::Result<StreamingProcess>;
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        debug!("Running: {}", command_line(program, args));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn_streams(
        &self,
        program: &str,
        args: &[String],
        include_stderr: bool,
    ) -> std::io::Result<StreamingProcess> {
        debug!("Streaming: {}", command_line(program, args));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut streams: Vec<OutputStream> = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            streams.push(Box::new(stdout));
        }
        // Unstreamed stderr is still drained, so a failure can be reported.
        let mut captured = None;
        if let Some(stderr) = child.stderr.take() {
            if include_stderr {
                streams.push(Box::new(stderr));
            } else {
                captured = Some(stderr);
            }
        }

        let exit = Box::pin(async move {
            let mut stderr = Vec::new();
            if let Some(mut pipe) = captured {
                pipe.read_to_end(&mut stderr).await?;
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>(CommandOutput {
                code: status.code(),
                stdout: String::new(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            })
        });

        Ok(StreamingProcess { streams, exit })
    }
}

/// Render a command for logs and error messages.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ask the OS for a currently free TCP port.
///
/// The bound socket is closed before returning, so another process may
/// still take the port before it is used.
pub async fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}
