//! Server process spawning and control.
//!
//! This module provides a builder for configuring the `etrade server`
//! command, along with a thin wrapper over the running child process
//! that supports cooperative shutdown via SIGINT.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Error type for process launch operations.
#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    /// The server binary was not found.
    #[error("server binary not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("permission denied launching {0}")]
    PermissionDenied(String),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LaunchError {
    /// Classify an I/O error from a failed spawn.
    fn from_io(binary: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(binary.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(binary.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Builder for configuring the server command line.
#[derive(Debug, Clone)]
pub struct ServerCommand {
    binary: String,
    addr: String,
    working_dir: Option<PathBuf>,
}

impl ServerCommand {
    /// Create a command for the given binary listening on the given address.
    #[must_use]
    pub fn new(binary: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            addr: addr.into(),
            working_dir: None,
        }
    }

    /// Set the working directory for the server process.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Get the binary name.
    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Build the command-line arguments.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        vec![
            "server".to_string(),
            "--addr".to_string(),
            self.addr.clone(),
        ]
    }
}

impl Default for ServerCommand {
    fn default() -> Self {
        Self::new("etrade", ":8888")
    }
}

/// A running server process with piped output streams.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
}

impl ServerProcess {
    /// Spawn the server with the given command configuration.
    ///
    /// Both stdout and stderr are captured via pipes so the supervisor
    /// can relay the combined output.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError` if the process fails to spawn.
    pub fn spawn(command: &ServerCommand) -> Result<Self, LaunchError> {
        let args = command.build_args();

        let mut cmd = Command::new(command.binary());
        cmd.args(&args).stdout(Stdio::piped()).stderr(Stdio::piped());

        if let Some(ref dir) = command.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| LaunchError::from_io(command.binary(), e))?;

        Ok(Self { child })
    }

    /// Spawn an arbitrary binary with explicit arguments (for testing).
    ///
    /// # Errors
    ///
    /// Returns `LaunchError` if the process fails to spawn.
    pub fn spawn_raw(binary: &str, args: &[&str]) -> Result<Self, LaunchError> {
        let child = Command::new(binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LaunchError::from_io(binary, e))?;
        Ok(Self { child })
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Forcefully kill the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Send an interrupt signal asking the server to shut itself down.
    ///
    /// The server's contract is to exit zero on SIGINT. On non-Unix
    /// platforms there is no interrupt equivalent, so this is a no-op
    /// and `graceful_shutdown` falls back to kill.
    #[cfg(unix)]
    pub fn interrupt(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.id() {
            let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
            let _ = kill(nix_pid, Signal::SIGINT);
        }
    }

    #[cfg(not(unix))]
    pub fn interrupt(&self) {}

    /// Attempt graceful shutdown with a timeout.
    ///
    /// On Unix, sends SIGINT first, then SIGKILL after the timeout.
    /// On other platforms, falls back to immediate kill.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting for the process fails or the
    /// escalated kill cannot be delivered.
    pub async fn graceful_shutdown(&mut self, timeout: Duration) -> std::io::Result<ExitStatus> {
        #[cfg(unix)]
        {
            self.graceful_shutdown_unix(timeout).await
        }

        #[cfg(not(unix))]
        {
            let _ = timeout;
            self.kill().await?;
            self.wait().await
        }
    }

    #[cfg(unix)]
    async fn graceful_shutdown_unix(&mut self, timeout: Duration) -> std::io::Result<ExitStatus> {
        if self.id().is_none() {
            // Process already exited; reap it.
            return self.child.wait().await;
        }

        self.interrupt();

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                // Timeout elapsed, escalate to SIGKILL.
                tracing::warn!("server did not exit after SIGINT, killing");
                self.child.kill().await?;
                self.child.wait().await
            }
        }
    }
}
