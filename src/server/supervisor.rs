//! Supervisor for a single server process.
//!
//! Owns the child process handle together with the reader tasks that
//! relay its combined stdout/stderr into an output queue. The process
//! and its readers are created and destroyed together.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::server::{LaunchError, ServerCommand, ServerProcess};

/// Default timeout for graceful server shutdown before escalating.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for supervisor operations.
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    /// `start` was called while a server is already running.
    #[error("server is already running")]
    AlreadyRunning,
    /// The server process failed to launch.
    #[error(transparent)]
    Launch(#[from] LaunchError),
    /// Stopping the server failed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

/// Error type for shutdown failures.
///
/// These are surfaced to the caller but never prevent the supervisor
/// from releasing the process handle and reader tasks.
#[derive(thiserror::Error, Debug)]
pub enum ShutdownError {
    /// Waiting for the process to exit failed.
    #[error("failed waiting for server exit: {0}")]
    Wait(#[from] std::io::Error),
    /// An output reader task panicked before draining its stream.
    #[error("output reader task failed")]
    ReaderFailed,
}

/// Supervisor managing exactly one server process.
#[derive(Debug)]
pub struct ServerSupervisor {
    command: ServerCommand,
    shutdown_timeout: Duration,
    process: Option<ServerProcess>,
    readers: Vec<JoinHandle<()>>,
    output_rx: Option<UnboundedReceiver<String>>,
}

impl ServerSupervisor {
    /// Create a supervisor for the given server command.
    #[must_use]
    pub fn new(command: ServerCommand) -> Self {
        Self {
            command,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            process: None,
            readers: Vec::new(),
            output_rx: None,
        }
    }

    /// Override the graceful-shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Launch the configured server command and begin capturing output.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::AlreadyRunning` if a server is already
    /// attached, or `SupervisorError::Launch` if the spawn fails.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        if self.process.is_some() {
            return Err(SupervisorError::AlreadyRunning);
        }
        let process = ServerProcess::spawn(&self.command)?;
        self.attach(process)
    }

    /// Attach an already-spawned process and begin capturing output.
    ///
    /// Used directly by tests to supervise arbitrary commands.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::AlreadyRunning` if a server is already
    /// attached.
    pub fn attach(&mut self, mut process: ServerProcess) -> Result<(), SupervisorError> {
        if self.process.is_some() {
            return Err(SupervisorError::AlreadyRunning);
        }

        tracing::info!(pid = ?process.id(), "server started");

        // One reader per captured stream, both feeding the same queue.
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = process.take_stdout() {
            self.readers.push(spawn_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = process.take_stderr() {
            self.readers.push(spawn_reader(stderr, tx));
        }

        self.output_rx = Some(rx);
        self.process = Some(process);
        Ok(())
    }

    /// Check whether the server process exists and has not exited.
    ///
    /// Non-blocking and advisory only: the process may exit between
    /// this check and any subsequent call.
    pub fn is_running(&mut self) -> bool {
        self.process
            .as_mut()
            .is_some_and(|p| matches!(p.try_wait(), Ok(None)))
    }

    /// Stop the server if it is running.
    ///
    /// Sends SIGINT, waits for the process to exit (escalating to
    /// SIGKILL after the shutdown timeout), then waits for the reader
    /// tasks to finish draining. No-op when no server is attached, so
    /// calling twice is safe.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownError` if waiting fails; the process handle and
    /// reader tasks are released regardless.
    pub async fn stop(&mut self) -> Result<Option<ExitStatus>, ShutdownError> {
        let Some(mut process) = self.process.take() else {
            return Ok(None);
        };
        let readers = std::mem::take(&mut self.readers);

        let wait_result = process.graceful_shutdown(self.shutdown_timeout).await;

        // Readers end on their own once the pipes hit EOF.
        let mut reader_failed = false;
        for handle in readers {
            if handle.await.is_err() {
                reader_failed = true;
            }
        }

        match wait_result {
            Ok(status) => {
                tracing::info!(?status, "server stopped");
                if reader_failed {
                    return Err(ShutdownError::ReaderFailed);
                }
                Ok(Some(status))
            }
            Err(e) => Err(ShutdownError::Wait(e)),
        }
    }

    /// Drain the lines currently buffered from the server's output.
    ///
    /// Returns only what is available at call time and never blocks;
    /// each line is delivered exactly once, in production order.
    pub fn drain_output(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(rx) = self.output_rx.as_mut() {
            while let Ok(line) = rx.try_recv() {
                lines.push(line);
            }
        }
        lines
    }
}

/// Spawn a task reading lines from a stream until EOF, pushing each
/// onto the output queue.
fn spawn_reader<R>(stream: R, tx: UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            // Receiver dropped means nobody wants the output anymore.
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> ServerSupervisor {
        ServerSupervisor::new(ServerCommand::default())
            .with_shutdown_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let mut sup = supervisor();
        assert!(!sup.is_running());
        let status = sup.stop().await.unwrap();
        assert!(status.is_none());
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let mut sup = supervisor();
        let process = ServerProcess::spawn_raw("sleep", &["5"]).unwrap();
        sup.attach(process).unwrap();

        let second = ServerProcess::spawn_raw("sleep", &["5"]).unwrap();
        let result = sup.attach(second);
        assert!(matches!(result, Err(SupervisorError::AlreadyRunning)));

        sup.stop().await.unwrap();
    }

    #[tokio::test]
    async fn is_running_tracks_process_lifetime() {
        let mut sup = supervisor();
        let process = ServerProcess::spawn_raw("sleep", &["5"]).unwrap();
        sup.attach(process).unwrap();
        assert!(sup.is_running());

        sup.stop().await.unwrap();
        assert!(!sup.is_running());
    }

    #[tokio::test]
    async fn output_is_drained_in_order_without_duplicates() {
        let mut sup = supervisor();
        let process =
            ServerProcess::spawn_raw("sh", &["-c", "echo one; echo two; echo three"]).unwrap();
        sup.attach(process).unwrap();
        sup.stop().await.unwrap();

        let lines = sup.drain_output();
        assert_eq!(lines, vec!["one", "two", "three"]);

        // A second drain returns nothing new.
        assert!(sup.drain_output().is_empty());
    }

    #[tokio::test]
    async fn stderr_is_captured_too() {
        let mut sup = supervisor();
        let process = ServerProcess::spawn_raw("sh", &["-c", "echo oops >&2"]).unwrap();
        sup.attach(process).unwrap();
        sup.stop().await.unwrap();

        assert_eq!(sup.drain_output(), vec!["oops"]);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let mut sup = supervisor();
        let process = ServerProcess::spawn_raw("sleep", &["5"]).unwrap();
        sup.attach(process).unwrap();

        sup.stop().await.unwrap();
        let second = sup.stop().await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn drain_before_exit_returns_partial_output() {
        let mut sup = supervisor();
        let process =
            ServerProcess::spawn_raw("sh", &["-c", "echo ready; exec sleep 5"]).unwrap();
        sup.attach(process).unwrap();

        // Give the reader a moment to pick up the first line.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sup.drain_output(), vec!["ready"]);

        sup.stop().await.unwrap();
    }
}
