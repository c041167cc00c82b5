//! The launcher seam between a supervisor and its child process.
//!
//! [`Launcher`] is the narrow surface the pump loop drives: liveness, two
//! pollable output pipes, and shutdown. [`PipeLauncher`] is the production
//! implementation over a tokio child with piped stdio; tests substitute
//! scripted fakes.

use std::process::Stdio;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::command::CommandSpec;
use crate::worker::LaunchError;

/// Result of a single non-blocking pipe read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were read into the buffer.
    Data(usize),
    /// Nothing available this iteration. Read errors also land here; they
    /// are indistinguishable from a quiet pipe to the pump.
    Empty,
    /// The pipe reached end of file.
    Closed,
}

/// Driving surface for a launched child process.
#[async_trait]
pub trait Launcher: Send {
    /// OS process id of the child, when one was assigned.
    fn pid(&self) -> Option<u32>;

    /// Whether the child is still running. Collects the exit status as a
    /// side effect once the child has exited.
    fn is_running(&mut self) -> bool;

    /// Attempt one read from the child's stdout without blocking.
    async fn read_stdout(&mut self, buf: &mut [u8]) -> ReadOutcome;

    /// Attempt one read from the child's stderr without blocking.
    async fn read_stderr(&mut self, buf: &mut [u8]) -> ReadOutcome;

    /// Kill the child, and the whole process group when `kill_tree` is set.
    /// With `wait_for_exit` the child is also reaped before returning.
    async fn shutdown(&mut self, wait_for_exit: bool, kill_tree: bool);

    /// The collected exit status. `None` while running, and for children
    /// that were killed by a signal.
    fn exit_status(&mut self) -> Option<i32>;
}

/// Production launcher: a tokio child with all three stdio halves piped.
pub struct PipeLauncher {
    child: Child,
    pid: Option<u32>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    exit: Option<std::process::ExitStatus>,
}

impl PipeLauncher {
    /// Spawn the command described by `spec`.
    ///
    /// The child's stdin half is handed back to the caller; stdout and
    /// stderr stay with the launcher for the pump to drain. With
    /// `kill_tree`, the child is placed in its own process group on unix so
    /// a later shutdown can take its descendants with it.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchError`] classified by the spawn failure's
    /// `io::ErrorKind`.
    pub fn spawn(
        spec: &CommandSpec,
        kill_tree: bool,
    ) -> Result<(Self, Option<ChildStdin>), LaunchError> {
        let mut cmd = Command::new(spec.executable());
        cmd.args(spec.arguments())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = spec.working_dir() {
            cmd.current_dir(dir);
        }
        for (name, value) in spec.env() {
            cmd.env(name, value);
        }
        #[cfg(unix)]
        if kill_tree {
            cmd.process_group(0);
        }
        #[cfg(not(unix))]
        let _ = kill_tree;

        let mut child = cmd
            .spawn()
            .map_err(|err| LaunchError::from_io(err, spec.executable()))?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let pid = child.id();
        tracing::debug!(pid = ?pid, executable = %spec.executable().display(), "Spawned child process");
        Ok((
            Self {
                child,
                pid,
                stdout,
                stderr,
                exit: None,
            },
            stdin,
        ))
    }
}

#[async_trait]
impl Launcher for PipeLauncher {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn is_running(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status);
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    async fn read_stdout(&mut self, buf: &mut [u8]) -> ReadOutcome {
        poll_pipe(self.stdout.as_mut(), buf)
    }

    async fn read_stderr(&mut self, buf: &mut [u8]) -> ReadOutcome {
        poll_pipe(self.stderr.as_mut(), buf)
    }

    async fn shutdown(&mut self, wait_for_exit: bool, kill_tree: bool) {
        if kill_tree {
            if let Some(pid) = self.pid {
                kill_process_group(pid);
            }
        }
        if self.exit.is_none() {
            let _ = self.child.start_kill();
            if wait_for_exit {
                if let Ok(status) = self.child.wait().await {
                    self.exit = Some(status);
                }
            }
        }
    }

    fn exit_status(&mut self) -> Option<i32> {
        if self.exit.is_none() {
            if let Ok(Some(status)) = self.child.try_wait() {
                self.exit = Some(status);
            }
        }
        self.exit.and_then(|status| status.code())
    }
}

/// One non-blocking read attempt against an optional pipe half.
fn poll_pipe<R>(pipe: Option<&mut R>, buf: &mut [u8]) -> ReadOutcome
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return ReadOutcome::Closed;
    };
    match pipe.read(buf).now_or_never() {
        Some(Ok(0)) => ReadOutcome::Closed,
        Some(Ok(n)) => ReadOutcome::Data(n),
        Some(Err(_)) | None => ReadOutcome::Empty,
    }
}

/// Send SIGKILL to the whole process group rooted at `pid`.
#[cfg(unix)]
pub(crate) fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Ok(raw) = i32::try_from(pid) {
        let _ = killpg(Pid::from_raw(raw), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_process_group(_pid: u32) {}
