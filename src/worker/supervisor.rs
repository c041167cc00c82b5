//! Per-process supervisor.
//!
//! A [`SystemWorker`] owns one child process for its whole lifetime: it
//! launches the child, runs the pump task that drains stdout/stderr into the
//! event sink, feeds stdin, and reports a single terminal event when the
//! child goes away. Panic terminations (host shutdown, `kill(true)`) keep
//! the kill but suppress the terminal event.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio_util::sync::CancellationToken;

use crate::command::CommandSpec;
use crate::worker::{
    kill_process_group, EventSink, Launcher, PipeLauncher, ReadOutcome, Termination, WorkerEvent,
    WorkerId, WorkerRegistry, POLL_INTERVAL, READ_BUFFER_SIZE, STDIN_SLICE_SIZE,
};

/// How many extra polls the pump spends draining the pipes to end of file
/// after the child has exited.
const EXIT_DRAIN_POLLS: u32 = 50;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of the launch attempt. Set at most once per worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupStatus {
    /// `start` has not been called yet.
    #[default]
    NotStarted,
    /// The launch failed, or was refused because a kill arrived first.
    Failed,
    /// The child was launched.
    Started,
}

/// Where the worker is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Launched (or not yet launched) and not terminated.
    #[default]
    Running,
    /// The child exited on its own.
    Exited { status: Option<i32> },
    /// The child was killed through this worker.
    Killed,
    /// The child was killed as part of a panic termination; the terminal
    /// event was suppressed.
    Shutdown,
}

/// Per-worker configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerOptions {
    /// Place the child in its own process group and take the whole group
    /// down on kill (unix only).
    pub kill_process_tree: bool,
}

/// Point-in-time snapshot of a worker, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfo {
    pub command_line: String,
    pub has_started: bool,
    pub is_terminated: bool,
    pub pid: Option<u32>,
}

#[derive(Default)]
struct WorkerState {
    startup: StartupStatus,
    phase: Phase,
    pid: Option<u32>,
    panic_requested: bool,
    termination_event_discarded: bool,
}

impl WorkerState {
    fn is_terminated(&self) -> bool {
        self.startup == StartupStatus::Failed || !matches!(self.phase, Phase::Running)
    }
}

enum PumpOutcome {
    Exited,
    Killed,
}

#[derive(Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Supervisor for one external process.
pub struct SystemWorker {
    id: WorkerId,
    spec: CommandSpec,
    options: WorkerOptions,
    registry: WorkerRegistry,
    sink: Arc<dyn EventSink>,
    state: Mutex<WorkerState>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    kill_token: CancellationToken,
    done: CancellationToken,
}

impl SystemWorker {
    /// Create a worker for `spec`. Nothing is launched until [`start`].
    ///
    /// [`start`]: SystemWorker::start
    #[must_use]
    pub fn create(
        spec: CommandSpec,
        options: WorkerOptions,
        registry: &WorkerRegistry,
        sink: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: registry.next_worker_id(),
            spec,
            options,
            registry: registry.clone(),
            sink,
            state: Mutex::new(WorkerState::default()),
            stdin: tokio::sync::Mutex::new(None),
            kill_token: CancellationToken::new(),
            done: CancellationToken::new(),
        })
    }

    /// This worker's id.
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// The command this worker runs.
    #[must_use]
    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Launch the child and spawn the pump task. Effective at most once;
    /// later calls return the recorded status without launching again.
    ///
    /// A kill that arrived before the launch wins the race: the worker
    /// records `Failed`, emits nothing, and never spawns a child.
    pub async fn start(self: &Arc<Self>) -> StartupStatus {
        {
            let mut st = lock(&self.state);
            match st.startup {
                StartupStatus::NotStarted => {}
                status => return status,
            }
            if st.panic_requested || self.registry.is_shutting_down() {
                st.startup = StartupStatus::Failed;
                drop(st);
                self.done.cancel();
                return StartupStatus::Failed;
            }
        }
        match PipeLauncher::spawn(&self.spec, self.options.kill_process_tree) {
            Ok((launcher, stdin)) => self.start_with_launcher(Box::new(launcher), stdin).await,
            Err(err) => {
                tracing::warn!(worker = %self.id, error = %err, "Failed to launch worker");
                let mut st = lock(&self.state);
                st.startup = StartupStatus::Failed;
                drop(st);
                self.done.cancel();
                StartupStatus::Failed
            }
        }
    }

    /// Launch seam shared by `start` and the tests that script a launcher.
    pub(crate) async fn start_with_launcher(
        self: &Arc<Self>,
        launcher: Box<dyn Launcher>,
        stdin: Option<ChildStdin>,
    ) -> StartupStatus {
        {
            let mut st = lock(&self.state);
            match st.startup {
                StartupStatus::NotStarted => {}
                status => return status,
            }
            if st.panic_requested || self.registry.is_shutting_down() {
                st.startup = StartupStatus::Failed;
                drop(st);
                self.done.cancel();
                return StartupStatus::Failed;
            }
            st.startup = StartupStatus::Started;
            st.pid = launcher.pid();
        }
        *self.stdin.lock().await = stdin;
        self.registry.register(self);
        tracing::debug!(worker = %self.id, command = %self.spec.command_line(), "Worker started");
        tokio::spawn(Arc::clone(self).pump(launcher));
        StartupStatus::Started
    }

    /// Write `data` to the child's stdin in bounded slices.
    ///
    /// Returns the number of bytes written: the full length, or 0 when any
    /// slice fails or stdin is already closed. Never a partial count.
    pub async fn post_input(&self, data: &[u8]) -> usize {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return 0;
        };
        for chunk in data.chunks(STDIN_SLICE_SIZE) {
            if stdin.write_all(chunk).await.is_err() {
                return 0;
            }
        }
        if stdin.flush().await.is_err() {
            return 0;
        }
        data.len()
    }

    /// Close the child's stdin so it sees end of file. Idempotent.
    pub async fn close_input(&self) {
        self.stdin.lock().await.take();
    }

    /// Request termination of the child. Idempotent.
    ///
    /// With `panic` the termination is silent: the terminal event is
    /// suppressed and a not-yet-started worker is prevented from ever
    /// launching. The pump observes the request within one poll interval.
    pub async fn kill(&self, panic: bool) {
        let (terminated, pid) = {
            let mut st = lock(&self.state);
            if panic {
                st.panic_requested = true;
            }
            (st.is_terminated(), st.pid)
        };
        tracing::debug!(worker = %self.id, panic, "Kill requested");
        self.kill_token.cancel();
        self.stdin.lock().await.take();
        if terminated && self.options.kill_process_tree {
            // The pump is already gone; sweep up process-group leftovers.
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
        }
    }

    /// Wait until the worker reaches a terminal state.
    ///
    /// Returns `true` once terminated (immediately when the terminal event
    /// was discarded by a panic kill), `false` on timeout.
    pub async fn wait(&self, timeout: Duration) -> bool {
        {
            let st = lock(&self.state);
            if st.termination_event_discarded {
                return true;
            }
        }
        tokio::time::timeout(timeout, self.done.cancelled())
            .await
            .is_ok()
    }

    /// Whether the worker has reached a terminal state.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        lock(&self.state).is_terminated()
    }

    /// The recorded launch outcome.
    #[must_use]
    pub fn startup_status(&self) -> StartupStatus {
        lock(&self.state).startup
    }

    /// The current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        lock(&self.state).phase
    }

    /// Snapshot of the worker for reporting.
    #[must_use]
    pub fn info(&self) -> WorkerInfo {
        let st = lock(&self.state);
        WorkerInfo {
            command_line: self.spec.command_line(),
            has_started: st.startup == StartupStatus::Started,
            is_terminated: st.is_terminated(),
            pid: st.pid,
        }
    }

    /// The pump task: drain output, watch for kill requests, and report the
    /// terminal state. Output is always drained before the shutdown checks,
    /// so data produced just before an exit or kill is not lost.
    async fn pump(self: Arc<Self>, mut launcher: Box<dyn Launcher>) {
        let shutdown = self.registry.shutdown_token();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut exit_polls = 0u32;

        let outcome = loop {
            // A panic termination means the host is tearing down and nobody
            // is listening; skip the reads and go straight to the kill.
            let panicking = shutdown.is_cancelled() || lock(&self.state).panic_requested;
            let (stdout_closed, stderr_closed) = if panicking {
                (true, true)
            } else {
                (
                    self.drain(launcher.as_mut(), &mut buf, OutputStream::Stdout)
                        .await,
                    self.drain(launcher.as_mut(), &mut buf, OutputStream::Stderr)
                        .await,
                )
            };

            if self.kill_token.is_cancelled() || shutdown.is_cancelled() {
                launcher.shutdown(true, self.options.kill_process_tree).await;
                break PumpOutcome::Killed;
            }

            if !launcher.is_running() {
                // The pipes can lag behind the exit; keep draining until
                // both report end of file, within a bounded number of polls.
                if !(stdout_closed && stderr_closed) && exit_polls < EXIT_DRAIN_POLLS {
                    exit_polls += 1;
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
                if self.options.kill_process_tree {
                    launcher.shutdown(false, true).await;
                }
                break PumpOutcome::Exited;
            }

            tokio::select! {
                () = self.kill_token.cancelled() => {}
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        };

        let exit_status = launcher.exit_status();
        self.finish(&outcome, exit_status, shutdown.is_cancelled())
            .await;
    }

    /// Read one stream until it goes quiet. Returns `true` when the pipe
    /// reached end of file.
    async fn drain(
        &self,
        launcher: &mut dyn Launcher,
        buf: &mut [u8],
        stream: OutputStream,
    ) -> bool {
        loop {
            let outcome = match stream {
                OutputStream::Stdout => launcher.read_stdout(buf).await,
                OutputStream::Stderr => launcher.read_stderr(buf).await,
            };
            match outcome {
                ReadOutcome::Data(n) => {
                    let data = buf[..n].to_vec();
                    let event = match stream {
                        OutputStream::Stdout => WorkerEvent::StdoutData {
                            worker: self.id,
                            data,
                        },
                        OutputStream::Stderr => WorkerEvent::StderrData {
                            worker: self.id,
                            data,
                        },
                    };
                    self.sink.push(event);
                }
                ReadOutcome::Empty => return false,
                ReadOutcome::Closed => return true,
            }
        }
    }

    /// Record the terminal state and deliver (or discard) the terminal
    /// event. Runs exactly once, at the end of the pump.
    async fn finish(&self, outcome: &PumpOutcome, exit_status: Option<i32>, host_shutdown: bool) {
        let event = {
            let mut st = lock(&self.state);
            let panic = st.panic_requested || host_shutdown;
            st.phase = match outcome {
                PumpOutcome::Exited => Phase::Exited {
                    status: exit_status,
                },
                PumpOutcome::Killed if panic => Phase::Shutdown,
                PumpOutcome::Killed => Phase::Killed,
            };
            if matches!(st.phase, Phase::Shutdown) {
                st.termination_event_discarded = true;
                None
            } else {
                Some(WorkerEvent::Termination {
                    worker: self.id,
                    termination: Termination {
                        has_started: true,
                        forced_termination: matches!(st.phase, Phase::Killed),
                        exit_status,
                        pid: st.pid,
                    },
                })
            }
        };

        self.stdin.lock().await.take();
        if let Some(event) = event {
            self.sink.push(event);
        }
        tracing::debug!(worker = %self.id, exit_status = ?exit_status, "Worker finished");
        self.registry.deregister(self.id);
        self.done.cancel();
    }
}
