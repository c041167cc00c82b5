//! Synchronous exec variant: run a command to completion, collecting its
//! output instead of streaming events.

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::command::CommandSpec;
use crate::worker::{
    ExecError, Launcher, PipeLauncher, ReadOutcome, WorkerOptions, WorkerRegistry, POLL_INTERVAL,
    READ_BUFFER_SIZE, STDIN_SLICE_SIZE,
};

/// How many extra polls the collector spends draining the pipes to end of
/// file after the child has exited.
const EXIT_DRAIN_POLLS: u32 = 50;

/// Collected result of a completed exec call.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    /// The child's exit status, `None` when it was killed by a signal.
    pub exit_status: Option<i32>,
    /// Everything the child wrote to stdout.
    pub stdout: Vec<u8>,
    /// Everything the child wrote to stderr.
    pub stderr: Vec<u8>,
}

/// Run `spec` to completion, feeding it `stdin_data` and collecting both
/// output streams.
///
/// The call registers itself with the registry so `kill_all` can cancel it.
/// Stdin is written in bounded slices and then closed, so the child always
/// sees end of file.
///
/// # Errors
///
/// [`ExecError::Launch`] when the child cannot be spawned;
/// [`ExecError::Cancelled`] when the call is cancelled before the child
/// exits on its own.
pub async fn exec(
    spec: &CommandSpec,
    options: WorkerOptions,
    stdin_data: Option<&[u8]>,
    registry: &WorkerRegistry,
) -> Result<ExecOutcome, ExecError> {
    let (exec_id, cancel) = registry.register_exec();
    let result = run(spec, options, stdin_data, registry, &cancel).await;
    registry.deregister_exec(exec_id);
    result
}

async fn run(
    spec: &CommandSpec,
    options: WorkerOptions,
    stdin_data: Option<&[u8]>,
    registry: &WorkerRegistry,
    cancel: &CancellationToken,
) -> Result<ExecOutcome, ExecError> {
    let shutdown = registry.shutdown_token();
    if cancel.is_cancelled() || shutdown.is_cancelled() {
        return Err(ExecError::Cancelled);
    }

    let (mut launcher, stdin) = PipeLauncher::spawn(spec, options.kill_process_tree)?;
    tracing::debug!(command = %spec.command_line(), pid = ?launcher.pid(), "Exec started");

    if let Some(mut sink) = stdin {
        if let Some(data) = stdin_data {
            // The pipe can fill up against a child that never reads; every
            // chunk write stays interruptible by a cancellation.
            for chunk in data.chunks(STDIN_SLICE_SIZE) {
                let result = tokio::select! {
                    result = sink.write_all(chunk) => result,
                    () = cancel.cancelled() => {
                        launcher.shutdown(true, options.kill_process_tree).await;
                        return Err(ExecError::Cancelled);
                    }
                    () = shutdown.cancelled() => {
                        launcher.shutdown(true, options.kill_process_tree).await;
                        return Err(ExecError::Cancelled);
                    }
                };
                if result.is_err() {
                    break;
                }
            }
            let _ = sink.flush().await;
        }
        // Dropping the handle closes the pipe; the child sees end of file.
        drop(sink);
    }

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut exit_polls = 0u32;

    loop {
        if cancel.is_cancelled() || shutdown.is_cancelled() {
            launcher.shutdown(true, options.kill_process_tree).await;
            return Err(ExecError::Cancelled);
        }

        let stdout_closed = collect(&mut launcher, &mut buf, &mut stdout, true).await;
        let stderr_closed = collect(&mut launcher, &mut buf, &mut stderr, false).await;

        if !launcher.is_running() {
            if !(stdout_closed && stderr_closed) && exit_polls < EXIT_DRAIN_POLLS {
                exit_polls += 1;
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
            if options.kill_process_tree {
                launcher.shutdown(false, true).await;
            }
            return Ok(ExecOutcome {
                exit_status: launcher.exit_status(),
                stdout,
                stderr,
            });
        }

        tokio::select! {
            () = cancel.cancelled() => {}
            () = shutdown.cancelled() => {}
            () = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}

/// Append one stream's pending output to `out`. Returns `true` when the
/// pipe reached end of file.
async fn collect(
    launcher: &mut PipeLauncher,
    buf: &mut [u8],
    out: &mut Vec<u8>,
    from_stdout: bool,
) -> bool {
    loop {
        let outcome = if from_stdout {
            launcher.read_stdout(buf).await
        } else {
            launcher.read_stderr(buf).await
        };
        match outcome {
            ReadOutcome::Data(n) => out.extend_from_slice(&buf[..n]),
            ReadOutcome::Empty => return false,
            ReadOutcome::Closed => return true,
        }
    }
}
