//! Supervisor tests against real child processes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use syswork::command::{CommandSpec, CommandSpecBuilder};
use syswork::worker::{
    EventQueue, StartupStatus, SystemWorker, Termination, WorkerEvent, WorkerOptions,
    WorkerRegistry,
};

fn shell(script: &str) -> CommandSpec {
    CommandSpecBuilder::new("sh").args(["-c", script]).build()
}

fn supervised(
    spec: CommandSpec,
) -> (
    Arc<SystemWorker>,
    UnboundedReceiver<WorkerEvent>,
    WorkerRegistry,
) {
    let registry = WorkerRegistry::new();
    let (queue, rx) = EventQueue::channel();
    let worker = SystemWorker::create(spec, WorkerOptions::default(), &registry, Arc::new(queue));
    (worker, rx, registry)
}

/// Drain events until the terminal one, with a generous timeout.
async fn collect(
    rx: &mut UnboundedReceiver<WorkerEvent>,
) -> (Vec<u8>, Vec<u8>, Option<Termination>) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await
        else {
            return (stdout, stderr, None);
        };
        match event {
            WorkerEvent::StdoutData { data, .. } => stdout.extend(data),
            WorkerEvent::StderrData { data, .. } => stderr.extend(data),
            WorkerEvent::Termination { termination, .. } => {
                return (stdout, stderr, Some(termination));
            }
        }
    }
}

#[tokio::test]
async fn streams_stdout_and_reports_the_exit_status() {
    let (worker, mut rx, _registry) = supervised(shell("printf hello"));
    assert_eq!(worker.start().await, StartupStatus::Started);
    assert!(worker.wait(Duration::from_secs(10)).await);

    let (stdout, stderr, termination) = collect(&mut rx).await;
    assert_eq!(stdout, b"hello");
    assert!(stderr.is_empty());
    let termination = termination.unwrap();
    assert!(termination.has_started);
    assert!(!termination.forced_termination);
    assert_eq!(termination.exit_status, Some(0));
    assert!(termination.pid.is_some());
}

#[tokio::test]
async fn captures_stderr_separately() {
    let (worker, mut rx, _registry) = supervised(shell("printf oops >&2; exit 2"));
    worker.start().await;
    assert!(worker.wait(Duration::from_secs(10)).await);

    let (stdout, stderr, termination) = collect(&mut rx).await;
    assert!(stdout.is_empty());
    assert_eq!(stderr, b"oops");
    assert_eq!(termination.unwrap().exit_status, Some(2));
}

#[tokio::test]
async fn drains_a_chatty_child_completely() {
    let (worker, mut rx, _registry) = supervised(shell("head -c 100000 /dev/zero"));
    worker.start().await;
    assert!(worker.wait(Duration::from_secs(30)).await);

    let (stdout, _stderr, termination) = collect(&mut rx).await;
    assert_eq!(stdout.len(), 100_000);
    assert_eq!(termination.unwrap().exit_status, Some(0));
}

#[tokio::test]
async fn post_input_feeds_the_child_stdin() {
    let (worker, mut rx, _registry) = supervised(CommandSpecBuilder::new("cat").build());
    worker.start().await;

    assert_eq!(worker.post_input(b"ping\n").await, b"ping\n".len());
    worker.close_input().await;
    assert!(worker.wait(Duration::from_secs(10)).await);

    let (stdout, _stderr, termination) = collect(&mut rx).await;
    assert_eq!(stdout, b"ping\n");
    assert_eq!(termination.unwrap().exit_status, Some(0));
}

#[tokio::test]
async fn post_input_after_close_returns_zero() {
    let (worker, _rx, _registry) = supervised(CommandSpecBuilder::new("cat").build());
    worker.start().await;
    worker.close_input().await;
    assert_eq!(worker.post_input(b"lost").await, 0);
    worker.kill(false).await;
    assert!(worker.wait(Duration::from_secs(10)).await);
}

#[tokio::test]
async fn post_input_after_child_closes_its_stdin_returns_zero() {
    // The child drops its end of the pipe; the next write breaks.
    let (worker, _rx, _registry) = supervised(shell("exec 0<&-; sleep 2"));
    worker.start().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(worker.post_input(b"dropped").await, 0);
    worker.kill(false).await;
    assert!(worker.wait(Duration::from_secs(10)).await);
}

#[tokio::test]
async fn kill_stops_a_long_running_child() {
    let (worker, mut rx, _registry) = supervised(shell("sleep 30"));
    worker.start().await;
    worker.kill(false).await;
    assert!(worker.wait(Duration::from_secs(10)).await);

    let (_stdout, _stderr, termination) = collect(&mut rx).await;
    let termination = termination.unwrap();
    assert!(termination.forced_termination);
    assert_eq!(termination.exit_status, None);
}

#[tokio::test]
async fn kill_is_idempotent() {
    let (worker, mut rx, _registry) = supervised(shell("sleep 30"));
    worker.start().await;
    worker.kill(false).await;
    worker.kill(false).await;
    assert!(worker.wait(Duration::from_secs(10)).await);

    let (_stdout, _stderr, termination) = collect(&mut rx).await;
    assert!(termination.unwrap().forced_termination);
    assert!(rx.try_recv().is_err(), "exactly one terminal event");

    // Killing an already-terminated worker changes nothing.
    worker.kill(false).await;
    assert!(worker.is_terminated());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn panic_kill_emits_no_terminal_event() {
    let (worker, mut rx, _registry) = supervised(shell("sleep 30"));
    worker.start().await;
    worker.kill(true).await;
    assert!(worker.wait(Duration::from_secs(10)).await);

    while let Ok(event) = rx.try_recv() {
        assert!(
            !matches!(event, WorkerEvent::Termination { .. }),
            "terminal event should have been suppressed"
        );
    }
    assert!(worker.is_terminated());
}

#[tokio::test]
async fn launch_failure_reports_failed_and_stays_silent() {
    let spec = CommandSpecBuilder::new("/nonexistent/syswork-no-such-binary").build();
    let (worker, mut rx, _registry) = supervised(spec);

    assert_eq!(worker.start().await, StartupStatus::Failed);
    assert!(worker.wait(Duration::from_secs(1)).await);
    assert!(rx.try_recv().is_err());

    let info = worker.info();
    assert!(!info.has_started);
    assert!(info.is_terminated);
    assert_eq!(info.pid, None);
}

#[tokio::test]
async fn environment_overrides_reach_the_child() {
    let spec = CommandSpecBuilder::new("sh")
        .args(["-c", "printf \"$SYSWORK_PROBE\""])
        .env("SYSWORK_PROBE", "present")
        .build();
    let (worker, mut rx, _registry) = supervised(spec);
    worker.start().await;
    assert!(worker.wait(Duration::from_secs(10)).await);

    let (stdout, _stderr, _termination) = collect(&mut rx).await;
    assert_eq!(stdout, b"present");
}

#[tokio::test]
async fn working_directory_applies_to_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let spec = CommandSpecBuilder::new("pwd")
        .working_dir(dir.path())
        .build();
    let (worker, mut rx, _registry) = supervised(spec);
    worker.start().await;
    assert!(worker.wait(Duration::from_secs(10)).await);

    let (stdout, _stderr, _termination) = collect(&mut rx).await;
    let reported = String::from_utf8_lossy(&stdout);
    let canonical = dir.path().canonicalize().unwrap();
    assert_eq!(reported.trim(), canonical.to_string_lossy());
}
