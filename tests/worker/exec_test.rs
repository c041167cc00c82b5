//! Tests for the synchronous exec variant.

use std::time::Duration;

use syswork::command::CommandSpecBuilder;
use syswork::worker::{exec, ExecError, LaunchError, WorkerOptions, WorkerRegistry};

#[tokio::test]
async fn collects_both_streams_and_the_exit_status() {
    let registry = WorkerRegistry::new();
    let spec = CommandSpecBuilder::new("sh")
        .args(["-c", "printf out; printf err >&2; exit 4"])
        .build();

    let outcome = exec(&spec, WorkerOptions::default(), None, &registry)
        .await
        .unwrap();
    assert_eq!(outcome.stdout, b"out");
    assert_eq!(outcome.stderr, b"err");
    assert_eq!(outcome.exit_status, Some(4));
}

#[tokio::test]
async fn stdin_content_is_written_then_closed() {
    let registry = WorkerRegistry::new();
    let spec = CommandSpecBuilder::new("cat").build();

    let outcome = exec(&spec, WorkerOptions::default(), Some(b"payload"), &registry)
        .await
        .unwrap();
    assert_eq!(outcome.stdout, b"payload");
    assert_eq!(outcome.exit_status, Some(0));
}

#[tokio::test]
async fn large_stdin_is_fed_in_slices() {
    let registry = WorkerRegistry::new();
    let spec = CommandSpecBuilder::new("sh").args(["-c", "wc -c"]).build();
    let data = vec![b'x'; 10_000];

    let outcome = exec(&spec, WorkerOptions::default(), Some(&data), &registry)
        .await
        .unwrap();
    let counted: usize = String::from_utf8_lossy(&outcome.stdout)
        .trim()
        .parse()
        .unwrap();
    assert_eq!(counted, 10_000);
}

#[tokio::test]
async fn launch_failure_is_classified() {
    let registry = WorkerRegistry::new();
    let spec = CommandSpecBuilder::new("/nonexistent/syswork-no-such-binary").build();

    let err = exec(&spec, WorkerOptions::default(), None, &registry)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExecError::Launch(LaunchError::NotFound { .. })
    ));
}

#[tokio::test]
async fn kill_all_cancels_an_in_flight_exec() {
    let registry = WorkerRegistry::new();
    let handle = {
        let registry = registry.clone();
        tokio::spawn(async move {
            let spec = CommandSpecBuilder::new("sleep").arg("30").build();
            exec(&spec, WorkerOptions::default(), None, &registry).await
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    registry.kill_all().await;

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(ExecError::Cancelled)));
}

#[tokio::test]
async fn cancellation_interrupts_a_blocked_stdin_feed() {
    let registry = WorkerRegistry::new();
    let handle = {
        let registry = registry.clone();
        tokio::spawn(async move {
            // sleep never reads stdin, so a large payload fills the pipe and
            // blocks the feed.
            let spec = CommandSpecBuilder::new("sleep").arg("30").build();
            let payload = vec![b'x'; 1_000_000];
            exec(&spec, WorkerOptions::default(), Some(&payload), &registry).await
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    registry.kill_all().await;

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("exec should return promptly after kill_all")
        .unwrap();
    assert!(matches!(result, Err(ExecError::Cancelled)));
}

#[tokio::test]
async fn exec_after_shutdown_is_refused() {
    let registry = WorkerRegistry::new();
    registry.kill_all().await;

    let spec = CommandSpecBuilder::new("true").build();
    let err = exec(&spec, WorkerOptions::default(), None, &registry)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::Cancelled));
}
