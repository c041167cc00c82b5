//! Worker events and the sink they are delivered through.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Process-wide unique identifier for a worker.
///
/// Ids are handed out by the registry and are never reused within a process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final report for a worker, carried by the terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Termination {
    /// Whether the child was ever successfully launched.
    pub has_started: bool,
    /// `true` when the worker was killed rather than exiting on its own.
    pub forced_termination: bool,
    /// The child's exit status. `None` when the child was killed or the
    /// status could not be collected.
    pub exit_status: Option<i32>,
    /// The child's OS process id, when one was assigned.
    pub pid: Option<u32>,
}

/// Event emitted by a worker's pump loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    /// Bytes read from the child's stdout.
    StdoutData { worker: WorkerId, data: Vec<u8> },
    /// Bytes read from the child's stderr.
    StderrData { worker: WorkerId, data: Vec<u8> },
    /// The worker reached a terminal state. At most one per worker, and
    /// suppressed entirely for panic terminations.
    Termination {
        worker: WorkerId,
        termination: Termination,
    },
}

impl WorkerEvent {
    /// The worker this event belongs to.
    #[must_use]
    pub fn worker(&self) -> WorkerId {
        match self {
            Self::StdoutData { worker, .. }
            | Self::StderrData { worker, .. }
            | Self::Termination { worker, .. } => *worker,
        }
    }
}

/// Destination for worker events.
///
/// Pushing must never block: the pump loop calls this between pipe reads.
pub trait EventSink: Send + Sync {
    fn push(&self, event: WorkerEvent);
}

/// Production [`EventSink`] backed by an unbounded mpsc channel.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl EventQueue {
    /// Create a queue together with the receiving half.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for EventQueue {
    fn push(&self, event: WorkerEvent) {
        // A dropped receiver means nobody is listening anymore; the pump
        // keeps draining the child regardless.
        let _ = self.tx.send(event);
    }
}
