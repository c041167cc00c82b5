//! Process-wide worker registry and bulk cancellation.
//!
//! The registry hands out worker ids, tracks every live supervisor by weak
//! reference, and tracks the cancellation token of every in-flight exec
//! call. `kill_all` is the host-shutdown hammer: it flips the shutdown
//! token and kills everything currently registered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio_util::sync::CancellationToken;

use crate::worker::{SystemWorker, WorkerId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle to the process-wide worker registry.
///
/// The registry never owns a supervisor; the pump task's own `Arc` keeps a
/// worker alive for exactly as long as it runs.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    workers: Mutex<HashMap<WorkerId, Weak<SystemWorker>>>,
    execs: Mutex<HashMap<u64, CancellationToken>>,
    shutdown: CancellationToken,
    next_worker: AtomicU64,
    next_exec: AtomicU64,
}

impl WorkerRegistry {
    /// Create a fresh registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next worker id.
    pub(crate) fn next_worker_id(&self) -> WorkerId {
        WorkerId::new(self.inner.next_worker.fetch_add(1, Ordering::Relaxed))
    }

    /// Track a started worker. The entry is weak; a worker whose pump has
    /// finished deregisters itself.
    pub(crate) fn register(&self, worker: &Arc<SystemWorker>) {
        lock(&self.inner.workers).insert(worker.id(), Arc::downgrade(worker));
        tracing::debug!(worker = %worker.id(), "Registered worker");
    }

    /// Remove a worker once its pump has finished.
    pub(crate) fn deregister(&self, id: WorkerId) {
        lock(&self.inner.workers).remove(&id);
        tracing::debug!(worker = %id, "Deregistered worker");
    }

    /// Track an in-flight exec call. Returns the id to deregister with and
    /// the token `kill_all` will cancel.
    pub(crate) fn register_exec(&self) -> (u64, CancellationToken) {
        let id = self.inner.next_exec.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        lock(&self.inner.execs).insert(id, token.clone());
        (id, token)
    }

    /// Remove an exec entry once the call has returned.
    pub(crate) fn deregister_exec(&self, id: u64) {
        lock(&self.inner.execs).remove(&id);
    }

    /// Token cancelled when the whole registry is shutting down. Every pump
    /// loop and exec call observes it.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Whether `kill_all` has been invoked.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Number of registered workers that are still running.
    #[must_use]
    pub fn running_count(&self) -> usize {
        lock(&self.inner.workers)
            .values()
            .filter_map(Weak::upgrade)
            .filter(|worker| !worker.is_terminated())
            .count()
    }

    /// Kill every registered worker and cancel every in-flight exec.
    ///
    /// Workers started after this call fail their launch instead of
    /// running. The kill is a panic termination: no terminal events are
    /// emitted for the killed workers.
    pub async fn kill_all(&self) {
        self.inner.shutdown.cancel();

        // Snapshot under the locks, kill outside them.
        let workers: Vec<Arc<SystemWorker>> = lock(&self.inner.workers)
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        let execs: Vec<CancellationToken> = lock(&self.inner.execs).values().cloned().collect();

        tracing::info!(
            workers = workers.len(),
            execs = execs.len(),
            "Killing all workers"
        );
        for worker in workers {
            worker.kill(true).await;
        }
        for token in execs {
            token.cancel();
        }
    }
}
