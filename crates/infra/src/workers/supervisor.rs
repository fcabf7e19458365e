use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, error};

/// Counters kept by a [`TaskSupervisor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SupervisorStats {
    pub spawned: u64,
    pub completed: u64,
    pub faulted: u64,
}

impl SupervisorStats {
    /// Tasks spawned but not yet finished.
    pub fn in_flight(&self) -> u64 {
        self.spawned
            .saturating_sub(self.completed)
            .saturating_sub(self.faulted)
    }
}

#[derive(Debug, Default)]
struct Counters {
    spawned: AtomicU64,
    completed: AtomicU64,
    faulted: AtomicU64,
}

/// Spawns background tasks and watches them for panics.
///
/// Every task gets a watcher that logs a panic instead of letting it vanish
/// with the `JoinHandle`. Cloning is cheap and clones share counters.
#[derive(Debug, Clone)]
pub struct TaskSupervisor {
    name: &'static str,
    counters: Arc<Counters>,
}

impl TaskSupervisor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Spawn `fut` on the current Tokio runtime under `label`.
    pub fn spawn<F>(&self, label: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.counters.spawned.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(fut);
        let counters = self.counters.clone();
        let supervisor = self.name;

        tokio::spawn(async move {
            match handle.await {
                Ok(()) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) if err.is_panic() => {
                    counters.faulted.fetch_add(1, Ordering::Relaxed);
                    error!(
                        supervisor,
                        task = label,
                        panic = %panic_message(err.into_panic()),
                        "supervised task panicked"
                    );
                }
                Err(_) => {
                    // Cancelled by runtime shutdown.
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                    debug!(supervisor, task = label, "supervised task cancelled");
                }
            }
        });
    }

    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            spawned: self.counters.spawned.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            faulted: self.counters.faulted.load(Ordering::Relaxed),
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
