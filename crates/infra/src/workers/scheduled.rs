use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::supervisor::TaskSupervisor;

/// A future that runs once after a delay unless cancelled first.
///
/// Dropping the handle detaches the task; only [`ScheduledTask::cancel`]
/// stops it.
#[derive(Debug)]
pub struct ScheduledTask {
    cancel: oneshot::Sender<()>,
}

impl ScheduledTask {
    pub fn after<F>(supervisor: &TaskSupervisor, delay: Duration, fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (cancel, mut rx) = oneshot::channel::<()>();
        let due_at = Instant::now() + delay;

        supervisor.spawn("scheduled", async move {
            tokio::select! {
                Ok(()) = &mut rx => {}
                _ = tokio::time::sleep_until(due_at) => fut.await,
            }
        });

        Self { cancel }
    }

    /// Cancel the task if it has not fired yet.
    pub fn cancel(self) {
        let _ = self.cancel.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let supervisor = TaskSupervisor::new("test");
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        let task = ScheduledTask::after(&supervisor, Duration::from_secs(5), async move {
            flag.store(true, Ordering::SeqCst);
        });
        drop(task);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let supervisor = TaskSupervisor::new("test");
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        let task = ScheduledTask::after(&supervisor, Duration::from_secs(1), async move {
            flag.store(true, Ordering::SeqCst);
        });
        task.cancel();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
