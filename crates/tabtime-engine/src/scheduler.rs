//! Named periodic tasks with cooperative cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Owns the background timers of one engine.
///
/// Every task gets a child of the scheduler's root token; [`shutdown`]
/// cancels them all and waits for each to stop.
///
/// [`shutdown`]: Scheduler::shutdown
#[derive(Debug, Default)]
pub struct Scheduler {
    root: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `tick` every `period`, first after one full period.
    ///
    /// A zero period disables the task.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if period.is_zero() {
            tracing::debug!(task = name, "periodic task disabled");
            return;
        }
        let token = self.root.child_token();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => tick().await,
                    () = token.cancelled() => break,
                }
            }
            tracing::debug!(task = name, "periodic task stopped");
        });
        tracing::debug!(task = name, period_ms = period.as_millis(), "periodic task started");
        self.tasks.push((name, handle));
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Cancels every task and waits for them to finish.
    pub async fn shutdown(&mut self) {
        self.root.cancel();
        for (name, handle) in self.tasks.drain(..) {
            if let Err(err) = handle.await {
                tracing::warn!(task = name, error = %err, "periodic task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnMut() -> std::future::Ready<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_after_each_period_until_shutdown() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.spawn_periodic("count", Duration::from_secs(60), counting(&counter));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        scheduler.shutdown().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(scheduler.task_names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_disables_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.spawn_periodic("disabled", Duration::ZERO, counting(&counter));
        scheduler.spawn_periodic("enabled", Duration::from_secs(1), counting(&counter));
        assert_eq!(scheduler.task_names(), vec!["enabled"]);
        scheduler.shutdown().await;
    }
}
