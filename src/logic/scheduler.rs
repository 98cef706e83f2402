//! Scheduler - cancellable periodic tasks
//!
//! Two independent loops drive the service: a flush loop on the cooldown
//! interval and a reachability/replay loop on a coarser interval (which also
//! fires once at startup). The scheduler owns timing only; what a tick does
//! is supplied by the caller.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

// ============================================================================
// PERIODIC TASK
// ============================================================================

/// A spawned loop that runs `tick` on a fixed monotonic schedule until cancelled.
///
/// Ticks never overlap: the next deadline is only awaited once the previous
/// tick finished. Deadlines missed while a tick was running are skipped, not
/// replayed in a burst.
pub struct PeriodicTask {
    name: &'static str,
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn onto the current tokio runtime
    pub fn spawn<F, Fut>(name: &'static str, interval: Duration, run_immediately: bool, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            log::debug!("{} loop started ({:?})", name, interval);

            let mut deadline = Instant::now();
            if !run_immediately {
                deadline += interval;
            }

            loop {
                tokio::select! {
                    _ = sleep_until(deadline) => {}
                    _ = cancel_rx.changed() => break,
                }

                // A cancelled tick is dropped at its next await point
                tokio::select! {
                    _ = tick() => {}
                    _ = cancel_rx.changed() => break,
                }

                let now = Instant::now();
                deadline += interval;
                while deadline <= now {
                    deadline += interval;
                }
            }

            log::debug!("{} loop stopped", name);
        });

        Self { name, cancel_tx, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the loop. Takes effect at the task's next await point.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

#[derive(Default)]
pub struct Scheduler {
    flush: Option<PeriodicTask>,
    probe: Option<PeriodicTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start both loops, replacing any running ones
    pub fn start<F, FFut, P, PFut>(
        &mut self,
        flush_interval: Duration,
        probe_interval: Duration,
        on_flush: F,
        on_probe: P,
    ) where
        F: FnMut() -> FFut + Send + 'static,
        FFut: Future<Output = ()> + Send + 'static,
        P: FnMut() -> PFut + Send + 'static,
        PFut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.flush = Some(PeriodicTask::spawn("flush", flush_interval, false, on_flush));
        self.probe = Some(PeriodicTask::spawn("reachability", probe_interval, true, on_probe));
    }

    /// Cancel both loops
    pub fn cancel(&mut self) {
        for task in [self.flush.take(), self.probe.take()].into_iter().flatten() {
            task.cancel();
            log::debug!("Cancelled {} loop", task.name());
        }
    }

    pub fn is_running(&self) -> bool {
        [&self.flush, &self.probe]
            .into_iter()
            .flatten()
            .any(|t| !t.is_cancelled() && !t.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter_tick(counter: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test]
    async fn test_periodic_task_ticks_and_cancels() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = PeriodicTask::spawn("test", Duration::from_millis(20), false, counter_tick(&counter));

        tokio::time::sleep(Duration::from_millis(150)).await;
        let ticks = counter.load(Ordering::SeqCst);
        assert!(ticks >= 2, "expected several ticks, got {}", ticks);

        task.cancel();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(task.is_finished());

        let after_cancel = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn test_run_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let _task = PeriodicTask::spawn("test", Duration::from_secs(60), true, counter_tick(&counter));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_long_tick() {
        let started = Arc::new(AtomicUsize::new(0));
        let started_in_tick = Arc::clone(&started);

        let task = PeriodicTask::spawn("slow", Duration::from_millis(10), true, move || {
            started_in_tick.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60))
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        task.cancel();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(task.is_finished());
    }

    #[tokio::test]
    async fn test_scheduler_start_cancel() {
        let flushes = Arc::new(AtomicUsize::new(0));
        let probes = Arc::new(AtomicUsize::new(0));

        let mut scheduler = Scheduler::new();
        assert!(!scheduler.is_running());

        scheduler.start(
            Duration::from_millis(20),
            Duration::from_secs(60),
            counter_tick(&flushes),
            counter_tick(&probes),
        );
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(flushes.load(Ordering::SeqCst) >= 2);
        // startup probe only
        assert_eq!(probes.load(Ordering::SeqCst), 1);

        scheduler.cancel();
        assert!(!scheduler.is_running());
    }
}
