//! Restartable periodic background tasks.
//!
//! Every polling loop and keep-alive in the device fleet runs on a
//! [`ScheduledTask`]: a named loop that invokes a caller-supplied async
//! action on a fixed interval, with cancellation-safe `restart`/`stop`.
//!
//! # Generation-based cancellation
//!
//! Cancellation is controlled by an atomically swapped generation counter
//! rather than a boolean flag.  `restart()` bumps the counter and launches a
//! loop pinned to the new generation; `stop()` just bumps the counter.  A
//! superseded loop observes the stale generation at its next checkpoint and
//! exits without invoking again, so no interleaving of `restart`/`stop`
//! calls can ever leave two loops invoking for the same task, and repeated
//! `stop()` is trivially idempotent.
//!
//! A loop that is mid-action when superseded is detached, not interrupted:
//! it finishes the in-flight invocation and then exits.  Ticks within one
//! generation are strictly serialized — the loop awaits the action before
//! starting the next interval wait, so a slow action delays but never
//! overlaps the following tick.
//!
//! # Failure isolation
//!
//! An `Err` returned by the action is logged and the loop continues on its
//! next tick.  A single bad tick never terminates the scheduler.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, error};

/// Error type produced by a scheduled action.
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future returned by a scheduled action.
pub type ActionFuture = Pin<Box<dyn Future<Output = Result<(), ActionError>> + Send>>;

type Action = Arc<dyn Fn() -> ActionFuture + Send + Sync>;

/// A restartable, cancellation-safe periodic action runner.
///
/// Created once per polling concern and kept for the owner's lifetime;
/// `restart()` and `stop()` may be called arbitrarily many times, from any
/// thread, concurrently with an in-flight tick.  Dropping the task stops it.
pub struct ScheduledTask {
    name: String,
    interval: Duration,
    run_immediately: bool,
    action: Action,
    generation: Arc<AtomicU64>,
    runtime: Handle,
}

impl ScheduledTask {
    /// Creates a task that will run `action` every `interval` once started.
    ///
    /// If `run_immediately` is `true`, each `restart()` runs the action once
    /// before the first interval wait; otherwise the first run happens after
    /// one full interval.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime: the task captures the
    /// current runtime handle so `restart`/`stop` stay callable from
    /// non-async observer threads later.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        interval: Duration,
        run_immediately: bool,
        action: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            interval,
            run_immediately,
            action: Arc::new(move || Box::pin(action()) as ActionFuture),
            generation: Arc::new(AtomicU64::new(0)),
            runtime: Handle::current(),
        }
    }

    /// Cancels any currently running loop and begins a new one.
    ///
    /// The generation bump and the launch of the replacement loop happen
    /// before this method returns; the superseded loop (if any) exits at its
    /// next checkpoint without invoking the action again.
    pub fn restart(&self) {
        let my_gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(task = %self.name, generation = my_gen, "restarting scheduled task");

        let name = self.name.clone();
        let action = Arc::clone(&self.action);
        let generation = Arc::clone(&self.generation);
        let interval = self.interval;
        let run_immediately = self.run_immediately;

        self.runtime.spawn(async move {
            run_loop(name, action, interval, run_immediately, generation, my_gen).await;
        });
    }

    /// Cancels the active loop.  Idempotent; safe when already stopped.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        debug!(task = %self.name, "scheduled task stopped");
    }

    /// The configured tick interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        // Scoped release: the loop must not outlive its owner.
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("run_immediately", &self.run_immediately)
            .finish()
    }
}

/// One generation of the periodic loop.
///
/// The generation is checked before every invocation and again after the
/// action returns, so a loop superseded mid-action exits without waiting a
/// further interval.
async fn run_loop(
    name: String,
    action: Action,
    interval: Duration,
    run_immediately: bool,
    generation: Arc<AtomicU64>,
    my_gen: u64,
) {
    if run_immediately {
        if generation.load(Ordering::SeqCst) != my_gen {
            return;
        }
        invoke(&name, &action).await;
    }

    loop {
        tokio::time::sleep(interval).await;
        if generation.load(Ordering::SeqCst) != my_gen {
            break;
        }
        invoke(&name, &action).await;
        if generation.load(Ordering::SeqCst) != my_gen {
            break;
        }
    }
    debug!(task = %name, generation = my_gen, "scheduled task loop exited");
}

async fn invoke(name: &str, action: &Action) {
    if let Err(e) = (action)().await {
        // Failure isolation: log and keep ticking.
        error!(task = %name, "scheduled action failed: {e}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(
        interval: Duration,
        run_immediately: bool,
    ) -> (ScheduledTask, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let task = ScheduledTask::new("test-task", interval, run_immediately, move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        (task, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_does_not_run_before_restart() {
        // Arrange
        let (_task, count) = counting_task(Duration::from_millis(50), true);

        // Act – never call restart
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Assert
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_immediately_fires_before_first_interval() {
        // Arrange
        let (task, count) = counting_task(Duration::from_secs(60), true);

        // Act
        task.restart();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Assert – one immediate invocation, none from the interval yet
        assert_eq!(count.load(Ordering::SeqCst), 1);
        task.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_start_waits_one_interval() {
        // Arrange
        let (task, count) = counting_task(Duration::from_millis(200), false);

        // Act
        task.restart();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let before_first_interval = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Assert
        assert_eq!(before_first_interval, 0, "nothing before the first interval");
        assert_eq!(count.load(Ordering::SeqCst), 1);
        task.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_ticks() {
        // Arrange
        let (task, count) = counting_task(Duration::from_millis(100), false);
        task.restart();
        tokio::time::sleep(Duration::from_millis(250)).await; // ticks at 100, 200

        // Act
        task.stop();
        let at_stop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Assert
        assert_eq!(at_stop, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2, "no ticks after stop");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_action_delays_but_never_overlaps_next_tick() {
        // Arrange – action takes 3 intervals to complete; track concurrent entries
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&active);
        let m = Arc::clone(&max_active);
        let task = ScheduledTask::new("slow", Duration::from_millis(100), true, move || {
            let a = Arc::clone(&a);
            let m = Arc::clone(&m);
            async move {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300)).await;
                a.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        });

        // Act
        task.restart();
        tokio::time::sleep(Duration::from_millis(1200)).await;
        task.stop();

        // Assert – ticks were serialized
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_action_does_not_stop_the_loop() {
        // Arrange – every invocation fails
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let task = ScheduledTask::new("failing", Duration::from_millis(100), false, move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), ActionError>("device returned garbage".into())
            }
        });

        // Act
        task.restart();
        tokio::time::sleep(Duration::from_millis(350)).await;
        task.stop();

        // Assert – ticks at 100, 200, 300 all happened despite the errors
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_the_loop() {
        // Arrange
        let (task, count) = counting_task(Duration::from_millis(100), false);
        task.restart();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Act
        drop(task);
        let at_drop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Assert
        assert_eq!(count.load(Ordering::SeqCst), at_drop);
    }
}
