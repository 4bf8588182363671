//! Fixed-interval driver for the poll action.
//!
//! The action runs once after `initial_delay`, then again `interval` after
//! each run has finished, so runs never overlap. Errors and panics from the
//! action are reported on the error channel and the loop carries on.

use anyhow::{Result, anyhow};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info};

pub type PollAction = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub name: String,
    pub initial_delay: Duration,
    pub interval: Duration,
}

struct Running {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    running: Option<Running>,
    // loop told to stop without waiting; it may still be inside a run
    stopping: Option<JoinHandle<()>>,
}

pub struct Scheduler {
    settings: SchedulerSettings,
    action: PollAction,
    errors: mpsc::UnboundedSender<anyhow::Error>,
    state: Mutex<State>,
}

impl Scheduler {
    pub fn new(
        settings: SchedulerSettings,
        action: PollAction,
        errors: mpsc::UnboundedSender<anyhow::Error>,
    ) -> Self {
        Self {
            settings,
            action,
            errors,
            state: Mutex::new(State::default()),
        }
    }

    /// Start the timer task. Returns false if it was already running.
    ///
    /// A loop left behind by `stop(false)` is awaited first, so a run in
    /// progress never overlaps the first run of the new loop.
    pub async fn start(&self) -> bool {
        let mut state = self.state.lock().await;

        if state.running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!(scheduler = %self.settings.name, "already running");
            return false;
        }

        if let Some(previous) = state.stopping.take() {
            debug!(scheduler = %self.settings.name, "waiting for previous loop to finish");
            if let Err(e) = previous.await {
                error!(scheduler = %self.settings.name, "scheduler task failed: {e}");
            }
        }

        let (stop, stopped) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            self.settings.clone(),
            Arc::clone(&self.action),
            self.errors.clone(),
            stopped,
        ));

        info!(
            scheduler = %self.settings.name,
            initial_delay_secs = self.settings.initial_delay.as_secs(),
            interval_secs = self.settings.interval.as_secs(),
            "scheduler started"
        );

        state.running = Some(Running { stop, handle });

        true
    }

    /// Stop scheduling new runs. With `wait`, also wait for a run in progress
    /// to finish.
    pub async fn stop(&self, wait: bool) {
        let mut state = self.state.lock().await;

        let Some(Running { stop, handle }) = state.running.take() else {
            return;
        };

        // the loop also stops when the sender is dropped
        let _ = stop.send(true);

        if !wait {
            state.stopping = Some(handle);
        } else if let Err(e) = handle.await {
            error!(scheduler = %self.settings.name, "scheduler task failed: {e}");
        }

        info!(scheduler = %self.settings.name, "scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.state
            .lock()
            .await
            .running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

async fn run_loop(
    settings: SchedulerSettings,
    action: PollAction,
    errors: mpsc::UnboundedSender<anyhow::Error>,
    mut stopped: watch::Receiver<bool>,
) {
    if !wait_or_stop(settings.initial_delay, &mut stopped).await {
        return;
    }

    loop {
        let started = Instant::now();

        let outcome = AssertUnwindSafe(async { (action)().await })
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(panic) => Some(anyhow!("poll action panicked: {}", panic_message(&*panic))),
        };

        if let Some(e) = error
            && errors.send(e).is_err()
        {
            debug!(scheduler = %settings.name, "error channel closed");
        }

        debug!(
            scheduler = %settings.name,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "run finished"
        );

        if !wait_or_stop(settings.interval, &mut stopped).await {
            return;
        }
    }
}

/// Sleep for `duration`. Returns false if a stop was requested first.
async fn wait_or_stop(duration: Duration, stopped: &mut watch::Receiver<bool>) -> bool {
    if *stopped.borrow() {
        return false;
    }

    let stop_requested = tokio::select! {
        () = sleep(duration) => false,
        _ = stopped.changed() => true,
    };

    !stop_requested && !*stopped.borrow()
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings(initial_delay: u64, interval: u64) -> SchedulerSettings {
        SchedulerSettings {
            name: "test".to_string(),
            initial_delay: Duration::from_secs(initial_delay),
            interval: Duration::from_secs(interval),
        }
    }

    fn counting_action(counter: Arc<AtomicUsize>) -> PollAction {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_after_delay_then_every_interval() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(settings(5, 10), counting_action(Arc::clone(&counter)), tx);

        assert!(scheduler.start().await);

        sleep(Duration::from_secs(3)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        // runs at 5s, 15s and 25s
        sleep(Duration::from_secs(27)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        scheduler.stop(true).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_is_measured_from_end_of_run() {
        let counter = Arc::new(AtomicUsize::new(0));
        let action: PollAction = {
            let counter = Arc::clone(&counter);
            Arc::new(move || {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_secs(8)).await;
                    Ok(())
                })
            })
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(settings(0, 10), action, tx);
        scheduler.start().await;

        // runs start at 0s and 18s
        sleep(Duration::from_secs(17)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        scheduler.stop(true).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_reported_and_loop_continues() {
        let action: PollAction = Arc::new(|| Box::pin(async { Err(anyhow!("boom")) }));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(settings(0, 10), action, tx);
        scheduler.start().await;

        let first = rx.recv().await.map(|e| e.to_string());
        let second = rx.recv().await.map(|e| e.to_string());
        assert_eq!(first.as_deref(), Some("boom"));
        assert_eq!(second.as_deref(), Some("boom"));
        assert!(scheduler.is_running().await);

        scheduler.stop(true).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_panics_are_caught() {
        let counter = Arc::new(AtomicUsize::new(0));
        let action: PollAction = {
            let counter = Arc::clone(&counter);
            Arc::new(move || {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("first run fails");
                    }
                    Ok(())
                })
            })
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(settings(0, 10), action, tx);
        scheduler.start().await;

        let error = rx.recv().await.map(|e| e.to_string()).unwrap_or_default();
        assert!(error.contains("first run fails"), "got: {error}");

        sleep(Duration::from_secs(15)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        scheduler.stop(true).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(settings(0, 10), counting_action(Arc::clone(&counter)), tx);

        assert!(scheduler.start().await);
        assert!(!scheduler.start().await);
        assert!(scheduler.is_running().await);

        scheduler.stop(true).await;
        scheduler.stop(true).await;
        scheduler.stop(false).await;
        assert!(!scheduler.is_running().await);

        // stopped schedulers can be started again
        assert!(scheduler.start().await);
        scheduler.stop(true).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_run_in_progress() {
        let finished = Arc::new(AtomicUsize::new(0));
        let action: PollAction = {
            let finished = Arc::clone(&finished);
            Arc::new(move || {
                let finished = Arc::clone(&finished);
                Box::pin(async move {
                    sleep(Duration::from_secs(5)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(settings(0, 60), action, tx);
        scheduler.start().await;

        sleep(Duration::from_secs(1)).await;
        scheduler.stop(true).await;

        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_runs_after_stop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(settings(0, 10), counting_action(Arc::clone(&counter)), tx);
        scheduler.start().await;

        sleep(Duration::from_secs(1)).await;
        scheduler.stop(false).await;
        sleep(Duration::from_secs(60)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop_without_wait_does_not_overlap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let action: PollAction = {
            let (in_flight, max_in_flight, runs) =
                (Arc::clone(&in_flight), Arc::clone(&max_in_flight), Arc::clone(&runs));
            Arc::new(move || {
                let (in_flight, max_in_flight, runs) =
                    (Arc::clone(&in_flight), Arc::clone(&max_in_flight), Arc::clone(&runs));
                Box::pin(async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_secs(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(settings(0, 60), action, tx);

        scheduler.start().await;
        sleep(Duration::from_secs(1)).await;

        // the first run is still sleeping
        scheduler.stop(false).await;
        assert!(scheduler.start().await);

        sleep(Duration::from_secs(10)).await;
        scheduler.stop(true).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*boxed), "static");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*boxed), "owned");

        let boxed: Box<dyn Any + Send> = Box::new(1_u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
