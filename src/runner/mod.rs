//! Background worker driving the pipeline on wall-clock triggers
//!
//! One dedicated worker task polls at a fixed tick. Each tick fires the
//! daily cycle when its wall-clock time passes (at most once per day), defers
//! to the orchestrator's interval gate for trend-scan-only refreshes, and
//! finishes by executing any due scheduled posts.
//!
//! Cycles never run concurrently: everything happens sequentially on the one
//! worker. Shutdown is a watch token checked by `tokio::select!`, so `stop()`
//! is prompt and race-free; in-flight `Pending` posts are simply revisited on
//! the next `start()`.

use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dispatch::PostDispatcher;
use crate::orchestrator::CycleOrchestrator;
use crate::utils::Clock;

/// Timing knobs for the background worker
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Poll tick between trigger evaluations
    pub poll_tick: Duration,

    /// Wall-clock time of the daily cycle trigger
    pub daily_cycle_time: NaiveTime,

    /// Bound on waiting for the worker to exit during `stop()`
    pub join_timeout: Duration,
}

impl RunnerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_tick: Duration::from_secs(config.schedule.poll_tick_secs),
            daily_cycle_time: config.daily_cycle_time(),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Owns the worker task and the pipeline lifecycle
pub struct BackgroundRunner {
    config: RunnerConfig,
    orchestrator: Arc<CycleOrchestrator>,
    dispatcher: Arc<PostDispatcher>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Sender<bool>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundRunner {
    pub fn new(
        config: RunnerConfig,
        orchestrator: Arc<CycleOrchestrator>,
        dispatcher: Arc<PostDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            orchestrator,
            dispatcher,
            clock,
            shutdown,
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Start the worker. Idempotent: a second call while running is a no-op.
    ///
    /// The worker runs an initial cycle immediately, then evaluates triggers
    /// every poll tick.
    pub fn start(&self) {
        let mut handle = self.handle.lock().expect("runner lock poisoned");
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("Background runner already started");
            return;
        }

        // send_replace updates the token even when no receiver is alive yet,
        // so a stop() from a previous run cannot leak into this one.
        self.shutdown.send_replace(false);
        let mut shutdown_rx = self.shutdown.subscribe();

        let orchestrator = self.orchestrator.clone();
        let dispatcher = self.dispatcher.clone();
        let clock = self.clock.clone();
        let poll_tick = self.config.poll_tick;
        let daily_cycle_time = self.config.daily_cycle_time;

        *handle = Some(tokio::spawn(async move {
            info!("Background worker started");

            // Initial cycle right away
            run_cycle(&orchestrator).await;
            let mut last_daily_run: Option<NaiveDate> = None;

            let mut ticker = tokio::time::interval(poll_tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = clock.now();
                        let today = now.date_naive();

                        if now.time() >= daily_cycle_time && last_daily_run != Some(today) {
                            debug!(date = %today, "Daily cycle trigger fired");
                            run_cycle(&orchestrator).await;
                            last_daily_run = Some(today);
                        } else {
                            // Trend-scan-only trigger; the orchestrator's
                            // persisted interval decides whether it runs.
                            match orchestrator.scan_trends_if_due().await {
                                Ok(true) => debug!("Trend-only refresh ran"),
                                Ok(false) => {}
                                Err(e) => error!(error = %e, "Trend-only refresh failed"),
                            }
                        }

                        if let Err(e) = dispatcher.process_due().await {
                            error!(error = %e, "Due-post processing failed");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        // A dropped sender also means shutdown
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Background worker exiting");
        }));
    }

    /// Signal the worker to exit and join it with a bounded timeout.
    ///
    /// Safe to call from any thread. Pending scheduled posts are left
    /// untouched for the next `start()`.
    pub async fn stop(&self) {
        let handle = {
            let mut guard = self.handle.lock().expect("runner lock poisoned");
            guard.take()
        };

        let Some(handle) = handle else {
            warn!("Background runner not started");
            return;
        };

        self.shutdown.send_replace(true);

        match tokio::time::timeout(self.config.join_timeout, handle).await {
            Ok(_) => info!("Background runner stopped"),
            Err(_) => {
                // The worker is mid-call on an external collaborator. It is
                // detached here and exits at its next shutdown check; every
                // post-log transition is already persisted, so no record is
                // left half-updated.
                warn!(
                    timeout_secs = self.config.join_timeout.as_secs(),
                    "Worker did not exit in time, detaching"
                );
            }
        }
    }

    /// Whether the worker task is currently alive
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .expect("runner lock poisoned")
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

async fn run_cycle(orchestrator: &CycleOrchestrator) {
    match orchestrator.run_daily_cycle().await {
        Ok(report) => {
            info!(
                scheduled = report.posts_scheduled,
                rejected = report.posts_rejected,
                generated = report.content_generated,
                "Cycle finished"
            );
        }
        Err(e) => error!(error = %e, "Cycle failed"),
    }
}
