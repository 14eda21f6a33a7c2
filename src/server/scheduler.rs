//! Periodic, non-reentrant tick scheduler
//!
//! The timer fires on a fixed interval independent of how long ticks take.
//! A fire that lands while a tick is still running is dropped: no queueing,
//! no catch-up.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::error::{FailureReporter, ServerError};
use crate::util::time::Timer;

/// Work performed on every accepted fire
#[async_trait]
pub trait TickHandler: Send + Sync + 'static {
    async fn on_tick(&self) -> Result<(), ServerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Started,
    /// A tick was already in flight
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler has been stopped")]
    Stopped,

    #[error("Tick interval must be greater than zero")]
    ZeroInterval,
}

/// Tick counters
#[derive(Debug, Default)]
pub struct TickStats {
    started: AtomicU64,
    skipped: AtomicU64,
    faulted: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickStatsSnapshot {
    pub started: u64,
    pub skipped: u64,
    pub faulted: u64,
}

impl TickStats {
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Ticks that returned an error or panicked
    pub fn faulted(&self) -> u64 {
        self.faulted.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TickStatsSnapshot {
        TickStatsSnapshot {
            started: self.started(),
            skipped: self.skipped(),
            faulted: self.faulted(),
        }
    }
}

struct Shared {
    handler: Arc<dyn TickHandler>,
    in_flight: AtomicBool,
    stats: Arc<TickStats>,
    failures: FailureReporter,
}

impl Shared {
    fn fire(self: &Arc<Self>) -> FireOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            trace!("Tick still running, skipping fire");
            return FireOutcome::Skipped;
        }

        self.stats.started.fetch_add(1, Ordering::Relaxed);
        let guard = InFlightGuard(self.clone());

        tokio::spawn(async move {
            let shared = guard.0.clone();
            let timer = Timer::new();

            let outcome = AssertUnwindSafe(shared.handler.on_tick())
                .catch_unwind()
                .await;

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(failure)) => Some(failure),
                Err(panic) => Some(ServerError::TickPanicked(panic_message(panic.as_ref()))),
            };

            if let Some(failure) = failure {
                shared.stats.faulted.fetch_add(1, Ordering::Relaxed);
                shared.failures.report(&failure);
            }

            trace!(elapsed_micros = timer.elapsed_micros(), "Tick finished");
            drop(guard);
        });

        FireOutcome::Started
    }
}

/// Clears the in-flight flag however the tick task ends
struct InFlightGuard(Arc<Shared>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Drives a [`TickHandler`] on a fixed interval: `Idle → Running → Stopped`
pub struct TickScheduler {
    period: Duration,
    shared: Arc<Shared>,
    state: SchedulerState,
    timer: Option<JoinHandle<()>>,
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl TickScheduler {
    pub fn new(period: Duration, handler: Arc<dyn TickHandler>, failures: FailureReporter) -> Self {
        Self {
            period,
            shared: Arc::new(Shared {
                handler,
                in_flight: AtomicBool::new(false),
                stats: Arc::new(TickStats::default()),
                failures,
            }),
            state: SchedulerState::Idle,
            timer: None,
            teardown: None,
        }
    }

    /// Hook run by [`end`](Self::end) once the timer is disarmed
    pub fn with_teardown(mut self, teardown: impl FnOnce() + Send + 'static) -> Self {
        self.teardown = Some(Box::new(teardown));
        self
    }

    /// Arm the timer. The first fire happens immediately.
    pub fn begin(&mut self) -> Result<(), SchedulerError> {
        match self.state {
            SchedulerState::Running => return Err(SchedulerError::AlreadyRunning),
            SchedulerState::Stopped => return Err(SchedulerError::Stopped),
            SchedulerState::Idle => {}
        }

        if self.period.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        let shared = self.shared.clone();
        let period = self.period;

        self.timer = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                shared.fire();
            }
        }));
        self.state = SchedulerState::Running;

        info!(interval_ms = period.as_millis() as u64, "Tick scheduler started");
        Ok(())
    }

    /// Disarm the timer and run the teardown hook. An in-flight tick is not
    /// awaited and may still be finishing while teardown runs.
    pub fn end(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        if self.state != SchedulerState::Stopped {
            self.state = SchedulerState::Stopped;
            info!(
                ticks = self.shared.stats.started(),
                skipped = self.shared.stats.skipped(),
                "Tick scheduler stopped"
            );
        }

        if let Some(teardown) = self.teardown.take() {
            debug!("Running scheduler teardown");
            teardown();
        }
    }

    /// Fire once by hand, with the same skip-if-busy rule as the timer
    pub fn fire(&self) -> FireOutcome {
        self.shared.fire()
    }

    pub fn is_ticking(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn stats(&self) -> Arc<TickStats> {
        self.shared.stats.clone()
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
