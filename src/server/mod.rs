//! The two operating profiles over one core
//!
//! Both profiles share the frame codec, the connection registry and the
//! intake loop. Aggregated mode batches requests per room and executes them on
//! the tick scheduler; direct mode answers every message as it arrives.

pub mod aggregated;
pub mod direct;
pub mod intake;
pub mod scheduler;

pub use aggregated::{AggregatingSink, RoomTicker};
pub use direct::{DirectHandler, DirectSink};
pub use intake::{Disposition, Intake, MessageSink};
pub use scheduler::{
    FireOutcome, SchedulerError, SchedulerState, TickHandler, TickScheduler, TickStats,
    TickStatsSnapshot,
};

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::app::AppState;
use crate::config::ServerMode;
use crate::game::{GameContext, RoomTable};
use crate::serializer::Serializer;

/// Runtime knobs shared by both profiles
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub tick_interval: Duration,
    pub queues: Vec<String>,
    pub fetch_batch_size: usize,
    /// 0 runs every room of a tick at once
    pub max_parallel_rooms: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(15),
            queues: vec!["room-server".to_string()],
            fetch_batch_size: 100,
            max_parallel_rooms: 0,
        }
    }
}

type IntakeSlot = Arc<Mutex<Option<JoinHandle<()>>>>;

pub struct Server {
    state: AppState,
    mode: ServerMode,
    pending_intake: Option<BoxFuture<'static, ()>>,
    intake: IntakeSlot,
    scheduler: Option<TickScheduler>,
}

impl Server {
    /// Aggregated mode over a pre-populated room table
    pub fn aggregated<C, S>(
        state: AppState,
        settings: ServerSettings,
        rooms: Arc<RoomTable<C>>,
        serializer: S,
    ) -> Self
    where
        C: GameContext,
        S: Serializer,
    {
        let ticker = Arc::new(RoomTicker::new(
            rooms,
            serializer,
            state.transport.clone(),
            state.failures.clone(),
            settings.max_parallel_rooms,
        ));

        let intake = Intake::new(
            state.clone(),
            Arc::new(ticker.sink()),
            settings.queues,
            settings.fetch_batch_size,
        );

        let slot = IntakeSlot::default();
        let teardown_slot = slot.clone();
        let scheduler = TickScheduler::new(settings.tick_interval, ticker, state.failures.clone())
            .with_teardown(move || abort_intake(&teardown_slot));

        Self {
            state,
            mode: ServerMode::Aggregated,
            pending_intake: Some(intake.run().boxed()),
            intake: slot,
            scheduler: Some(scheduler),
        }
    }

    /// Direct mode: no aggregation, no scheduler
    pub fn direct<H, S>(
        state: AppState,
        settings: ServerSettings,
        handler: H,
        serializer: S,
    ) -> Self
    where
        H: DirectHandler,
        S: Serializer,
    {
        let sink = DirectSink::new(
            handler,
            serializer,
            state.transport.clone(),
            state.failures.clone(),
        );

        let intake = Intake::new(
            state.clone(),
            Arc::new(sink),
            settings.queues,
            settings.fetch_batch_size,
        );

        Self {
            state,
            mode: ServerMode::Direct,
            pending_intake: Some(intake.run().boxed()),
            intake: IntakeSlot::default(),
            scheduler: None,
        }
    }

    /// Start pulling jobs and, in aggregated mode, arm the tick timer
    pub fn begin(&mut self) -> Result<(), SchedulerError> {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.begin()?;
        }

        let Some(intake) = self.pending_intake.take() else {
            return Err(SchedulerError::AlreadyRunning);
        };
        *self.intake.lock() = Some(tokio::spawn(intake));

        info!(mode = %self.mode, "Server started");
        Ok(())
    }

    /// Stop ticking, stop the intake and release the transport. A tick that
    /// is already executing is not awaited.
    pub async fn end(&mut self) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.end();
        }
        abort_intake(&self.intake);
        self.pending_intake = None;

        self.state.transport.disconnect().await;
        info!(mode = %self.mode, "Server stopped");
    }

    pub fn mode(&self) -> ServerMode {
        self.mode
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Only aggregated mode ticks
    pub fn tick_stats(&self) -> Option<Arc<TickStats>> {
        self.scheduler.as_ref().map(TickScheduler::stats)
    }
}

fn abort_intake(slot: &IntakeSlot) {
    if let Some(handle) = slot.lock().take() {
        handle.abort();
    }
}
