//! Aggregated mode: requests batch per room, rooms run in parallel each tick

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{FailureReporter, ServerError};
use crate::game::{
    BattleDispatcher, GameContext, PublishReport, RequestAggregator, ResponsePublisher, RoomTable,
    TickReport,
};
use crate::serializer::Serializer;
use crate::session::Session;
use crate::transport::QueueTransport;

use super::intake::MessageSink;
use super::scheduler::TickHandler;

/// Deserializes message payloads into room requests and queues them
pub struct AggregatingSink<C: GameContext, S> {
    aggregator: Arc<RequestAggregator<C::Request>>,
    serializer: Arc<S>,
}

#[async_trait]
impl<C: GameContext, S: Serializer> MessageSink for AggregatingSink<C, S> {
    async fn accept(&self, connection_id: &str, session: Session, payload: Bytes) {
        match self.serializer.deserialize::<C::Request>(&payload) {
            Ok(request) => {
                trace!(
                    connection_id = %connection_id,
                    room_id = %session.room_id,
                    "Request aggregated"
                );
                self.aggregator.add(&session.room_id, request);
            }
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "Dropping undecodable request");
            }
        }
    }
}

/// One tick of aggregated mode: dispatch, report room failures, publish
pub struct RoomTicker<C: GameContext, S> {
    dispatcher: BattleDispatcher<C>,
    publisher: ResponsePublisher<S>,
    serializer: Arc<S>,
    failures: FailureReporter,
}

impl<C: GameContext, S: Serializer> RoomTicker<C, S> {
    pub fn new(
        rooms: Arc<RoomTable<C>>,
        serializer: S,
        transport: Arc<dyn QueueTransport>,
        failures: FailureReporter,
        max_parallel_rooms: usize,
    ) -> Self {
        let serializer = Arc::new(serializer);

        Self {
            dispatcher: BattleDispatcher::new(rooms, max_parallel_rooms),
            publisher: ResponsePublisher::new(serializer.clone(), transport, failures.clone()),
            serializer,
            failures,
        }
    }

    /// Sink feeding this ticker's aggregator
    pub fn sink(&self) -> AggregatingSink<C, S> {
        AggregatingSink {
            aggregator: self.dispatcher.aggregator().clone(),
            serializer: self.serializer.clone(),
        }
    }

    pub fn dispatcher(&self) -> &BattleDispatcher<C> {
        &self.dispatcher
    }

    /// Run one tick and publish its outputs
    pub async fn tick(&self) -> (TickReport, PublishReport) {
        let report = self.dispatcher.run_tick().await;

        for failure in report.failures.iter() {
            self.failures.report(failure);
        }

        let published = self
            .publisher
            .publish_all(self.dispatcher.responses())
            .await;

        if !report.executed.is_empty() {
            debug!(
                executed = report.executed.len(),
                missing = report.missing.len(),
                published = published.published,
                "Tick complete"
            );
        }

        (report, published)
    }
}

#[async_trait]
impl<C: GameContext, S: Serializer> TickHandler for RoomTicker<C, S> {
    async fn on_tick(&self) -> Result<(), ServerError> {
        self.tick().await;
        Ok(())
    }
}
