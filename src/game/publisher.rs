//! Outbound publishing of per-room tick results

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use futures::future::join_all;
use tracing::debug;

use crate::error::{FailureReporter, ServerError};
use crate::protocol::encode;
use crate::serializer::Serializer;
use crate::transport::QueueTransport;

/// Outputs of the latest tick, keyed by room id
pub struct ResponseBatch<P> {
    entries: DashMap<String, Vec<P>>,
}

impl<P> ResponseBatch<P> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Store a room's outputs, overwriting anything already there
    pub fn store(&self, room_id: impl Into<String>, pushes: Vec<P>) {
        self.entries.insert(room_id.into(), pushes);
    }

    /// Take every entry and leave the batch empty
    pub fn drain(&self) -> Vec<(String, Vec<P>)> {
        let rooms: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        rooms
            .into_iter()
            .filter_map(|room_id| self.entries.remove(&room_id))
            .collect()
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.entries.contains_key(room_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<P> Default for ResponseBatch<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one publish pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: usize,
    pub failed: usize,
}

/// Serializes each room's outputs and publishes one job per room, with the
/// room id as destination
pub struct ResponsePublisher<S> {
    serializer: Arc<S>,
    transport: Arc<dyn QueueTransport>,
    failures: FailureReporter,
}

impl<S: Serializer> ResponsePublisher<S> {
    pub fn new(
        serializer: Arc<S>,
        transport: Arc<dyn QueueTransport>,
        failures: FailureReporter,
    ) -> Self {
        Self {
            serializer,
            transport,
            failures,
        }
    }

    /// Publish every entry of the batch. The batch is emptied whether or not
    /// individual publishes succeed; failures go to the failure reporter.
    pub async fn publish_all<P: serde::Serialize>(
        &self,
        batch: &ResponseBatch<P>,
    ) -> PublishReport {
        let entries = batch.drain();
        if entries.is_empty() {
            return PublishReport::default();
        }

        let sends = entries
            .iter()
            .map(|(room_id, pushes)| self.publish_room(room_id, pushes));
        let results = join_all(sends).await;

        let mut report = PublishReport::default();
        for result in results {
            match result {
                Ok(()) => report.published += 1,
                Err(failure) => {
                    report.failed += 1;
                    self.failures.report(&failure);
                }
            }
        }

        debug!(
            published = report.published,
            failed = report.failed,
            "Published room responses"
        );

        report
    }

    async fn publish_room<P: serde::Serialize>(
        &self,
        room_id: &str,
        pushes: &[P],
    ) -> Result<(), ServerError> {
        let payload = self
            .serializer
            .serialize(pushes)
            .map_err(|source| ServerError::Serialize {
                destination: room_id.to_string(),
                source,
            })?;

        self.transport
            .publish(encode(room_id, Bytes::from(payload)))
            .await
            .map_err(|source| ServerError::Publish {
                destination: room_id.to_string(),
                source,
            })
    }
}
