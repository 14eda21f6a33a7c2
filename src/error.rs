//! Failures surfaced to the application's failure handler

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::error;

use crate::serializer::SerializerError;
use crate::transport::TransportError;

/// Everything the core reports instead of propagating. Malformed frames and
/// unregistered connections are protocol noise and never end up here.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Room {room_id} failed to execute: {source}")]
    RoomFailed {
        room_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Room {room_id} panicked during execute")]
    RoomPanicked { room_id: String },

    #[error("Room worker did not complete: {0}")]
    Worker(String),

    #[error("Handler failed for connection {connection_id}: {source}")]
    Handler {
        connection_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to serialize output for {destination}: {source}")]
    Serialize {
        destination: String,
        #[source]
        source: SerializerError,
    },

    #[error("Failed to publish to {destination}: {source}")]
    Publish {
        destination: String,
        #[source]
        source: TransportError,
    },

    #[error("Queue fetch failed: {0}")]
    Fetch(#[source] TransportError),

    #[error("Job acknowledgement failed: {0}")]
    Acknowledge(#[source] TransportError),

    #[error("Tick panicked: {0}")]
    TickPanicked(String),
}

impl ServerError {
    /// Room the failure belongs to, if it is a room execution failure
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Self::RoomFailed { room_id, .. } | Self::RoomPanicked { room_id } => Some(room_id),
            _ => None,
        }
    }
}

/// Application callback receiving every reported failure
pub type FailureHandler = Arc<dyn Fn(&ServerError) + Send + Sync>;

/// Failure channel shared by the intake, dispatcher, publisher and scheduler
#[derive(Clone)]
pub struct FailureReporter {
    handler: Option<FailureHandler>,
    reported: Arc<AtomicU64>,
}

impl FailureReporter {
    pub fn new(handler: impl Fn(&ServerError) + Send + Sync + 'static) -> Self {
        Self {
            handler: Some(Arc::new(handler)),
            reported: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Log only, no application callback
    pub fn logging() -> Self {
        Self {
            handler: None,
            reported: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn report(&self, failure: &ServerError) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        error!(error = %failure, "Server failure");

        if let Some(handler) = &self.handler {
            handler(failure);
        }
    }

    /// Total failures reported so far
    pub fn reported(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }
}

impl Default for FailureReporter {
    fn default() -> Self {
        Self::logging()
    }
}

impl std::fmt::Debug for FailureReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureReporter")
            .field("has_handler", &self.handler.is_some())
            .field("reported", &self.reported())
            .finish()
    }
}
