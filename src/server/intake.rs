//! Intake: the continuous fetch → decode → route loop

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::app::AppState;
use crate::error::ServerError;
use crate::protocol::{decode, DisconnectReason, DropReason, Frame, FrameEvent};
use crate::session::Session;
use crate::transport::TransportError;

/// Pause after a failed fetch before pulling again
const FETCH_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Receives message frames from registered connections
#[async_trait]
pub trait MessageSink: Send + Sync + 'static {
    /// `payload` is non-empty; for string messages it is valid UTF-8
    async fn accept(&self, connection_id: &str, session: Session, payload: Bytes);
}

/// What the intake did with one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Dropped(DropReason),
    Connected { room_id: String },
    /// Hooks declined to assign the connection
    ConnectIgnored,
    Disconnected,
    Delivered { room_id: String },
    /// Message from a connection with no registry entry
    Unregistered,
    EmptyPayload,
    InvalidText,
}

pub struct Intake<K: MessageSink> {
    state: AppState,
    sink: Arc<K>,
    queues: Vec<String>,
    batch_size: usize,
}

impl<K: MessageSink> Intake<K> {
    pub fn new(state: AppState, sink: Arc<K>, queues: Vec<String>, batch_size: usize) -> Self {
        Self {
            state,
            sink,
            queues,
            batch_size,
        }
    }

    /// Pull jobs until the transport closes. Fetched jobs are acknowledged
    /// after they have been routed.
    pub async fn run(self) {
        info!(queues = ?self.queues, batch_size = self.batch_size, "Intake started");

        loop {
            let jobs = match self
                .state
                .transport
                .fetch(&self.queues, self.batch_size)
                .await
            {
                Ok(jobs) => jobs,
                Err(TransportError::Closed) => break,
                Err(e) => {
                    self.state.failures.report(&ServerError::Fetch(e));
                    tokio::time::sleep(FETCH_RETRY_DELAY).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                continue;
            }

            let mut job_ids = Vec::with_capacity(jobs.len());
            for job in jobs {
                self.process(&job.payload).await;
                job_ids.push(job.id);
            }

            if let Err(e) = self.state.transport.acknowledge(&job_ids).await {
                self.state.failures.report(&ServerError::Acknowledge(e));
            }
        }

        info!("Intake stopped, transport closed");
    }

    /// Decode one job payload and route it
    pub async fn process(&self, payload: &Bytes) -> Disposition {
        let frame = match decode(payload) {
            Ok(frame) => frame,
            Err(reason) => {
                trace!(reason = %reason, "Dropping malformed frame");
                return Disposition::Dropped(reason);
            }
        };

        match frame.event {
            FrameEvent::Connect => self.on_connect(&frame),
            FrameEvent::StringMessage | FrameEvent::BinaryMessage => self.on_message(frame).await,
            FrameEvent::DisconnectIntentional => {
                self.on_disconnect(&frame, DisconnectReason::Intentional)
            }
            FrameEvent::DisconnectAccidental => {
                self.on_disconnect(&frame, DisconnectReason::Accidental)
            }
        }
    }

    fn on_connect(&self, frame: &Frame) -> Disposition {
        let assigned = self.state.hooks.on_connect(&frame.connection_id, &frame.payload);
        let Some(session) = assigned else {
            debug!(connection_id = %frame.connection_id, "Connection left unassigned");
            return Disposition::ConnectIgnored;
        };

        let room_id = session.room_id.clone();
        self.state
            .registry
            .register(&frame.connection_id, session.room_id, session.user_id);

        debug!(connection_id = %frame.connection_id, room_id = %room_id, "Connection registered");
        Disposition::Connected { room_id }
    }

    async fn on_message(&self, frame: Frame) -> Disposition {
        let Some(payload) = frame.message_payload().cloned() else {
            return Disposition::EmptyPayload;
        };

        if frame.event == FrameEvent::StringMessage && std::str::from_utf8(&payload).is_err() {
            debug!(
                connection_id = %frame.connection_id,
                "Dropping string message with invalid UTF-8"
            );
            return Disposition::InvalidText;
        }

        let Some(session) = self.state.registry.session(&frame.connection_id) else {
            debug!(
                connection_id = %frame.connection_id,
                "Dropping message from unregistered connection"
            );
            return Disposition::Unregistered;
        };

        let room_id = session.room_id.clone();
        self.sink.accept(&frame.connection_id, session, payload).await;
        Disposition::Delivered { room_id }
    }

    fn on_disconnect(&self, frame: &Frame, reason: DisconnectReason) -> Disposition {
        let session = self.state.registry.unregister(&frame.connection_id);
        self.state
            .hooks
            .on_disconnect(&frame.connection_id, session.as_ref(), reason);

        debug!(connection_id = %frame.connection_id, reason = %reason, "Connection closed");
        Disposition::Disconnected
    }
}
