//! Direct mode: every message is answered on its own, immediately

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{FailureReporter, ServerError};
use crate::protocol::encode;
use crate::serializer::Serializer;
use crate::session::Session;
use crate::transport::QueueTransport;

use super::intake::MessageSink;

/// Stateless request/response logic
pub trait DirectHandler: Send + Sync + 'static {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send + Sync;

    /// `None` sends no reply
    fn respond(
        &self,
        session: &Session,
        request: Self::Request,
    ) -> anyhow::Result<Option<Self::Response>>;
}

/// Replies are published with the originating connection id as destination
pub struct DirectSink<H, S> {
    handler: Arc<H>,
    serializer: Arc<S>,
    transport: Arc<dyn QueueTransport>,
    failures: FailureReporter,
}

impl<H: DirectHandler, S: Serializer> DirectSink<H, S> {
    pub fn new(
        handler: H,
        serializer: S,
        transport: Arc<dyn QueueTransport>,
        failures: FailureReporter,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            serializer: Arc::new(serializer),
            transport,
            failures,
        }
    }

    async fn reply(
        &self,
        connection_id: &str,
        session: &Session,
        payload: &[u8],
    ) -> Result<(), ServerError> {
        let request: H::Request = match self.serializer.deserialize(payload) {
            Ok(request) => request,
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "Dropping undecodable request");
                return Ok(());
            }
        };

        let response = self
            .handler
            .respond(session, request)
            .map_err(|source| ServerError::Handler {
                connection_id: connection_id.to_string(),
                source,
            })?;

        let Some(response) = response else {
            return Ok(());
        };

        let body = self
            .serializer
            .serialize(&response)
            .map_err(|source| ServerError::Serialize {
                destination: connection_id.to_string(),
                source,
            })?;

        self.transport
            .publish(encode(connection_id, Bytes::from(body)))
            .await
            .map_err(|source| ServerError::Publish {
                destination: connection_id.to_string(),
                source,
            })
    }
}

#[async_trait]
impl<H: DirectHandler, S: Serializer> MessageSink for DirectSink<H, S> {
    async fn accept(&self, connection_id: &str, session: Session, payload: Bytes) {
        if let Err(failure) = self.reply(connection_id, &session, &payload).await {
            self.failures.report(&failure);
        }
    }
}
