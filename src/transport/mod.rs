//! Queue transport contract
//!
//! The transport is a black box: it hands out jobs, accepts published jobs and
//! optionally takes acknowledgements. Retry, delivery guarantees and
//! connection management live behind this trait.

pub mod disque;
pub mod memory;

pub use disque::DisqueTransport;
pub use memory::MemoryQueue;

use async_trait::async_trait;
use bytes::Bytes;

use crate::protocol::OutboundJob;

/// One job handed out by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub queue: String,
    pub payload: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Queue transport closed")]
    Closed,

    #[error("Disque error: {0}")]
    Disque(#[from] redis::RedisError),
}

#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Pull up to `count` jobs from any of `queues`. May wait for a bounded
    /// time and return an empty batch.
    async fn fetch(&self, queues: &[String], count: usize) -> Result<Vec<Job>, TransportError>;

    async fn publish(&self, job: OutboundJob) -> Result<(), TransportError>;

    async fn acknowledge(&self, _job_ids: &[String]) -> Result<(), TransportError> {
        Ok(())
    }

    /// Release connections; later fetches return `TransportError::Closed`
    async fn disconnect(&self) {}
}
