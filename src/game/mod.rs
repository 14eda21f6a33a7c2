//! Room-scoped game execution

pub mod aggregator;
pub mod dispatcher;
pub mod publisher;
pub mod rooms;

pub use aggregator::RequestAggregator;
pub use dispatcher::{BattleDispatcher, TickReport};
pub use publisher::{PublishReport, ResponseBatch, ResponsePublisher};
pub use rooms::RoomTable;

use serde::{de::DeserializeOwned, Serialize};

/// Application game state for one room.
///
/// `execute` receives every request aggregated for the room since the last
/// tick, in arrival order, and returns the pushes to publish to the room.
/// It runs on a blocking worker thread and may block.
pub trait GameContext: Send + 'static {
    type Request: DeserializeOwned + Send + Sync + 'static;
    type Push: Serialize + Send + Sync + 'static;

    fn execute(&mut self, requests: Vec<Self::Request>) -> anyhow::Result<Vec<Self::Push>>;
}
