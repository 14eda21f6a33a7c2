//! Per-room request accumulation between ticks

use dashmap::DashMap;
use std::collections::HashMap;

/// Requests collected since the last tick, keyed by room id.
///
/// Producers call [`add`](Self::add) from the intake while the tick consumer
/// calls [`drain_all`](Self::drain_all). A request added while a drain is in
/// progress ends up in either that drain or the next one, never both.
pub struct RequestAggregator<R> {
    pending: DashMap<String, Vec<R>>,
}

impl<R> RequestAggregator<R> {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Append a request to the room's list, creating it if absent
    pub fn add(&self, room_id: &str, request: R) {
        if let Some(mut list) = self.pending.get_mut(room_id) {
            list.push(request);
            return;
        }

        self.pending
            .entry(room_id.to_string())
            .or_default()
            .push(request);
    }

    /// Take everything accumulated so far and leave the aggregator empty
    pub fn drain_all(&self) -> HashMap<String, Vec<R>> {
        let rooms: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();

        rooms
            .into_iter()
            .filter_map(|room_id| self.pending.remove(&room_id))
            .filter(|(_, requests)| !requests.is_empty())
            .collect()
    }

    /// Pending requests across all rooms
    pub fn len(&self) -> usize {
        self.pending.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn room_count(&self) -> usize {
        self.pending.len()
    }
}

impl<R> Default for RequestAggregator<R> {
    fn default() -> Self {
        Self::new()
    }
}
