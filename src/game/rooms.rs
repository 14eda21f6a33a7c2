//! Room id → game context table

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use super::GameContext;

/// Shared handle to a room's context
pub type RoomHandle<C> = Arc<Mutex<C>>;

/// Table of active rooms. Populated by whoever owns room lifecycle; the
/// dispatcher only reads it.
pub struct RoomTable<C: GameContext> {
    rooms: DashMap<String, RoomHandle<C>>,
}

impl<C: GameContext> RoomTable<C> {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Install a context, replacing and returning any previous one
    pub fn insert(&self, room_id: impl Into<String>, context: C) -> Option<RoomHandle<C>> {
        self.rooms
            .insert(room_id.into(), Arc::new(Mutex::new(context)))
    }

    pub fn get(&self, room_id: &str) -> Option<RoomHandle<C>> {
        self.rooms.get(room_id).map(|r| r.value().clone())
    }

    pub fn remove(&self, room_id: &str) -> Option<RoomHandle<C>> {
        self.rooms.remove(room_id).map(|(_, h)| h)
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Room ids in sorted order
    pub fn room_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rooms.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl<C: GameContext> Default for RoomTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);

    impl GameContext for Counter {
        type Request = u32;
        type Push = u32;

        fn execute(&mut self, requests: Vec<u32>) -> anyhow::Result<Vec<u32>> {
            self.0 += requests.iter().sum::<u32>();
            Ok(vec![self.0])
        }
    }

    #[test]
    fn insert_get_remove() {
        let table = RoomTable::new();
        assert!(table.insert("b", Counter(0)).is_none());
        table.insert("a", Counter(5));

        assert!(table.contains("a"));
        assert_eq!(table.room_ids(), vec!["a", "b"]);

        let handle = table.get("a").unwrap();
        assert_eq!(handle.lock().execute(vec![1, 2]).unwrap(), vec![8]);

        assert!(table.remove("a").is_some());
        assert!(!table.contains("a"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn replacing_a_room_returns_the_old_context() {
        let table = RoomTable::new();
        table.insert("a", Counter(1));
        let old = table.insert("a", Counter(2)).unwrap();
        assert_eq!(old.lock().0, 1);
        assert_eq!(table.get("a").unwrap().lock().0, 2);
    }
}
