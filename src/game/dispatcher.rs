//! Battle dispatcher: one tick of room execution

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::ServerError;

use super::{GameContext, RequestAggregator, ResponseBatch, RoomTable};

/// What happened to the rooms of one tick
#[derive(Debug, Default)]
pub struct TickReport {
    /// Rooms whose outputs were stored for publishing
    pub executed: Vec<String>,
    /// Rooms with requests but no game context
    pub missing: Vec<String>,
    /// Rooms not started because an earlier room failed
    pub aborted: Vec<String>,
    pub failures: Vec<ServerError>,
}

impl TickReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_empty()
    }
}

/// Drains the aggregator each tick and runs the affected rooms in parallel.
///
/// Rooms are dispatched in room-id order onto blocking worker threads, at
/// most `max_parallel_rooms` at once (0 means no limit). When a room fails,
/// rooms still waiting for a worker slot are not started; rooms already
/// running finish and keep their outputs.
pub struct BattleDispatcher<C: GameContext> {
    rooms: Arc<RoomTable<C>>,
    aggregator: Arc<RequestAggregator<C::Request>>,
    responses: Arc<ResponseBatch<C::Push>>,
    max_parallel_rooms: usize,
}

impl<C: GameContext> BattleDispatcher<C> {
    pub fn new(rooms: Arc<RoomTable<C>>, max_parallel_rooms: usize) -> Self {
        Self {
            rooms,
            aggregator: Arc::new(RequestAggregator::new()),
            responses: Arc::new(ResponseBatch::new()),
            max_parallel_rooms,
        }
    }

    pub fn rooms(&self) -> &Arc<RoomTable<C>> {
        &self.rooms
    }

    pub fn aggregator(&self) -> &Arc<RequestAggregator<C::Request>> {
        &self.aggregator
    }

    pub fn responses(&self) -> &Arc<ResponseBatch<C::Push>> {
        &self.responses
    }

    /// Run one tick over a snapshot of the aggregated requests
    pub async fn run_tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let mut work: Vec<(String, Vec<C::Request>)> =
            self.aggregator.drain_all().into_iter().collect();
        if work.is_empty() {
            return report;
        }
        work.sort_by(|a, b| a.0.cmp(&b.0));

        let bounded = self.max_parallel_rooms > 0;
        let limit = if bounded {
            self.max_parallel_rooms
        } else {
            work.len()
        };
        let slots = Arc::new(Semaphore::new(limit));
        let aborted = Arc::new(AtomicBool::new(false));
        let mut running = JoinSet::new();

        for (room_id, requests) in work {
            let Some(context) = self.rooms.get(&room_id) else {
                debug!(
                    room_id = %room_id,
                    dropped = requests.len(),
                    "No game context for room, skipping"
                );
                report.missing.push(room_id);
                continue;
            };

            let slot = slots
                .clone()
                .acquire_owned()
                .await
                .expect("tick semaphore is never closed");

            // Unbounded ticks start every room together, so only a bounded
            // tick has rooms left to abort
            if bounded && aborted.load(Ordering::Acquire) {
                report.aborted.push(room_id);
                continue;
            }

            let aborted = aborted.clone();
            running.spawn_blocking(move || {
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| context.lock().execute(requests)));

                let result = match outcome {
                    Ok(Ok(pushes)) => Ok(pushes),
                    Ok(Err(source)) => Err(ServerError::RoomFailed {
                        room_id: room_id.clone(),
                        source,
                    }),
                    Err(_) => Err(ServerError::RoomPanicked {
                        room_id: room_id.clone(),
                    }),
                };

                // Flag before the slot frees up so a waiting room sees it
                if result.is_err() {
                    aborted.store(true, Ordering::Release);
                }
                drop(slot);

                (room_id, result)
            });
        }

        while let Some(joined) = running.join_next().await {
            match joined {
                Ok((room_id, Ok(pushes))) => {
                    self.responses.store(room_id.clone(), pushes);
                    report.executed.push(room_id);
                }
                Ok((room_id, Err(failure))) => {
                    warn!(room_id = %room_id, error = %failure, "Room execution failed");
                    report.failures.push(failure);
                }
                Err(join_error) => {
                    report
                        .failures
                        .push(ServerError::Worker(join_error.to_string()));
                }
            }
        }

        if !report.aborted.is_empty() {
            warn!(
                aborted = report.aborted.len(),
                "Tick aborted remaining rooms after a failure"
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Echoes its requests, fails on request `"fail"`, panics on `"panic"`
    struct Echo {
        delay: Duration,
    }

    impl Echo {
        fn new() -> Self {
            Self {
                delay: Duration::ZERO,
            }
        }
    }

    impl GameContext for Echo {
        type Request = String;
        type Push = String;

        fn execute(&mut self, requests: Vec<String>) -> anyhow::Result<Vec<String>> {
            std::thread::sleep(self.delay);
            if requests.iter().any(|r| r == "panic") {
                panic!("room logic panicked");
            }
            if requests.iter().any(|r| r == "fail") {
                anyhow::bail!("room logic failed");
            }
            Ok(requests.into_iter().map(|r| format!("ok:{r}")).collect())
        }
    }

    fn dispatcher(rooms: &[&str], max_parallel: usize) -> BattleDispatcher<Echo> {
        let table = Arc::new(RoomTable::new());
        for room in rooms {
            table.insert(*room, Echo::new());
        }
        BattleDispatcher::new(table, max_parallel)
    }

    #[tokio::test]
    async fn executes_each_room_with_its_requests_in_order() {
        let dispatcher = dispatcher(&["r1", "r2"], 0);
        dispatcher.aggregator().add("r1", "a".to_string());
        dispatcher.aggregator().add("r1", "b".to_string());
        dispatcher.aggregator().add("r2", "c".to_string());

        let report = dispatcher.run_tick().await;
        assert!(report.is_clean());
        assert_eq!(report.executed.len(), 2);
        assert!(dispatcher.aggregator().is_empty());

        let mut entries = dispatcher.responses().drain();
        entries.sort();
        assert_eq!(
            entries,
            vec![
                ("r1".to_string(), vec!["ok:a".to_string(), "ok:b".to_string()]),
                ("r2".to_string(), vec!["ok:c".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn rooms_without_context_are_skipped() {
        let dispatcher = dispatcher(&["known"], 0);
        dispatcher.aggregator().add("unknown", "x".to_string());
        dispatcher.aggregator().add("known", "y".to_string());

        let report = dispatcher.run_tick().await;
        assert_eq!(report.missing, vec!["unknown"]);
        assert_eq!(report.executed, vec!["known"]);
        assert!(report.failures.is_empty());
        assert!(dispatcher.aggregator().is_empty());
    }

    #[tokio::test]
    async fn failing_room_does_not_cost_in_flight_siblings() {
        let dispatcher = dispatcher(&["r1", "r2"], 0);
        dispatcher.aggregator().add("r1", "fail".to_string());
        dispatcher.aggregator().add("r2", "fine".to_string());

        let report = dispatcher.run_tick().await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].room_id(), Some("r1"));
        assert_eq!(report.executed, vec!["r2"]);
        assert!(dispatcher.responses().contains("r2"));
        assert!(!dispatcher.responses().contains("r1"));
        assert!(dispatcher.aggregator().is_empty());
    }

    #[tokio::test]
    async fn failure_stops_rooms_waiting_for_a_slot() {
        let dispatcher = dispatcher(&["a", "b", "c"], 1);
        dispatcher.aggregator().add("a", "fail".to_string());
        dispatcher.aggregator().add("b", "x".to_string());
        dispatcher.aggregator().add("c", "y".to_string());

        let report = dispatcher.run_tick().await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.aborted, vec!["b", "c"]);
        assert!(report.executed.is_empty());
        assert!(dispatcher.responses().is_empty());
        assert!(dispatcher.aggregator().is_empty());
    }

    #[tokio::test]
    async fn panicking_room_is_reported_as_failure() {
        let dispatcher = dispatcher(&["r1", "r2"], 0);
        dispatcher.aggregator().add("r1", "panic".to_string());
        dispatcher.aggregator().add("r2", "fine".to_string());

        let report = dispatcher.run_tick().await;
        assert!(matches!(
            report.failures.as_slice(),
            [ServerError::RoomPanicked { room_id }] if room_id == "r1"
        ));
        assert_eq!(report.executed, vec!["r2"]);

        // The context survives the panic and serves the next tick
        dispatcher.aggregator().add("r1", "again".to_string());
        let report = dispatcher.run_tick().await;
        assert_eq!(report.executed, vec!["r1"]);
    }

    #[tokio::test]
    async fn rooms_run_in_parallel() {
        let table = Arc::new(RoomTable::new());
        for room in ["r1", "r2", "r3", "r4"] {
            table.insert(
                room,
                Echo {
                    delay: Duration::from_millis(100),
                },
            );
        }
        let dispatcher = BattleDispatcher::new(table, 0);
        for room in ["r1", "r2", "r3", "r4"] {
            dispatcher.aggregator().add(room, "x".to_string());
        }

        let started = std::time::Instant::now();
        let report = dispatcher.run_tick().await;
        assert_eq!(report.executed.len(), 4);
        assert!(started.elapsed() < Duration::from_millis(350));
    }

    #[tokio::test]
    async fn empty_tick_does_nothing() {
        let dispatcher = dispatcher(&["r1"], 0);
        let report = dispatcher.run_tick().await;
        assert!(report.is_clean());
        assert!(report.executed.is_empty());
        assert!(dispatcher.responses().is_empty());
    }
}
