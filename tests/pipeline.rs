//! End-to-end scenarios over the in-memory queue

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use room_tick_server::app::AppState;
use room_tick_server::error::{FailureReporter, ServerError};
use room_tick_server::game::{GameContext, RoomTable};
use room_tick_server::protocol::{Category, Frame, FrameEvent};
use room_tick_server::serializer::{BincodeSerializer, JsonSerializer, Serializer};
use room_tick_server::server::{
    DirectHandler, Disposition, FireOutcome, Intake, MessageSink, RoomTicker, Server,
    ServerSettings, TickScheduler,
};
use room_tick_server::session::{FixedRoomHooks, Session};
use room_tick_server::transport::MemoryQueue;

const C1: &str = "c1000000-0000-4000-8000-000000000001";
const C2: &str = "c2000000-0000-4000-8000-000000000002";

fn frame(category: Category, event: FrameEvent, connection_id: &str, payload: &[u8]) -> Bytes {
    Frame::new(category, event, connection_id, Bytes::copy_from_slice(payload))
        .to_bytes()
        .unwrap()
}

fn connect(connection_id: &str) -> Bytes {
    frame(Category::Control, FrameEvent::Connect, connection_id, b"")
}

fn binary(connection_id: &str, payload: &[u8]) -> Bytes {
    frame(Category::Binary, FrameEvent::BinaryMessage, connection_id, payload)
}

async fn send(sink: &impl MessageSink, room_id: &str, value: u32) {
    let body = BincodeSerializer.serialize(&value).unwrap();
    sink.accept(C1, Session::new(room_id, "u1"), Bytes::from(body))
        .await;
}

/// Failure reporter that records the room of every reported failure
fn recording_failures() -> (FailureReporter, Arc<Mutex<Vec<Option<String>>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let reporter = FailureReporter::new(move |failure: &ServerError| {
        sink.lock().push(failure.room_id().map(str::to_string));
    });
    (reporter, seen)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

/// Returns the tick's requests untouched
#[derive(Default)]
struct Mirror;

impl GameContext for Mirror {
    type Request = u32;
    type Push = u32;

    fn execute(&mut self, requests: Vec<u32>) -> anyhow::Result<Vec<u32>> {
        Ok(requests)
    }
}

#[tokio::test]
async fn message_flows_from_connection_to_room_job() {
    let queue = Arc::new(MemoryQueue::default());
    let state = AppState::new(
        queue.clone(),
        Arc::new(FixedRoomHooks::new("room-42")),
        FailureReporter::logging(),
    );

    let rooms = Arc::new(RoomTable::new());
    rooms.insert("room-42", Mirror);
    let failures = state.failures.clone();
    let ticker = RoomTicker::new(rooms, BincodeSerializer, queue.clone(), failures, 0);
    let intake = Intake::new(state.clone(), Arc::new(ticker.sink()), vec!["in".into()], 10);

    intake.process(&connect(C1)).await;
    let routed = intake.process(&binary(C1, &[0xDE, 0xAD, 0xBE, 0xEF])).await;
    assert_eq!(
        routed,
        Disposition::Delivered {
            room_id: "room-42".into()
        }
    );

    ticker.tick().await;

    let jobs = queue.drain("room-42");
    assert_eq!(jobs.len(), 1);

    let request = u32::from_le_bytes([0xDE, 0xAD, 0xBE, 0xEF]);
    let expected = BincodeSerializer.serialize(&vec![request]).unwrap();
    assert_eq!(&jobs[0].payload[..], &expected[..]);
    assert!(ticker.dispatcher().aggregator().is_empty());
}

#[tokio::test]
async fn unregistered_connection_produces_nothing() {
    let queue = Arc::new(MemoryQueue::default());
    let (failures, seen) = recording_failures();
    let state = AppState::new(queue.clone(), Arc::new(FixedRoomHooks::new("room-42")), failures);

    let rooms = Arc::new(RoomTable::new());
    rooms.insert("room-42", Mirror);
    let failures = state.failures.clone();
    let ticker = RoomTicker::new(rooms, BincodeSerializer, queue.clone(), failures, 0);
    let intake = Intake::new(state, Arc::new(ticker.sink()), vec!["in".into()], 10);

    let routed = intake.process(&binary(C2, &[1, 2, 3, 4])).await;
    assert_eq!(routed, Disposition::Unregistered);

    let (report, published) = ticker.tick().await;
    assert!(report.executed.is_empty());
    assert_eq!(published.published, 0);
    assert_eq!(queue.len("room-42"), 0);
    assert!(seen.lock().is_empty());
}

/// Fails every tick
struct Broken;

impl GameContext for Broken {
    type Request = u32;
    type Push = u32;

    fn execute(&mut self, _requests: Vec<u32>) -> anyhow::Result<Vec<u32>> {
        anyhow::bail!("room state corrupted")
    }
}

enum Room {
    Broken(Broken),
    Mirror(Mirror),
}

impl GameContext for Room {
    type Request = u32;
    type Push = u32;

    fn execute(&mut self, requests: Vec<u32>) -> anyhow::Result<Vec<u32>> {
        match self {
            Room::Broken(room) => room.execute(requests),
            Room::Mirror(room) => room.execute(requests),
        }
    }
}

#[tokio::test]
async fn failing_room_does_not_hold_back_its_sibling() {
    let queue = Arc::new(MemoryQueue::default());
    let (failures, seen) = recording_failures();

    let rooms = Arc::new(RoomTable::new());
    rooms.insert("r1", Room::Broken(Broken));
    rooms.insert("r2", Room::Mirror(Mirror));
    let ticker = RoomTicker::new(rooms, BincodeSerializer, queue.clone(), failures.clone(), 0);

    let sink = ticker.sink();
    send(&sink, "r1", 1).await;
    send(&sink, "r2", 2).await;

    let (report, published) = ticker.tick().await;

    assert_eq!(report.executed, vec!["r2"]);
    assert_eq!(published.published, 1);
    assert_eq!(queue.len("r1"), 0);
    assert_eq!(queue.len("r2"), 1);
    assert_eq!(*seen.lock(), vec![Some("r1".to_string())]);
    assert_eq!(failures.reported(), 1);
}

/// Holds every tick open long enough to overlap a second fire
struct Slow {
    ticks: Arc<AtomicUsize>,
}

impl GameContext for Slow {
    type Request = u32;
    type Push = u32;

    fn execute(&mut self, requests: Vec<u32>) -> anyhow::Result<Vec<u32>> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(80));
        Ok(requests)
    }
}

#[tokio::test]
async fn overlapping_fire_neither_duplicates_nor_reorders() {
    let queue = Arc::new(MemoryQueue::default());
    let ticks = Arc::new(AtomicUsize::new(0));

    let rooms = Arc::new(RoomTable::new());
    rooms.insert("room-42", Slow { ticks: ticks.clone() });
    let ticker = Arc::new(RoomTicker::new(
        rooms,
        BincodeSerializer,
        queue.clone(),
        FailureReporter::logging(),
        0,
    ));
    let sink = ticker.sink();
    let scheduler = TickScheduler::new(
        Duration::from_secs(60),
        ticker.clone(),
        FailureReporter::logging(),
    );

    send(&sink, "room-42", 1).await;
    assert_eq!(scheduler.fire(), FireOutcome::Started);
    wait_until(|| ticks.load(Ordering::SeqCst) == 1).await;

    send(&sink, "room-42", 2).await;
    assert_eq!(scheduler.fire(), FireOutcome::Skipped);

    wait_until(|| !scheduler.is_ticking()).await;
    assert_eq!(scheduler.fire(), FireOutcome::Started);
    wait_until(|| queue.len("room-42") == 2).await;

    let payloads: Vec<Vec<u32>> = queue
        .drain("room-42")
        .iter()
        .map(|job| BincodeSerializer.deserialize(&job.payload).unwrap())
        .collect();
    assert_eq!(payloads, vec![vec![1], vec![2]]);
    assert_eq!(ticks.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn aggregated_server_publishes_room_output() {
    let queue = Arc::new(MemoryQueue::new(Duration::from_millis(5)));
    let state = AppState::new(
        queue.clone(),
        Arc::new(FixedRoomHooks::new("lobby")),
        FailureReporter::logging(),
    );

    let rooms = Arc::new(RoomTable::new());
    rooms.insert("lobby", Mirror);

    let settings = ServerSettings {
        tick_interval: Duration::from_millis(10),
        ..ServerSettings::default()
    };
    let mut server = Server::aggregated(state, settings, rooms, JsonSerializer);
    server.begin().unwrap();

    queue.push("room-server", connect(C1));
    queue.push(
        "room-server",
        frame(Category::String, FrameEvent::StringMessage, C1, b"7"),
    );

    wait_until(|| queue.len("lobby") > 0).await;
    let jobs = queue.drain("lobby");
    assert_eq!(&jobs[0].payload[..], b"[7]");

    let stats = server.tick_stats().unwrap();
    assert!(stats.started() >= 1);

    wait_until(|| queue.acknowledged().len() == 2).await;
    server.end().await;
    assert!(queue.is_closed());
}

struct Shout;

impl DirectHandler for Shout {
    type Request = String;
    type Response = String;

    fn respond(&self, _session: &Session, request: String) -> anyhow::Result<Option<String>> {
        Ok(Some(request.to_uppercase()))
    }
}

#[tokio::test]
async fn direct_server_answers_the_sender() {
    let queue = Arc::new(MemoryQueue::new(Duration::from_millis(5)));
    let state = AppState::new(
        queue.clone(),
        Arc::new(FixedRoomHooks::new("lobby")),
        FailureReporter::logging(),
    );

    let mut server = Server::direct(state, ServerSettings::default(), Shout, JsonSerializer);
    server.begin().unwrap();

    queue.push("room-server", connect(C2));
    queue.push(
        "room-server",
        frame(Category::String, FrameEvent::StringMessage, C2, br#""hello""#),
    );

    wait_until(|| queue.len(C2) > 0).await;
    let jobs = queue.drain(C2);
    assert_eq!(jobs.len(), 1);
    assert_eq!(&jobs[0].payload[..], br#""HELLO""#);
    assert_eq!(queue.len("lobby"), 0);

    server.end().await;
}
