//! Echo game logic bundled with the binary

use serde_json::{json, Value};

use room_tick_server::game::GameContext;
use room_tick_server::server::DirectHandler;
use room_tick_server::session::Session;

/// Pushes back every request of the tick, stamped with the tick number
#[derive(Debug, Default)]
pub struct EchoRoom {
    ticks: u64,
}

impl GameContext for EchoRoom {
    type Request = Value;
    type Push = Value;

    fn execute(&mut self, requests: Vec<Value>) -> anyhow::Result<Vec<Value>> {
        self.ticks += 1;
        Ok(requests
            .into_iter()
            .map(|request| json!({ "tick": self.ticks, "echo": request }))
            .collect())
    }
}

/// Replies to each message with the sender's user id attached; `null` gets
/// no reply
#[derive(Debug, Default)]
pub struct EchoHandler;

impl DirectHandler for EchoHandler {
    type Request = Value;
    type Response = Value;

    fn respond(&self, session: &Session, request: Value) -> anyhow::Result<Option<Value>> {
        if request.is_null() {
            return Ok(None);
        }

        Ok(Some(json!({ "user_id": session.user_id, "echo": request })))
    }
}
