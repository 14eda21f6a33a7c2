//! Room tick server
//!
//! Consumes framed jobs from a queue transport, tracks which room every
//! connection belongs to, batches requests per room and drives room game
//! logic on a fixed tick, publishing each room's output back onto the queue.
//! A direct profile answers every message immediately instead.

pub mod app;
pub mod config;
pub mod error;
pub mod game;
pub mod http;
pub mod protocol;
pub mod serializer;
pub mod server;
pub mod session;
pub mod transport;
pub mod util;
