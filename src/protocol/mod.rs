//! Wire framing for queue job payloads

pub mod frame;

pub use frame::{
    decode, encode, Category, DisconnectReason, DropReason, Frame, FrameError, FrameEvent,
    OutboundJob, CONNECTION_ID_LEN, HEADER_LEN,
};
