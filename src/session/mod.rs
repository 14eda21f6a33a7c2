//! Connection sessions and the hooks that assign them

pub mod hooks;
pub mod registry;

pub use hooks::{FixedRoomHooks, NoopHooks, SessionHooks};
pub use registry::{ConnectionRegistry, Session};
