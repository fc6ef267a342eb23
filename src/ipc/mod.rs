//! IPC module for the translation engine
//!
//! A local client subscribes to strokes and machine state, and sends key
//! output commands back.

mod protocol;
mod server;

pub use protocol::{encode_frame, DaemonStatus, Notification, Request, Response};
pub use server::{Daemon, Server};
