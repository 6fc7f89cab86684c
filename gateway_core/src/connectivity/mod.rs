//! The WebSocket stream component (C6): one connection engine with four
//! concrete stream variants, driven by the per-venue hooks in
//! [`auth`]/[`subscribe`]/[`control`]/[`filters`].

pub mod auth;
pub mod connection;
pub mod control;
pub mod filters;
pub mod frame;
pub mod subscribe;

pub use connection::{FrameOutcome, StreamConnection, StreamHooks, StreamState, StreamVariant};

use std::time::Duration;

/// Reference user-stream listen-key renewal cadence (§4.6 Keepalive). Not a
/// transport heartbeat: the session renews via a REST call on this timer and
/// closes the stream cleanly on stop, rather than pinging the socket.
pub const REFERENCE_LISTEN_KEY_RENEWAL_INTERVAL: Duration = Duration::from_secs(30 * 60);
