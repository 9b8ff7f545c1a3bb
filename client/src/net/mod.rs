//! Networking: the websocket event channel and the bootstrap HTTP API.
//!
//! SYSTEM CONTEXT
//! ==============
//! `connection` owns the websocket lifecycle and reconnect policy, `dispatch`
//! the typed subscriber table it feeds, `transport` the socket seam, and
//! `api` the one-shot REST calls made at startup.

pub mod api;
pub mod connection;
pub mod dispatch;
pub mod transport;
