//! Real-time sync core for the live auction client.
//!
//! This crate keeps a local mirror of a multi-item auction in step with the
//! server: it owns the websocket event channel and its reconnect policy, the
//! server clock estimate, the reconciled item store with derived bid status,
//! and the ephemeral notifications shown to the user.
//!
//! SYSTEM CONTEXT
//! ==============
//! `net` talks to the server, `state` holds what the client knows, and
//! `controller` is the only place the two meet. Presentation layers build a
//! `SyncController`, call `start` and `bootstrap`, then read and watch the
//! store, clock and notification handles it exposes.

pub mod config;
pub mod controller;
pub mod net;
pub mod state;
pub mod util;

#[cfg(test)]
mod test_helpers;

pub use config::{ClientConfig, ConfigError};
pub use controller::{BID_INCREMENT, SyncController};
pub use net::api::{ApiClient, ApiError};
pub use net::connection::{ConnectionManager, ConnectionPhase, ConnectionState};
pub use state::auction::{AuctionState, BidStatus, FlashKind, StateStore};
pub use state::clock::{ClockSync, Countdown, Urgency};
pub use state::notifications::{Notification, NotificationCenter, Severity};
