//! Server clock estimate and countdown arithmetic.
//!
//! SYSTEM CONTEXT
//! ==============
//! Auction end times are expressed on the server's clock. `ClockSync` keeps
//! one offset, `server_time - local_time` at the moment a sample arrived, and
//! every countdown is computed as `end - (local_now + offset)`.
//!
//! DESIGN
//! ======
//! Each sample overwrites the previous offset; nothing is averaged and no
//! round-trip correction is applied. Local time is read through
//! [`LocalClock`] so tests can pin it.

#[cfg(test)]
#[path = "clock_test.rs"]
mod clock_test;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use events::OutboundEvent;
use tracing::{debug, info};

use crate::net::connection::ConnectionManager;
use crate::util::timer::TimerHandle;

/// Redraw cadence for countdowns.
pub const COUNTDOWN_TICK: Duration = Duration::from_millis(100);

const CRITICAL_SECS: i64 = 30;
const WARNING_SECS: i64 = 60;

/// Source of local wall-clock time in epoch milliseconds.
pub trait LocalClock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl LocalClock for SystemClock {
    fn now_ms(&self) -> i64 {
        let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
            return 0;
        };
        i64::try_from(dur.as_millis()).unwrap_or(0)
    }
}

// =============================================================================
// CLOCK SYNC
// =============================================================================

/// Shared server-clock estimate. Clones share one offset.
#[derive(Clone)]
pub struct ClockSync {
    conn: ConnectionManager,
    clock: Arc<dyn LocalClock>,
    offset: Arc<AtomicI64>,
}

impl ClockSync {
    #[must_use]
    pub fn new(conn: ConnectionManager, clock: Arc<dyn LocalClock>) -> Self {
        Self { conn, clock, offset: Arc::new(AtomicI64::new(0)) }
    }

    /// Ask the server for a timestamp. The reply arrives as `SERVER_TIME`.
    /// Dropped with a warning when offline.
    pub fn request_server_time(&self) -> bool {
        self.conn.send(&OutboundEvent::GetServerTime)
    }

    /// Record a server timestamp observed now. Returns the new offset.
    pub fn apply_sample(&self, server_time: i64) -> i64 {
        let offset = server_time.saturating_sub(self.clock.now_ms());
        let previous = self.offset.swap(offset, Ordering::Relaxed);
        if previous == offset {
            debug!(offset_ms = offset, "server time resynced");
        } else {
            info!(offset_ms = offset, previous_ms = previous, "server time synced");
        }
        offset
    }

    /// Estimated `server - local` in milliseconds. Zero until the first sample.
    #[must_use]
    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::Relaxed)
    }

    /// Current time on the server's clock, as estimated.
    #[must_use]
    pub fn server_now(&self) -> i64 {
        self.clock.now_ms().saturating_add(self.offset())
    }

    /// Milliseconds left until `end_time` on the server clock, never negative.
    #[must_use]
    pub fn remaining_ms(&self, end_time: i64) -> i64 {
        end_time.saturating_sub(self.server_now()).max(0)
    }

    #[must_use]
    pub fn countdown(&self, end_time: i64) -> Countdown {
        Countdown::new(self.remaining_ms(end_time))
    }

    /// Call `f` with the estimated server time every `COUNTDOWN_TICK`.
    ///
    /// Must be called from within a Tokio runtime. Drop the handle to stop.
    pub fn on_tick<F>(&self, mut f: F) -> TimerHandle
    where
        F: FnMut(i64) + Send + 'static,
    {
        let clock = self.clone();
        TimerHandle::every(COUNTDOWN_TICK, move || f(clock.server_now()))
    }
}

// =============================================================================
// COUNTDOWN
// =============================================================================

/// How close an auction is to closing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Urgency {
    Ended,
    /// Thirty seconds or less.
    Critical,
    /// Sixty seconds or less.
    Warning,
    Normal,
}

impl Urgency {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ended => "ended",
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Normal => "normal",
        }
    }
}

/// Time left on one auction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Countdown {
    pub remaining_ms: i64,
}

impl Countdown {
    #[must_use]
    pub fn new(remaining_ms: i64) -> Self {
        Self { remaining_ms: remaining_ms.max(0) }
    }

    #[must_use]
    pub fn is_ended(self) -> bool {
        self.remaining_ms <= 0
    }

    /// Whole seconds left, rounded down.
    #[must_use]
    pub fn whole_seconds(self) -> i64 {
        self.remaining_ms / 1000
    }

    #[must_use]
    pub fn urgency(self) -> Urgency {
        match self.whole_seconds() {
            s if s <= 0 => Urgency::Ended,
            s if s <= CRITICAL_SECS => Urgency::Critical,
            s if s <= WARNING_SECS => Urgency::Warning,
            _ => Urgency::Normal,
        }
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ended() {
            return f.write_str("Ended");
        }
        let total = self.whole_seconds();
        let (minutes, seconds) = (total / 60, total % 60);
        if minutes > 0 {
            write!(f, "{minutes}m {seconds}s")
        } else {
            write!(f, "{seconds}s")
        }
    }
}
