//! Mirrored auction state and its reconciliation rules.
//!
//! SYSTEM CONTEXT
//! ==============
//! `AuctionState` is the client's local projection of the auction: the item
//! list as last reported by the server, the identities on offer, which one
//! this client bids as, what it has bid, and short-lived flash markers. The
//! sync controller is its only writer; presentation code reads it.
//!
//! DESIGN
//! ======
//! `AuctionState` is plain data with total, synchronous mutators and a pure
//! `derive_status`. `StateStore` wraps it in a shared handle, adds the flash
//! expiry timers, and bumps a revision counter on every change so readers
//! can redraw.

#[cfg(test)]
#[path = "auction_test.rs"]
mod auction_test;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use events::{AuctionItem, AuctionStatus, BidUpdate, User};
use tokio::sync::watch;
use tracing::debug;

use crate::util::timer::TimerHandle;

/// How long a flash marker stays visible after the latest flash.
pub const FLASH_DURATION: Duration = Duration::from_millis(600);

/// Transient highlight shown after a leadership change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlashKind {
    /// This client took the lead.
    WonLead,
    /// Someone else took the lead.
    LostLead,
}

impl FlashKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WonLead => "won-lead",
            Self::LostLead => "lost-lead",
        }
    }

    /// Display color for the highlight.
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Self::WonLead => "green",
            Self::LostLead => "red",
        }
    }
}

/// This client's standing on one item, derived on demand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BidStatus {
    #[default]
    Active,
    Winning,
    Outbid,
}

impl BidStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Winning => "winning",
            Self::Outbid => "outbid",
        }
    }
}

/// Fields to merge into an existing item. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub current_bid: Option<i64>,
    pub current_bidder: Option<Option<String>>,
    pub time_remaining: Option<Option<i64>>,
    pub status: Option<AuctionStatus>,
}

impl ItemPatch {
    fn apply(&self, item: &mut AuctionItem) {
        if let Some(bid) = self.current_bid {
            item.current_bid = bid;
        }
        if let Some(bidder) = &self.current_bidder {
            item.current_bidder.clone_from(bidder);
        }
        if let Some(remaining) = self.time_remaining {
            item.time_remaining = remaining;
        }
        if let Some(status) = self.status {
            item.status = status;
        }
    }
}

impl From<&BidUpdate> for ItemPatch {
    /// A bid update always replaces the leader and remaining time, even when
    /// the server leaves them out.
    fn from(update: &BidUpdate) -> Self {
        Self {
            current_bid: Some(update.current_bid),
            current_bidder: Some(update.current_bidder.clone()),
            time_remaining: Some(update.time_remaining),
            status: None,
        }
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Local projection of the auction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuctionState {
    /// Items in server order.
    pub items: Vec<AuctionItem>,
    /// Identities the user may bid as.
    pub users: Vec<User>,
    pub current_user: Option<User>,
    /// Set by the server's welcome, cleared on disconnect.
    pub connected: bool,
    /// True until the first snapshot or the end of bootstrap.
    pub loading: bool,
    /// Item id to the last amount the server confirmed for this client.
    pub my_bids: HashMap<String, i64>,
    pub flashing: HashMap<String, FlashKind>,
}

impl Default for AuctionState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            users: Vec::new(),
            current_user: None,
            connected: false,
            loading: true,
            my_bids: HashMap::new(),
            flashing: HashMap::new(),
        }
    }
}

impl AuctionState {
    /// Replace the item list wholesale and end loading.
    pub fn load_snapshot(&mut self, items: Vec<AuctionItem>) {
        self.items = items;
        self.loading = false;
    }

    /// Merge `patch` into the item with `item_id`. Returns `false` for an
    /// unknown id, which is left alone.
    pub fn apply_partial_update(&mut self, item_id: &str, patch: &ItemPatch) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| item.id == item_id) else {
            debug!(item_id, "partial update for unknown item ignored");
            return false;
        };
        patch.apply(item);
        true
    }

    pub fn record_local_bid(&mut self, item_id: &str, amount: i64) {
        self.my_bids.insert(item_id.to_owned(), amount);
    }

    #[must_use]
    pub fn item(&self, item_id: &str) -> Option<&AuctionItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    #[must_use]
    pub fn flash(&self, item_id: &str) -> Option<FlashKind> {
        self.flashing.get(item_id).copied()
    }

    /// True when `user_id` is the selected identity.
    #[must_use]
    pub fn is_current_user(&self, user_id: Option<&str>) -> bool {
        match (&self.current_user, user_id) {
            (Some(user), Some(id)) => user.id == id,
            _ => false,
        }
    }

    /// This client's standing on an item.
    ///
    /// Without a confirmed bid the item is `Active`. Leading beats everything
    /// else, even if the recorded bid is stale. Otherwise a current bid above
    /// the recorded one means `Outbid`.
    #[must_use]
    pub fn derive_status(&self, item_id: &str) -> BidStatus {
        let Some(item) = self.item(item_id) else {
            return BidStatus::Active;
        };
        let Some(&my_bid) = self.my_bids.get(item_id) else {
            return BidStatus::Active;
        };
        if self.is_current_user(item.current_bidder.as_deref()) {
            return BidStatus::Winning;
        }
        if item.current_bid > my_bid {
            return BidStatus::Outbid;
        }
        BidStatus::Active
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Shared handle to the auction state. Clones see the same state.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: Mutex<AuctionState>,
    /// Item id to the pending expiry for its flash, tagged with a sequence
    /// number so a superseded timer cannot clear a newer flash.
    flash_timers: Mutex<HashMap<String, (u64, TimerHandle)>>,
    flash_seq: AtomicU64,
    revision: watch::Sender<u64>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    #[must_use]
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(AuctionState::default()),
                flash_timers: Mutex::new(HashMap::new()),
                flash_seq: AtomicU64::new(0),
                revision,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, AuctionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<String, (u64, TimerHandle)>> {
        self.inner.flash_timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the current state.
    pub fn read<R>(&self, f: impl FnOnce(&AuctionState) -> R) -> R {
        f(&self.state())
    }

    /// Owned copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> AuctionState {
        self.state().clone()
    }

    /// Mutate the state and notify watchers.
    pub fn update<R>(&self, f: impl FnOnce(&mut AuctionState) -> R) -> R {
        let result = f(&mut self.state());
        self.inner.revision.send_modify(|revision| *revision += 1);
        result
    }

    /// Receiver whose value changes after every mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.inner.revision.borrow()
    }

    pub fn load_snapshot(&self, items: Vec<AuctionItem>) {
        let count = items.len();
        self.update(|state| state.load_snapshot(items));
        debug!(count, "item snapshot loaded");
    }

    pub fn apply_partial_update(&self, item_id: &str, patch: &ItemPatch) -> bool {
        self.update(|state| state.apply_partial_update(item_id, patch))
    }

    pub fn record_local_bid(&self, item_id: &str, amount: i64) {
        self.update(|state| state.record_local_bid(item_id, amount));
    }

    /// Show `kind` on an item until `FLASH_DURATION` after the latest call.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn mark_flash(&self, item_id: &str, kind: FlashKind) {
        // The marker and its expiry change under one `timers` lock, the same
        // lock `expire_flash` checks the sequence under.
        let mut timers = self.timers();
        self.update(|state| state.flashing.insert(item_id.to_owned(), kind));

        let seq = self.inner.flash_seq.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let id = item_id.to_owned();
        let timer = TimerHandle::after(FLASH_DURATION, move || {
            if let Some(inner) = weak.upgrade() {
                StateStore { inner }.expire_flash(&id, seq);
            }
        });
        timers.insert(item_id.to_owned(), (seq, timer));
    }

    fn expire_flash(&self, item_id: &str, seq: u64) {
        let mut timers = self.timers();
        if timers.get(item_id).is_some_and(|(live, _)| *live == seq) {
            timers.remove(item_id);
            self.update(|state| state.flashing.remove(item_id));
        }
    }

    #[must_use]
    pub fn derive_status(&self, item_id: &str) -> BidStatus {
        self.read(|state| state.derive_status(item_id))
    }

    #[must_use]
    pub fn item(&self, item_id: &str) -> Option<AuctionItem> {
        self.read(|state| state.item(item_id).cloned())
    }

    #[must_use]
    pub fn flash(&self, item_id: &str) -> Option<FlashKind> {
        self.read(|state| state.flash(item_id))
    }

    pub fn set_users(&self, users: Vec<User>) {
        self.update(|state| state.users = users);
    }

    pub fn set_current_user(&self, user: Option<User>) {
        self.update(|state| state.current_user = user);
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.read(|state| state.current_user.clone())
    }

    pub fn set_connected(&self, connected: bool) {
        self.update(|state| state.connected = connected);
    }

    pub fn set_loading(&self, loading: bool) {
        self.update(|state| state.loading = loading);
    }

    /// Cancel every pending flash expiry. Markers already shown stay set.
    pub fn shutdown(&self) {
        let pending = std::mem::take(&mut *self.timers());
        debug!(pending = pending.len(), "flash timers cancelled");
    }
}
