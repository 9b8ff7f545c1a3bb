//! Sync controller: the glue between the event channel and client state.
//!
//! SYSTEM CONTEXT
//! ==============
//! The controller is the only component that talks to both the connection
//! manager and the state store. Inbound server events become store mutations
//! plus at most one notification each; user intents become outbound events.
//!
//! EVENT HANDLING
//! ==============
//! | event             | effect                                                  |
//! |-------------------|---------------------------------------------------------|
//! | `WELCOME`         | mark connected, seed the identity list                  |
//! | `USER_REGISTERED` | success notification                                    |
//! | `SERVER_TIME`     | clock sample                                            |
//! | `INITIAL_DATA`    | replace the item list                                   |
//! | `UPDATE_BID`      | merge, then flash won-lead (and notify) or lost-lead    |
//! | `BID_ACCEPTED`    | remember the amount, success notification               |
//! | `BID_ERROR`       | error notification                                      |
//! | `OUTBID`          | warning notification, flash lost-lead                   |
//! | `AUCTION_ENDED`   | close a known item, notify the winner once              |
//!
//! Every (re)connect asks for a fresh clock sample and re-registers the
//! selected identity, so a replacement socket is associated again.

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use events::{AuctionStatus, BidUpdate, InboundEvent, OutboundEvent, User};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::net::api::ApiClient;
use crate::net::connection::ConnectionManager;
use crate::net::dispatch::{ChannelEvent, SubscriptionId, Topic};
use crate::net::transport::WsConnector;
use crate::state::auction::{FlashKind, ItemPatch, StateStore};
use crate::state::clock::{ClockSync, SystemClock};
use crate::state::notifications::{NotificationCenter, Severity};

/// Amount added to the current bid by a one-click bid.
pub const BID_INCREMENT: i64 = 10;

const SELECT_USER_FIRST: &str = "Please select a user first!";

/// Cloneable handle wiring connection, clock, store and notifications.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    conn: ConnectionManager,
    store: StateStore,
    clock: ClockSync,
    notifications: NotificationCenter,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl SyncController {
    #[must_use]
    pub fn new(
        conn: ConnectionManager,
        store: StateStore,
        clock: ClockSync,
        notifications: NotificationCenter,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                conn,
                store,
                clock,
                notifications,
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Production wiring: websocket transport and the system clock.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        let conn = ConnectionManager::new(config.connection_options(), Arc::new(WsConnector));
        let clock = ClockSync::new(conn.clone(), Arc::new(SystemClock));
        Self::new(conn, StateStore::new(), clock, NotificationCenter::new())
    }

    /// Subscribe to every topic and open the connection.
    ///
    /// Calling it again only re-triggers `connect`. Must be called from within
    /// a Tokio runtime.
    pub fn start(&self) {
        {
            let mut subscriptions = self.inner.subscriptions();
            if subscriptions.is_empty() {
                for topic in Topic::all() {
                    let weak: Weak<ControllerInner> = Arc::downgrade(&self.inner);
                    let id = self.inner.conn.subscribe(
                        topic,
                        Arc::new(move |event: &ChannelEvent| {
                            if let Some(inner) = weak.upgrade() {
                                inner.handle(event);
                            }
                        }),
                    );
                    subscriptions.push(id);
                }
            }
        }
        self.inner.conn.connect();
    }

    /// Fetch items, identities and server time over HTTP, concurrently.
    ///
    /// Each failed call is logged and skipped; whatever succeeded is applied.
    /// Loading ends either way.
    pub async fn bootstrap(&self, api: &ApiClient) {
        let (items, users, server_time) =
            tokio::join!(api.fetch_items(), api.fetch_users(), api.fetch_server_time());

        match items {
            Ok(items) => self.inner.store.load_snapshot(items),
            Err(error) => warn!(%error, "bootstrap: failed to fetch items"),
        }
        match users {
            Ok(users) => self.inner.store.set_users(users),
            Err(error) => warn!(%error, "bootstrap: failed to fetch users"),
        }
        match server_time {
            Ok(server_time) => {
                self.inner.clock.apply_sample(server_time);
            }
            Err(error) => warn!(%error, "bootstrap: failed to fetch server time"),
        }
        self.inner.store.set_loading(false);
        info!("bootstrap complete");
    }

    /// Bid as `user` from now on. Registers with the server when connected.
    pub fn select_identity(&self, user: User) -> bool {
        info!(user_id = %user.id, "identity selected");
        let register = OutboundEvent::RegisterUser { user_id: user.id.clone() };
        self.inner.store.set_current_user(Some(user));
        self.inner.conn.is_connected() && self.inner.conn.send(&register)
    }

    /// Send a bid. Without a selected identity nothing is sent and a warning
    /// notification is shown instead.
    pub fn place_bid(&self, item_id: &str, amount: i64) -> bool {
        if self.inner.store.current_user().is_none() {
            self.inner.notifications.push(SELECT_USER_FIRST, Severity::Warning);
            return false;
        }
        info!(item_id, amount, "placing bid");
        self.inner.conn.send(&OutboundEvent::BidPlaced { item_id: item_id.to_owned(), amount })
    }

    /// Bid `BID_INCREMENT` over the current bid on an open item.
    pub fn place_next_bid(&self, item_id: &str) -> bool {
        let Some(item) = self.inner.store.item(item_id) else {
            warn!(item_id, "bid on unknown item ignored");
            return false;
        };
        if item.status == AuctionStatus::Ended {
            debug!(item_id, "bid on ended auction ignored");
            return false;
        }
        self.place_bid(item_id, item.current_bid.saturating_add(BID_INCREMENT))
    }

    /// Ask the server to resend the item snapshot.
    pub fn request_items(&self) -> bool {
        self.inner.conn.send(&OutboundEvent::GetItems)
    }

    /// Unsubscribe, close the connection and cancel every timer.
    pub fn shutdown(&self) {
        let subscriptions = std::mem::take(&mut *self.inner.subscriptions());
        for id in subscriptions {
            self.inner.conn.unsubscribe(id);
        }
        self.inner.conn.shutdown();
        self.inner.store.shutdown();
        self.inner.notifications.shutdown();
        info!("sync controller shut down");
    }

    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    #[must_use]
    pub fn clock(&self) -> &ClockSync {
        &self.inner.clock
    }

    #[must_use]
    pub fn notifications(&self) -> &NotificationCenter {
        &self.inner.notifications
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.conn
    }
}

impl ControllerInner {
    fn subscriptions(&self) -> MutexGuard<'_, Vec<SubscriptionId>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, event: &ChannelEvent) {
        match event {
            ChannelEvent::Connected => self.on_connected(),
            ChannelEvent::Disconnected => self.store.set_connected(false),
            ChannelEvent::Error(message) => debug!(%message, "transport error reported"),
            ChannelEvent::Server(event) => self.apply(event),
        }
    }

    fn on_connected(&self) {
        self.clock.request_server_time();
        if let Some(user) = self.store.current_user() {
            self.conn.send(&OutboundEvent::RegisterUser { user_id: user.id });
        }
    }

    fn apply(&self, event: &InboundEvent) {
        match event {
            InboundEvent::Welcome { available_users } => {
                self.store.update(|state| {
                    state.connected = true;
                    if let Some(users) = available_users {
                        state.users.clone_from(users);
                    }
                });
            }
            InboundEvent::UserRegistered { user_id } => {
                let name = self
                    .store
                    .current_user()
                    .filter(|user| &user.id == user_id)
                    .map_or_else(|| user_id.clone(), |user| user.name);
                self.notify(format!("Logged in as {name}"), Severity::Success);
            }
            InboundEvent::ServerTime { server_time } => {
                self.clock.apply_sample(*server_time);
            }
            InboundEvent::InitialData { items } => match items {
                Some(items) => self.store.load_snapshot(items.clone()),
                None => debug!("INITIAL_DATA without items ignored"),
            },
            InboundEvent::UpdateBid { item_id, item } => self.on_update_bid(item_id, item),
            InboundEvent::BidAccepted { item_id, amount } => {
                self.notify("Bid placed successfully!".to_owned(), Severity::Success);
                self.store.record_local_bid(item_id, *amount);
            }
            InboundEvent::BidError { error } => {
                self.notify(error.clone(), Severity::Error);
            }
            InboundEvent::Outbid { item_id, item_title } => {
                self.notify(format!("You were outbid on {item_title}!"), Severity::Warning);
                self.store.mark_flash(item_id, FlashKind::LostLead);
            }
            InboundEvent::AuctionEnded { item_id, winner, final_price } => {
                self.on_auction_ended(item_id, winner.as_deref(), *final_price);
            }
        }
    }

    fn on_update_bid(&self, item_id: &str, update: &BidUpdate) {
        self.store.apply_partial_update(item_id, &ItemPatch::from(update));

        let mine = self.store.read(|state| state.is_current_user(update.current_bidder.as_deref()));
        if mine {
            self.store.mark_flash(item_id, FlashKind::WonLead);
            let title = update
                .title
                .clone()
                .or_else(|| self.store.item(item_id).map(|item| item.title))
                .unwrap_or_else(|| item_id.to_owned());
            self.notify(format!("You're winning {title}!"), Severity::Success);
        } else {
            self.store.mark_flash(item_id, FlashKind::LostLead);
        }
    }

    fn on_auction_ended(&self, item_id: &str, winner: Option<&str>, final_price: i64) {
        let Some(item) = self.store.item(item_id) else {
            debug!(item_id, "AUCTION_ENDED for unknown item ignored");
            return;
        };
        let patch = ItemPatch {
            current_bid: Some(final_price),
            current_bidder: Some(winner.map(str::to_owned)),
            time_remaining: None,
            status: Some(AuctionStatus::Ended),
        };
        self.store.apply_partial_update(item_id, &patch);
        info!(item_id, winner, final_price, "auction ended");

        let first_close = item.status != AuctionStatus::Ended;
        if first_close && self.store.read(|state| state.is_current_user(winner)) {
            self.notify(format!("You won {}!", item.title), Severity::Success);
        }
    }

    fn notify(&self, message: String, severity: Severity) {
        self.notifications.push(message, severity);
    }
}
