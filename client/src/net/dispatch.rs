//! Typed subscriber table for connection lifecycle and server events.
//!
//! DESIGN
//! ======
//! Topics form a closed set: the three lifecycle signals plus one topic per
//! inbound [`EventKind`]. Handlers for a topic run in registration order.
//! Dispatch works on a snapshot of the handler list taken before the first
//! handler runs, so a handler may unsubscribe itself (or others) without
//! disturbing the pass already in progress.

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod dispatch_test;

use std::collections::HashMap;
use std::sync::Arc;

use events::{EventKind, InboundEvent};

/// Something the connection manager delivers to subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The websocket opened.
    Connected,
    /// The websocket closed, or a connect attempt failed.
    Disconnected,
    /// A transport-level failure, already handled by reconnection.
    Error(String),
    /// A decoded server event.
    Server(InboundEvent),
}

impl ChannelEvent {
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::Connected => Topic::Connect,
            Self::Disconnected => Topic::Disconnect,
            Self::Error(_) => Topic::Error,
            Self::Server(event) => Topic::Event(event.kind()),
        }
    }
}

/// Dispatch key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    Connect,
    Disconnect,
    Error,
    Event(EventKind),
}

impl Topic {
    /// Every topic a subscriber can register for.
    #[must_use]
    pub fn all() -> Vec<Self> {
        let mut topics = vec![Self::Connect, Self::Disconnect, Self::Error];
        topics.extend(EventKind::ALL.into_iter().map(Self::Event));
        topics
    }
}

/// Subscriber callback. Runs on the connection's session task and must not block.
pub type Handler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Token returned by subscribe, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Ordered handler lists keyed by topic.
#[derive(Default)]
pub struct Subscribers {
    next_id: u64,
    table: HashMap<Topic, Vec<(SubscriptionId, Handler)>>,
}

impl Subscribers {
    /// Append `handler` to the list for `topic`.
    pub fn insert(&mut self, topic: Topic, handler: Handler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.table.entry(topic).or_default().push((id, handler));
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        for handlers in self.table.values_mut() {
            if let Some(index) = handlers.iter().position(|(existing, _)| *existing == id) {
                handlers.remove(index);
                return true;
            }
        }
        false
    }

    /// Snapshot of the handlers for `topic`, in registration order.
    #[must_use]
    pub fn handlers_for(&self, topic: Topic) -> Vec<Handler> {
        self.table
            .get(&topic)
            .map(|handlers| handlers.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default()
    }

    /// Total live subscriptions across all topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
