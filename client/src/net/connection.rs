//! Websocket connection manager for the auction event channel.
//!
//! The `ConnectionManager` owns the single logical connection to the server:
//! it opens the socket, decodes inbound frames, dispatches them to typed
//! subscribers, forwards outbound events, and reconnects after loss.
//!
//! SYSTEM CONTEXT
//! ==============
//! Each open socket is driven by one session task. Every inbound frame is
//! decoded and all of its handlers run to completion on that task before the
//! next frame is read, so subscribers observe events one at a time in
//! delivery order.
//!
//! RECONNECT
//! =========
//! `Disconnected -> Connecting -> Connected`, back to `Disconnected` on close
//! or error. After a session ends (or a connect attempt fails) a reconnect is
//! scheduled after a fixed delay, up to `MAX_RECONNECT_ATTEMPTS` in a row. A
//! successful open resets the counter. Once the budget is spent the manager
//! stays disconnected until `connect()` is called again. The delay is
//! constant, not exponential.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures are never fatal: they surface as `Error` and
//! `Disconnected` lifecycle events and feed the reconnect loop. Frames that
//! fail to decode are logged and dropped one by one. Outbound sends while
//! offline are dropped with a warning; nothing is queued for later. A
//! handler that panics ends its session like a transport failure: the socket
//! is dropped and the reconnect loop takes over.

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use events::{OutboundEvent, decode_event, encode_event};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dispatch::{ChannelEvent, Handler, Subscribers, SubscriptionId, Topic};
use super::transport::{Connector, Transport, TransportError};
use crate::util::timer::TimerHandle;

/// Consecutive reconnect attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Fixed delay between a disconnect and the next attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// Where to connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Websocket URL of the event channel.
    pub url: String,
}

impl ConnectionOptions {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Websocket lifecycle phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No socket, and no attempt scheduled or in flight.
    #[default]
    Disconnected,
    /// A handshake is in flight or a reconnect is scheduled.
    Connecting,
    /// The socket is open.
    Connected,
}

/// Observable connection state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    /// Reconnect attempts made since the last successful open.
    pub reconnect_attempt: u32,
}

impl ConnectionState {
    #[must_use]
    pub fn connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }
}

/// Cloneable handle to the connection. All clones share one socket.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    options: ConnectionOptions,
    connector: Arc<dyn Connector>,
    subscribers: Mutex<Subscribers>,
    link: Mutex<Link>,
    state_tx: watch::Sender<ConnectionState>,
}

#[derive(Default)]
struct Link {
    /// Present only while the socket is open.
    outbound: Option<mpsc::UnboundedSender<String>>,
    session: Option<JoinHandle<()>>,
    reconnect: Option<TimerHandle>,
    attempt: u32,
    /// A session task is connecting or connected.
    in_flight: bool,
    shut_down: bool,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(options: ConnectionOptions, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        Self {
            inner: Arc::new(Inner {
                options,
                connector,
                subscribers: Mutex::new(Subscribers::default()),
                link: Mutex::new(Link::default()),
                state_tx,
            }),
        }
    }

    /// Open the connection if it is not already open or opening.
    ///
    /// Returns immediately; the outcome arrives as `Connect`, `Error` and
    /// `Disconnect` events. A pending reconnect timer is cancelled in favour
    /// of connecting now. Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Close the socket, cancel any pending reconnect, and stop for good.
    ///
    /// No handler is invoked after this returns.
    pub fn shutdown(&self) {
        let (session, attempt) = {
            let mut link = self.inner.link();
            link.shut_down = true;
            link.in_flight = false;
            link.outbound = None;
            link.reconnect = None;
            (link.session.take(), link.attempt)
        };
        if let Some(session) = session {
            session.abort();
        }
        self.inner.publish(ConnectionPhase::Disconnected, attempt);
        info!("connection manager shut down");
    }

    /// Register `handler` for `topic`. Handlers run in registration order.
    pub fn subscribe(&self, topic: Topic, handler: Handler) -> SubscriptionId {
        self.inner.subscribers().insert(topic, handler)
    }

    /// Remove a subscription. Safe to call from inside a handler.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers().remove(id)
    }

    /// Send an event if the socket is open.
    ///
    /// Returns `false`, and logs a warning, when offline. Dropped messages are
    /// not retried.
    pub fn send(&self, event: &OutboundEvent) -> bool {
        let link = self.inner.link();
        let Some(outbound) = link.outbound.as_ref() else {
            warn!(event_type = event.type_name(), "websocket not connected; message not sent");
            return false;
        };
        if outbound.send(encode_event(event)).is_err() {
            warn!(event_type = event.type_name(), "websocket closing; message not sent");
            return false;
        }
        debug!(event_type = event.type_name(), "sent");
        true
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.link().outbound.is_some()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }
}

impl Inner {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, phase: ConnectionPhase, reconnect_attempt: u32) {
        self.state_tx.send_replace(ConnectionState { phase, reconnect_attempt });
    }

    fn connect(self: &Arc<Self>) {
        let attempt = {
            let mut link = self.link();
            if link.shut_down {
                warn!("connect called after shutdown; ignoring");
                return;
            }
            if link.in_flight {
                debug!("connect ignored; session already active");
                return;
            }
            link.reconnect = None;
            link.in_flight = true;
            link.session = Some(tokio::spawn(run_session(Arc::clone(self))));
            link.attempt
        };
        self.publish(ConnectionPhase::Connecting, attempt);
    }

    fn dispatch(&self, event: &ChannelEvent) {
        let handlers = self.subscribers().handlers_for(event.topic());
        for handler in handlers {
            handler(event);
        }
    }

    fn handle_frame(&self, text: &str) {
        match decode_event(text) {
            Ok(event) => {
                debug!(event_type = %event.kind(), "received");
                self.dispatch(&ChannelEvent::Server(event));
            }
            Err(error) => warn!(%error, "dropping malformed frame"),
        }
    }

    /// Mark the session over and decide whether to try again.
    fn end_session(self: &Arc<Self>) {
        let mut link = self.link();
        link.in_flight = false;
        link.outbound = None;
        link.session = None;
        if link.shut_down {
            return;
        }

        if link.attempt >= MAX_RECONNECT_ATTEMPTS {
            let attempt = link.attempt;
            drop(link);
            warn!(attempts = attempt, "reconnect attempts exhausted; staying offline");
            self.publish(ConnectionPhase::Disconnected, attempt);
            return;
        }

        link.attempt += 1;
        let attempt = link.attempt;
        let weak: Weak<Self> = Arc::downgrade(self);
        link.reconnect = Some(TimerHandle::after(RECONNECT_DELAY, move || {
            if let Some(inner) = weak.upgrade() {
                inner.connect();
            }
        }));
        drop(link);

        info!(
            attempt,
            delay_ms = u64::try_from(RECONNECT_DELAY.as_millis()).unwrap_or(u64::MAX),
            "reconnecting"
        );
        self.publish(ConnectionPhase::Connecting, attempt);
    }
}

/// Runs `end_session` however the session task exits: a normal return, an
/// abort from `shutdown`, or a handler panic unwinding through the pump.
struct SessionGuard {
    inner: Arc<Inner>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("session task panicked; dropping socket");
        }
        self.inner.end_session();
    }
}

async fn run_session(inner: Arc<Inner>) {
    let _guard = SessionGuard { inner: Arc::clone(&inner) };
    let url = inner.options.url.clone();
    let transport = match inner.connector.connect(&url).await {
        Ok(transport) => transport,
        Err(error) => {
            warn!(%error, %url, "websocket connect failed");
            inner.dispatch(&ChannelEvent::Error(error.to_string()));
            inner.dispatch(&ChannelEvent::Disconnected);
            return;
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    {
        let mut link = inner.link();
        if link.shut_down {
            return;
        }
        link.outbound = Some(tx);
        link.attempt = 0;
    }
    inner.publish(ConnectionPhase::Connected, 0);
    info!(%url, "websocket connected");
    inner.dispatch(&ChannelEvent::Connected);

    let failure = pump(&inner, transport, rx).await;

    inner.link().outbound = None;
    if let Some(error) = failure {
        warn!(%error, "websocket error");
        inner.dispatch(&ChannelEvent::Error(error.to_string()));
    }
    info!("websocket disconnected");
    inner.publish(ConnectionPhase::Disconnected, 0);
    inner.dispatch(&ChannelEvent::Disconnected);
}

/// Shuttle frames until either side closes. Returns the error that ended the
/// session, if any.
async fn pump(
    inner: &Inner,
    mut transport: Box<dyn Transport>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) -> Option<TransportError> {
    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(text) = message else {
                    transport.close().await;
                    return None;
                };
                if let Err(error) = transport.send_text(text).await {
                    return Some(error);
                }
            }
            incoming = transport.recv_text() => match incoming {
                Some(Ok(text)) => inner.handle_frame(&text),
                Some(Err(error)) => return Some(error),
                None => return None,
            },
        }
    }
}
