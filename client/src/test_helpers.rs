//! In-memory transports and clocks shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use events::OutboundEvent;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use crate::net::transport::{Connector, Transport, TransportError};
use crate::state::clock::LocalClock;

/// Let spawned tasks run until they block, without moving the clock.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Advance the paused clock and let woken tasks run.
pub(crate) async fn advance_ms(ms: u64) {
    tokio::time::advance(std::time::Duration::from_millis(ms)).await;
    settle().await;
}

// =============================================================================
// CLOCK
// =============================================================================

#[derive(Debug, Default)]
pub(crate) struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub(crate) fn at(now: i64) -> Arc<Self> {
        Arc::new(Self { now: AtomicI64::new(now) })
    }

    pub(crate) fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub(crate) fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl LocalClock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Client half of an in-memory socket.
pub(crate) struct ChannelTransport {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
}

/// Server half of an in-memory socket, driven by the test.
pub(crate) struct ServerEnd {
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

fn socket_pair() -> (ChannelTransport, ServerEnd) {
    let (to_client, incoming) = mpsc::unbounded_channel();
    let (outgoing, from_client) = mpsc::unbounded_channel();
    (
        ChannelTransport { incoming, outgoing },
        ServerEnd { to_client: Some(to_client), from_client },
    )
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.outgoing
            .send(text)
            .map_err(|_| TransportError::Io(Box::new(tungstenite::Error::AlreadyClosed)))
    }

    async fn recv_text(&mut self) -> Option<Result<String, TransportError>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.incoming.close();
    }
}

impl ServerEnd {
    /// Deliver a raw text frame to the client.
    pub(crate) fn push_raw(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(text.to_owned());
        }
    }

    /// Deliver a JSON value as a text frame.
    pub(crate) fn push(&self, frame: &serde_json::Value) {
        self.push_raw(&frame.to_string());
    }

    /// Close the socket from the server side.
    pub(crate) fn close(&mut self) {
        self.to_client = None;
    }

    /// Drain every frame the client has sent so far.
    pub(crate) fn sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Drain sent frames, parsed as JSON.
    pub(crate) fn sent_json(&mut self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .map(|frame| serde_json::from_str(frame).expect("client sent invalid JSON"))
            .collect()
    }
}

// =============================================================================
// CONNECTOR
// =============================================================================

/// Connector that hands each accepted socket's server end to the test.
pub(crate) struct MockConnector {
    refuse: AtomicBool,
    attempts: AtomicUsize,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl MockConnector {
    pub(crate) fn accepting() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::build(false)
    }

    pub(crate) fn refusing() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::build(true)
    }

    fn build(refuse: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, servers) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            refuse: AtomicBool::new(refuse),
            attempts: AtomicUsize::new(0),
            accepted,
        });
        (connector, servers)
    }

    pub(crate) fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, url.to_owned());
            return Err(TransportError::Connect(Box::new(tungstenite::Error::Io(refused))));
        }
        let (transport, server) = socket_pair();
        let _ = self.accepted.send(server);
        Ok(Box::new(transport))
    }
}

/// Take the server end of the most recently accepted socket.
pub(crate) fn accepted(servers: &mut mpsc::UnboundedReceiver<ServerEnd>) -> ServerEnd {
    let mut latest = servers.try_recv().expect("no socket was accepted");
    while let Ok(next) = servers.try_recv() {
        latest = next;
    }
    latest
}

// =============================================================================
// EVENTS
// =============================================================================

/// Parse a frame the client sent.
pub(crate) fn outbound(value: &serde_json::Value) -> OutboundEvent {
    serde_json::from_value(value.clone()).expect("client sent an unknown event")
}
