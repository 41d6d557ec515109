//! Duplex channel lifecycle.
//!
//! A [`ConnectionManager`] hands out [`Connection`]s. Opening never blocks: the
//! dialer reports progress asynchronously as [`ConnectionUpdate`]s on the event
//! channel the manager was built with, each tagged with the connection id so the
//! owning session can ignore anything from an older connection.
//!
//! Every connection produces exactly one [`ConnectionEvent::Closed`], whether it
//! was closed locally, dropped by the peer, or failed to open.

#[cfg(any(test, feature = "test-util"))]
mod memory;
mod ws;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use asciicam_types::ClientMessage;
use crossbeam_channel::Sender;

use crate::error::TransportError;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryDialer, MemoryLog};
pub use ws::WsDialer;

/// Identifier unique within one [`ConnectionManager`] (and its clones).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Unopened,
    Open,
    Closing,
    Closed,
}

/// Transport-level event reported by a dialer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Message(String),
    Closed,
    Error(TransportError),
}

/// A [`ConnectionEvent`] tagged with the connection it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionUpdate {
    pub id: ConnectionId,
    pub event: ConnectionEvent,
}

pub type EventSender = Sender<ConnectionUpdate>;

/// Outbound half of one dialed channel.
pub trait Channel: Send {
    /// Queue a text frame for transmission.
    fn transmit(&mut self, text: String) -> Result<(), TransportError>;
    /// Request a graceful close.
    fn shutdown(&mut self);
}

/// Opens channels and reports their events on `events`.
pub trait Dialer: Send + Sync {
    fn dial(&self, id: ConnectionId, url: &str, events: EventSender) -> Box<dyn Channel>;
}

/// Cheap, clonable handle used by sessions to open connections.
#[derive(Clone)]
pub struct ConnectionManager {
    dialer: Arc<dyn Dialer>,
    events: EventSender,
    next_id: Arc<AtomicU64>,
}

impl ConnectionManager {
    pub fn new(dialer: Arc<dyn Dialer>, events: EventSender) -> Self {
        Self {
            dialer,
            events,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Start connecting to `url`. Completion arrives later as [`ConnectionEvent::Opened`].
    pub fn open(&self, url: &str) -> Connection {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(connection = %id, url, "opening connection");
        let channel = self.dialer.dial(id, url, self.events.clone());
        Connection {
            id,
            url: url.to_string(),
            state: TransportState::Unopened,
            last_error: None,
            channel,
        }
    }
}

/// One duplex channel, owned by exactly one session.
pub struct Connection {
    id: ConnectionId,
    url: String,
    state: TransportState,
    last_error: Option<TransportError>,
    channel: Box<dyn Channel>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransportState::Open
    }

    pub fn last_error(&self) -> Option<&TransportError> {
        self.last_error.as_ref()
    }

    /// Fold a dialer event into the transport state.
    pub fn apply(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => {
                if self.state == TransportState::Unopened {
                    self.state = TransportState::Open;
                }
            }
            ConnectionEvent::Message(_) => {}
            ConnectionEvent::Closed => self.state = TransportState::Closed,
            ConnectionEvent::Error(err) => self.last_error = Some(err.clone()),
        }
    }

    /// Serialize and transmit `message`.
    ///
    /// Returns `false` when the message was dropped because the channel is not
    /// open or the transmit failed. Callers treat that as "not sent".
    pub fn send(&mut self, message: &ClientMessage) -> bool {
        if !self.is_open() {
            tracing::debug!(
                connection = %self.id,
                kind = message.kind(),
                state = ?self.state,
                "dropping control message; connection not open"
            );
            return false;
        }
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(connection = %self.id, "encode {} failed: {e}", message.kind());
                return false;
            }
        };
        match self.channel.transmit(text) {
            Ok(()) => {
                tracing::debug!(connection = %self.id, kind = message.kind(), "sent control message");
                true
            }
            Err(e) => {
                tracing::warn!(connection = %self.id, kind = message.kind(), "send failed: {e}");
                self.last_error = Some(e);
                false
            }
        }
    }

    /// Request a graceful close. Redundant calls are no-ops.
    pub fn close(&mut self) {
        match self.state {
            TransportState::Unopened | TransportState::Open => {
                tracing::debug!(connection = %self.id, "closing connection");
                self.state = TransportState::Closing;
                self.channel.shutdown();
            }
            TransportState::Closing | TransportState::Closed => {}
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish()
    }
}
