//! In-process dialer that records traffic instead of touching the network.
//!
//! Sessions opened through it stay `Unopened` until the caller feeds them a
//! [`ConnectionEvent::Opened`](super::ConnectionEvent::Opened); the recorded log
//! lets callers assert on dialed URLs, transmitted frames and close requests.

use std::sync::{Arc, Mutex};

use asciicam_types::ClientMessage;

use super::{Channel, ConnectionId, Dialer, EventSender};
use crate::error::TransportError;

#[derive(Debug, Default)]
pub struct MemoryLog {
    pub dials: Vec<(ConnectionId, String)>,
    pub sent: Vec<(ConnectionId, String)>,
    pub closes: Vec<ConnectionId>,
}

#[derive(Clone, Default)]
pub struct MemoryDialer {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemoryDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dial_count(&self) -> usize {
        self.log.lock().map(|log| log.dials.len()).unwrap_or(0)
    }

    pub fn dialed_urls(&self) -> Vec<String> {
        self.log
            .lock()
            .map(|log| log.dials.iter().map(|(_, url)| url.clone()).collect())
            .unwrap_or_default()
    }

    /// Id of the most recent dial.
    pub fn last_id(&self) -> Option<ConnectionId> {
        self.log
            .lock()
            .ok()
            .and_then(|log| log.dials.last().map(|(id, _)| *id))
    }

    /// Raw text frames sent on `id`, oldest first.
    pub fn sent(&self, id: ConnectionId) -> Vec<String> {
        self.log
            .lock()
            .map(|log| {
                log.sent
                    .iter()
                    .filter(|(sent_id, _)| *sent_id == id)
                    .map(|(_, text)| text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Frames sent on `id`, decoded back into messages.
    pub fn sent_messages(&self, id: ConnectionId) -> Vec<ClientMessage> {
        self.sent(id)
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    pub fn close_count(&self, id: ConnectionId) -> usize {
        self.log
            .lock()
            .map(|log| log.closes.iter().filter(|closed| **closed == id).count())
            .unwrap_or(0)
    }
}

impl Dialer for MemoryDialer {
    fn dial(&self, id: ConnectionId, url: &str, _events: EventSender) -> Box<dyn Channel> {
        if let Ok(mut log) = self.log.lock() {
            log.dials.push((id, url.to_string()));
        }
        Box::new(MemoryChannel {
            id,
            log: self.log.clone(),
            closed: false,
        })
    }
}

struct MemoryChannel {
    id: ConnectionId,
    log: Arc<Mutex<MemoryLog>>,
    closed: bool,
}

impl Channel for MemoryChannel {
    fn transmit(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut log = self
            .log
            .lock()
            .map_err(|_| TransportError::Channel("memory log poisoned".into()))?;
        log.sent.push((self.id, text));
        Ok(())
    }

    fn shutdown(&mut self) {
        self.closed = true;
        if let Ok(mut log) = self.log.lock() {
            log.closes.push(self.id);
        }
    }
}
