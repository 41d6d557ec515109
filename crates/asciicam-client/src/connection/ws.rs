//! WebSocket dialer backed by `tokio-tungstenite`.
//!
//! The dialer owns a small multi-threaded runtime; every dial spawns one task
//! that connects, pumps inbound frames into the event channel and drains the
//! outbound queue. The caller's thread never blocks on network I/O, except
//! when the dialer is dropped: queued frames and close handshakes get a short
//! window to go out before the runtime is torn down.

use std::sync::Mutex;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{Channel, ConnectionEvent, ConnectionId, ConnectionUpdate, Dialer, EventSender};
use crate::error::TransportError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

enum Outbound {
    Text(String),
    Close,
}

pub struct WsDialer {
    runtime: Runtime,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WsDialer {
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("asciicam-ws")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

impl Dialer for WsDialer {
    fn dial(&self, id: ConnectionId, url: &str, events: EventSender) -> Box<dyn Channel> {
        let (tx, rx) = unbounded_channel();
        let task = self
            .runtime
            .spawn(run_connection(id, url.to_string(), rx, events));
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
        Box::new(WsChannel { tx })
    }
}

impl Drop for WsDialer {
    fn drop(&mut self) {
        let tasks: Vec<_> = self
            .tasks
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .filter(|t| !t.is_finished())
            .collect();
        if tasks.is_empty() {
            return;
        }
        // block_on panics inside another runtime; nothing can be flushed there.
        if tokio::runtime::Handle::try_current().is_ok() {
            tracing::debug!(pending = tasks.len(), "websocket dialer dropped inside a runtime");
            return;
        }
        tracing::debug!(pending = tasks.len(), "flushing websocket connections");
        let drained = self
            .runtime
            .block_on(tokio::time::timeout(SHUTDOWN_GRACE, join_all(tasks)));
        if drained.is_err() {
            tracing::warn!("websocket connections still open after {SHUTDOWN_GRACE:?}; dropping");
        }
    }
}

struct WsChannel {
    tx: UnboundedSender<Outbound>,
}

impl Channel for WsChannel {
    fn transmit(&mut self, text: String) -> Result<(), TransportError> {
        self.tx
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    fn shutdown(&mut self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

/// Resolves once the owner asks to close or drops its handle.
async fn close_requested(outbound: &mut UnboundedReceiver<Outbound>) {
    loop {
        match outbound.recv().await {
            Some(Outbound::Text(_)) => continue,
            Some(Outbound::Close) | None => return,
        }
    }
}

async fn run_connection(
    id: ConnectionId,
    url: String,
    mut outbound: UnboundedReceiver<Outbound>,
    events: EventSender,
) {
    let emit = |event: ConnectionEvent| {
        let _ = events.send(ConnectionUpdate { id, event });
    };

    let connect = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str()));
    let ws = tokio::select! {
        result = connect => match result {
            Ok(Ok((ws, response))) => {
                tracing::info!(connection = %id, url = %url, status = %response.status(), "websocket connected");
                ws
            }
            Ok(Err(e)) => {
                tracing::warn!(connection = %id, url = %url, "websocket connect failed: {e}");
                emit(ConnectionEvent::Error(TransportError::Connect {
                    url: url.clone(),
                    detail: e.to_string(),
                }));
                emit(ConnectionEvent::Closed);
                return;
            }
            Err(_) => {
                tracing::warn!(connection = %id, url = %url, "websocket connect timed out");
                emit(ConnectionEvent::Error(TransportError::Connect {
                    url: url.clone(),
                    detail: format!("timed out after {}s", CONNECT_TIMEOUT.as_secs()),
                }));
                emit(ConnectionEvent::Closed);
                return;
            }
        },
        _ = close_requested(&mut outbound) => {
            tracing::debug!(connection = %id, "close requested before connect finished");
            emit(ConnectionEvent::Closed);
            return;
        }
    };

    emit(ConnectionEvent::Opened);
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        emit(ConnectionEvent::Error(TransportError::Channel(e.to_string())));
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = sink.close().await {
                        tracing::debug!(connection = %id, "websocket close: {e}");
                    }
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => emit(ConnectionEvent::Message(text)),
                Some(Ok(Message::Binary(bytes))) => {
                    emit(ConnectionEvent::Message(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(connection = %id, ?frame, "peer closed websocket");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(ConnectionEvent::Error(TransportError::Channel(e.to_string())));
                    break;
                }
                None => break,
            },
        }
    }

    tracing::info!(connection = %id, "websocket closed");
    emit(ConnectionEvent::Closed);
}
