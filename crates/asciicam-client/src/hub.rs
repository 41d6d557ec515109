//! Single-threaded driver for both sessions.
//!
//! Connection updates from every dialed channel arrive on one crossbeam channel;
//! the front end's loop calls [`SessionHub::wait`] or [`SessionHub::pump`] and
//! each update is handed to whichever session owns the connection. Grace timers
//! are plain deadlines checked on the same loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use asciicam_types::{Credential, StreamConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};

use crate::config::{HandshakeMode, ResolvedConfig};
use crate::connection::{ConnectionManager, ConnectionUpdate, Dialer, WsDialer};
use crate::credentials::{CredentialCache, CredentialSource};
use crate::display::DisplaySink;
use crate::error::{SessionError, SessionKind};
use crate::live::{LiveSession, LiveSettings};
use crate::playback::PlaybackSession;

pub struct SessionHub {
    #[cfg(test)]
    sender: crate::connection::EventSender,
    events: Receiver<ConnectionUpdate>,
    live: LiveSession,
    playback: PlaybackSession,
    credentials: CredentialCache,
    defaults: StreamConfig,
}

impl SessionHub {
    pub fn new(dialer: Arc<dyn Dialer>, config: &ResolvedConfig) -> Self {
        let (sender, events) = unbounded();
        let manager = ConnectionManager::new(dialer, sender.clone());
        let live = LiveSession::new(
            manager.clone(),
            LiveSettings {
                url: config.stream_url(),
                handshake: config.handshake,
                stop_grace: config.stop_grace,
            },
        );
        let playback = PlaybackSession::new(manager, config.playback_url());
        Self {
            #[cfg(test)]
            sender,
            events,
            live,
            playback,
            credentials: CredentialCache::new(),
            defaults: config.stream_config(),
        }
    }

    /// Hub backed by real WebSocket connections.
    pub fn websocket(config: &ResolvedConfig) -> anyhow::Result<Self> {
        let dialer = WsDialer::new().map_err(|e| anyhow::anyhow!("start websocket runtime: {e}"))?;
        Ok(Self::new(Arc::new(dialer), config))
    }

    #[cfg(test)]
    pub(crate) fn sender(&self) -> crate::connection::EventSender {
        self.sender.clone()
    }

    pub fn live(&self) -> &LiveSession {
        &self.live
    }

    pub fn live_mut(&mut self) -> &mut LiveSession {
        &mut self.live
    }

    pub fn playback(&self) -> &PlaybackSession {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackSession {
        &mut self.playback
    }

    /// Stream settings from configuration.
    pub fn defaults(&self) -> StreamConfig {
        self.defaults
    }

    /// Start a live session, fetching the credential first in authenticated mode.
    pub fn start_live(
        &mut self,
        config: StreamConfig,
        source: &dyn CredentialSource,
        sink: &mut dyn DisplaySink,
    ) -> Result<(), SessionError> {
        if !self.live.is_idle() {
            return Err(SessionError::AlreadyActive(SessionKind::Live));
        }
        let credential = match self.live.settings().handshake {
            HandshakeMode::Authenticated => self.credentials.get_or_fetch(source),
            HandshakeMode::Unauthenticated => Credential::default(),
        };
        self.live.start(config, credential, sink)
    }

    /// Hand one update to its owner. Updates for retired connections are dropped.
    pub fn dispatch(&mut self, update: &ConnectionUpdate, sink: &mut dyn DisplaySink) -> bool {
        if self.live.handle(update, sink) || self.playback.handle(update, sink) {
            return true;
        }
        tracing::debug!(connection = %update.id, event = ?update.event, "dropping update for retired connection");
        false
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.live.next_deadline()
    }

    /// Drain queued updates without blocking, then fire expired timers.
    pub fn pump(&mut self, now: Instant, sink: &mut dyn DisplaySink) -> usize {
        let mut handled = 0;
        while let Ok(update) = self.events.try_recv() {
            if self.dispatch(&update, sink) {
                handled += 1;
            }
        }
        self.live.on_tick(now, sink);
        handled
    }

    /// Block for at most `max` (or until the next deadline), then pump.
    pub fn wait(&mut self, max: Duration, sink: &mut dyn DisplaySink) -> usize {
        let timeout = match self.next_deadline() {
            Some(deadline) => max.min(deadline.saturating_duration_since(Instant::now())),
            None => max,
        };
        let mut handled = 0;
        match self.events.recv_timeout(timeout) {
            Ok(update) => {
                if self.dispatch(&update, sink) {
                    handled += 1;
                }
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
        }
        handled + self.pump(Instant::now(), sink)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use asciicam_types::{ClientMessage, PlaybackTarget};

    use super::*;
    use crate::config::{ClientConfig, Overrides, resolve};
    use crate::connection::{ConnectionEvent, MemoryDialer};
    use crate::display::FrameBuffer;
    use crate::live::LiveState;
    use crate::playback::PlaybackState;

    struct FixedKey {
        calls: Cell<usize>,
    }

    impl CredentialSource for FixedKey {
        fn fetch_credential(&self) -> anyhow::Result<Credential> {
            self.calls.set(self.calls.get() + 1);
            Ok(Credential::new("k1"))
        }
    }

    fn hub(handshake: HandshakeMode) -> (SessionHub, MemoryDialer) {
        let cfg = ClientConfig {
            server: Some("camhost:8080".to_string()),
            handshake: Some(handshake),
            ..ClientConfig::default()
        };
        let resolved = resolve(&cfg, &Overrides::default()).unwrap();
        let dialer = MemoryDialer::new();
        (SessionHub::new(Arc::new(dialer.clone()), &resolved), dialer)
    }

    fn push(hub: &SessionHub, dialer: &MemoryDialer, event: ConnectionEvent) {
        let id = dialer.last_id().unwrap();
        hub.sender().send(ConnectionUpdate { id, event }).unwrap();
    }

    #[test]
    fn authenticated_start_fetches_credential_once() {
        let (mut hub, dialer) = hub(HandshakeMode::Authenticated);
        let source = FixedKey { calls: Cell::new(0) };
        let mut sink = FrameBuffer::new();

        hub.start_live(hub.defaults(), &source, &mut sink).unwrap();
        assert_eq!(
            hub.start_live(hub.defaults(), &source, &mut sink),
            Err(SessionError::AlreadyActive(SessionKind::Live))
        );
        assert_eq!(source.calls.get(), 1);

        push(&hub, &dialer, ConnectionEvent::Opened);
        hub.pump(Instant::now(), &mut sink);
        let id = dialer.last_id().unwrap();
        assert_eq!(
            dialer.sent_messages(id),
            vec![ClientMessage::Auth {
                api_key: "k1".into(),
                role: "controller".into()
            }]
        );
        assert_eq!(hub.live().state(), LiveState::Authenticating);
    }

    #[test]
    fn unauthenticated_start_skips_credential() {
        let (mut hub, _dialer) = hub(HandshakeMode::Unauthenticated);
        let source = FixedKey { calls: Cell::new(0) };
        let mut sink = FrameBuffer::new();
        hub.start_live(hub.defaults(), &source, &mut sink).unwrap();
        assert_eq!(source.calls.get(), 0);
    }

    #[test]
    fn wait_fires_grace_deadline() {
        let (mut hub, dialer) = hub(HandshakeMode::Unauthenticated);
        let source = FixedKey { calls: Cell::new(0) };
        let mut sink = FrameBuffer::new();
        hub.start_live(hub.defaults(), &source, &mut sink).unwrap();
        push(&hub, &dialer, ConnectionEvent::Opened);
        hub.wait(Duration::from_millis(50), &mut sink);
        assert_eq!(hub.live().state(), LiveState::Streaming);

        hub.live_mut().stop(&mut sink).unwrap();
        let started = Instant::now();
        while !hub.live().is_idle() && started.elapsed() < Duration::from_secs(5) {
            hub.wait(Duration::from_millis(100), &mut sink);
        }
        assert!(hub.live().is_idle());
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn updates_route_to_owning_session() {
        let (mut hub, dialer) = hub(HandshakeMode::Unauthenticated);
        let source = FixedKey { calls: Cell::new(0) };
        let mut sink = FrameBuffer::new();

        hub.start_live(hub.defaults(), &source, &mut sink).unwrap();
        let live_id = dialer.last_id().unwrap();
        hub.playback_mut()
            .select(PlaybackTarget::new("a.txt").unwrap());
        hub.playback_mut().start(&mut sink).unwrap();
        let playback_id = dialer.last_id().unwrap();

        let sender = hub.sender();
        sender
            .send(ConnectionUpdate { id: playback_id, event: ConnectionEvent::Opened })
            .unwrap();
        assert_eq!(hub.pump(Instant::now(), &mut sink), 1);
        assert_eq!(hub.playback().state(), PlaybackState::Playing);
        assert_eq!(hub.live().state(), LiveState::Connecting);

        sender
            .send(ConnectionUpdate { id: live_id, event: ConnectionEvent::Closed })
            .unwrap();
        hub.pump(Instant::now(), &mut sink);
        assert!(hub.live().is_idle());
        assert_eq!(hub.playback().state(), PlaybackState::Playing);

        sender
            .send(ConnectionUpdate { id: live_id, event: ConnectionEvent::Opened })
            .unwrap();
        assert_eq!(hub.pump(Instant::now(), &mut sink), 0);
    }
}
