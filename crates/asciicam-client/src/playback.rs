//! Playback session: replays a stored recording over its own connection.
//!
//! Pause, resume and speed changes are client-authoritative; the service never
//! acknowledges them.

use asciicam_types::{ClientMessage, PlaybackSpeed, PlaybackTarget};

use crate::connection::{Connection, ConnectionEvent, ConnectionManager, ConnectionUpdate};
use crate::display::{DisplaySink, Notice};
use crate::error::{SessionError, SessionKind, TransportError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Connecting,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Connecting => "connecting",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        }
    }
}

#[derive(Debug)]
struct ActivePlayback {
    state: PlaybackState,
    connection: Connection,
    target: PlaybackTarget,
    speed: PlaybackSpeed,
}

pub struct PlaybackSession {
    url: String,
    selected: Option<PlaybackTarget>,
    active: Option<ActivePlayback>,
    last_error: Option<TransportError>,
    // Last, so an open connection is released before the dialer can be dropped.
    manager: ConnectionManager,
}

impl PlaybackSession {
    /// `url` is the full `/playback` endpoint.
    pub fn new(manager: ConnectionManager, url: impl Into<String>) -> Self {
        Self {
            manager,
            url: url.into(),
            selected: None,
            active: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.active
            .as_ref()
            .map(|a| a.state)
            .unwrap_or(PlaybackState::Idle)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Recording that the next `start` will play.
    pub fn selected(&self) -> Option<&PlaybackTarget> {
        self.selected.as_ref()
    }

    /// Recording currently being played.
    pub fn playing(&self) -> Option<&PlaybackTarget> {
        self.active.as_ref().map(|a| &a.target)
    }

    /// Last speed sent in this session, 1x when none was sent or idle.
    pub fn speed(&self) -> PlaybackSpeed {
        self.active.as_ref().map(|a| a.speed).unwrap_or_default()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.active.as_ref().map(|a| &a.connection)
    }

    pub fn last_error(&self) -> Option<&TransportError> {
        self.last_error.as_ref()
    }

    pub fn select(&mut self, target: PlaybackTarget) {
        tracing::debug!(filename = target.filename(), "recording selected");
        self.selected = Some(target);
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn start(&mut self, sink: &mut dyn DisplaySink) -> Result<(), SessionError> {
        let Some(target) = self.selected.clone() else {
            return Err(SessionError::NoTarget);
        };
        if self.active.is_some() {
            return Err(SessionError::AlreadyActive(SessionKind::Playback));
        }
        let connection = self.manager.open(&self.url);
        tracing::info!(
            connection = %connection.id(),
            url = %self.url,
            filename = target.filename(),
            "starting playback"
        );
        self.last_error = None;
        self.active = Some(ActivePlayback {
            state: PlaybackState::Connecting,
            connection,
            target,
            speed: PlaybackSpeed::default(),
        });
        sink.notice(Notice::Connecting);
        Ok(())
    }

    pub fn pause(&mut self, sink: &mut dyn DisplaySink) -> Result<(), SessionError> {
        let active = self.ready("pause", PlaybackState::Playing)?;
        active.connection.send(&ClientMessage::PlaybackPause);
        Self::enter(active, PlaybackState::Paused);
        sink.notice(Notice::PlaybackPaused);
        Ok(())
    }

    pub fn resume(&mut self, sink: &mut dyn DisplaySink) -> Result<(), SessionError> {
        let active = self.ready("resume", PlaybackState::Paused)?;
        active.connection.send(&ClientMessage::PlaybackResume);
        Self::enter(active, PlaybackState::Playing);
        sink.notice(Notice::PlaybackResumed);
        Ok(())
    }

    pub fn toggle_pause(&mut self, sink: &mut dyn DisplaySink) -> Result<(), SessionError> {
        match self.state() {
            PlaybackState::Paused => self.resume(sink),
            _ => self.pause(sink),
        }
    }

    /// Change the replay rate without touching play/pause state.
    pub fn set_speed(
        &mut self,
        speed: PlaybackSpeed,
        sink: &mut dyn DisplaySink,
    ) -> Result<(), SessionError> {
        let active = self.active_open("set speed")?;
        active
            .connection
            .send(&ClientMessage::PlaybackSpeed { speed: speed.get() });
        active.speed = speed;
        tracing::debug!(connection = %active.connection.id(), %speed, "playback speed changed");
        sink.notice(Notice::PlaybackSpeed(speed));
        Ok(())
    }

    /// [`PlaybackSession::set_speed`] from a raw multiplier.
    pub fn set_speed_multiplier(
        &mut self,
        multiplier: f64,
        sink: &mut dyn DisplaySink,
    ) -> Result<(), SessionError> {
        let speed = PlaybackSpeed::new(multiplier)
            .ok_or_else(|| SessionError::InvalidSpeed(multiplier.to_string()))?;
        self.set_speed(speed, sink)
    }

    /// Stop replay and drop the connection; `Idle` immediately.
    pub fn stop(&mut self, sink: &mut dyn DisplaySink) -> Result<(), SessionError> {
        let Some(mut active) = self.active.take() else {
            return Err(SessionError::NotActive(SessionKind::Playback));
        };
        if active.connection.is_open() {
            active.connection.send(&ClientMessage::PlaybackStop);
        }
        active.connection.close();
        tracing::info!(
            connection = %active.connection.id(),
            from = active.state.as_str(),
            "playback stopped"
        );
        sink.notice(Notice::PlaybackStopped);
        Ok(())
    }

    /// Route a connection event. Returns `false` if it belongs to another connection.
    pub fn handle(&mut self, update: &ConnectionUpdate, sink: &mut dyn DisplaySink) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if active.connection.id() != update.id {
            return false;
        }
        active.connection.apply(&update.event);

        match &update.event {
            ConnectionEvent::Opened => {
                if active.state == PlaybackState::Connecting {
                    active.connection.send(&ClientMessage::PlaybackStart {
                        filename: active.target.filename().to_string(),
                    });
                    Self::enter(active, PlaybackState::Playing);
                    sink.notice(Notice::PlaybackStarted {
                        filename: active.target.filename().to_string(),
                    });
                }
            }
            ConnectionEvent::Message(text) => sink.frame(text),
            ConnectionEvent::Closed => {
                tracing::info!(connection = %update.id, "playback connection closed by service");
                self.active = None;
                sink.notice(Notice::ConnectionLost);
            }
            ConnectionEvent::Error(err) => {
                tracing::warn!(connection = %update.id, "playback error: {err}");
                active.connection.close();
                self.active = None;
                self.last_error = Some(err.clone());
                sink.notice(Notice::Error(err.to_string()));
            }
        }
        true
    }

    fn enter(active: &mut ActivePlayback, next: PlaybackState) {
        tracing::info!(
            connection = %active.connection.id(),
            from = active.state.as_str(),
            to = next.as_str(),
            "playback session transition"
        );
        active.state = next;
    }

    fn active_open(&mut self, action: &'static str) -> Result<&mut ActivePlayback, SessionError> {
        let active = self
            .active
            .as_mut()
            .ok_or(SessionError::NotActive(SessionKind::Playback))?;
        if !active.connection.is_open() {
            return Err(SessionError::NotConnected);
        }
        if active.state == PlaybackState::Connecting {
            return Err(SessionError::InvalidState {
                action,
                state: active.state.as_str(),
            });
        }
        Ok(active)
    }

    fn ready(
        &mut self,
        action: &'static str,
        required: PlaybackState,
    ) -> Result<&mut ActivePlayback, SessionError> {
        let active = self.active_open(action)?;
        if active.state != required {
            return Err(SessionError::InvalidState {
                action,
                state: active.state.as_str(),
            });
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::connection::{ConnectionId, MemoryDialer};
    use crate::display::FrameBuffer;

    struct Harness {
        dialer: MemoryDialer,
        session: PlaybackSession,
        sink: FrameBuffer,
    }

    impl Harness {
        fn new() -> Self {
            let dialer = MemoryDialer::new();
            let (tx, _rx) = crossbeam_channel::unbounded();
            let manager = ConnectionManager::new(Arc::new(dialer.clone()), tx);
            Self {
                dialer,
                session: PlaybackSession::new(manager, "ws://camhost:8080/playback"),
                sink: FrameBuffer::new(),
            }
        }

        fn feed(&mut self, id: ConnectionId, event: ConnectionEvent) -> bool {
            self.session
                .handle(&ConnectionUpdate { id, event }, &mut self.sink)
        }

        fn playing(&mut self, filename: &str) -> ConnectionId {
            self.session.select(PlaybackTarget::new(filename).unwrap());
            self.session.start(&mut self.sink).expect("start");
            let id = self.dialer.last_id().expect("dialed");
            self.feed(id, ConnectionEvent::Opened);
            assert_eq!(self.session.state(), PlaybackState::Playing);
            id
        }
    }

    #[test]
    fn start_without_target_opens_nothing() {
        let mut h = Harness::new();
        assert_eq!(h.session.start(&mut h.sink), Err(SessionError::NoTarget));
        assert_eq!(h.dialer.dial_count(), 0);
        assert!(h.session.is_idle());
    }

    #[test]
    fn open_sends_playback_start_for_selected_file() {
        let mut h = Harness::new();
        let id = h.playing("recording_20240101.txt");
        assert_eq!(
            h.dialer.dialed_urls(),
            vec!["ws://camhost:8080/playback".to_string()]
        );
        assert_eq!(
            h.dialer.sent_messages(id),
            vec![ClientMessage::PlaybackStart {
                filename: "recording_20240101.txt".into()
            }]
        );
        assert_eq!(h.sink.status, "Playing recording_20240101.txt");
    }

    #[test]
    fn start_while_active_is_rejected() {
        let mut h = Harness::new();
        h.playing("a.txt");
        assert_eq!(
            h.session.start(&mut h.sink),
            Err(SessionError::AlreadyActive(SessionKind::Playback))
        );
        assert_eq!(h.dialer.dial_count(), 1);
    }

    #[test]
    fn pause_and_resume_alternate() {
        let mut h = Harness::new();
        let id = h.playing("a.txt");
        h.session.toggle_pause(&mut h.sink).unwrap();
        assert_eq!(h.session.state(), PlaybackState::Paused);
        assert_eq!(h.sink.status, "Paused");
        h.session.toggle_pause(&mut h.sink).unwrap();
        assert_eq!(h.session.state(), PlaybackState::Playing);

        assert!(matches!(
            h.session.resume(&mut h.sink),
            Err(SessionError::InvalidState { action: "resume", .. })
        ));
        let sent = h.dialer.sent_messages(id);
        assert_eq!(
            sent[1..],
            [ClientMessage::PlaybackPause, ClientMessage::PlaybackResume]
        );
    }

    #[test]
    fn speed_change_while_paused_keeps_paused() {
        let mut h = Harness::new();
        let id = h.playing("a.txt");
        h.session.pause(&mut h.sink).unwrap();
        h.session
            .set_speed(PlaybackSpeed::new(2.0).unwrap(), &mut h.sink)
            .unwrap();
        assert_eq!(h.session.state(), PlaybackState::Paused);
        assert_eq!(h.session.speed().get(), 2.0);

        let speeds: Vec<_> = h
            .dialer
            .sent_messages(id)
            .into_iter()
            .filter(|m| matches!(m, ClientMessage::PlaybackSpeed { .. }))
            .collect();
        assert_eq!(speeds, vec![ClientMessage::PlaybackSpeed { speed: 2.0 }]);
        assert!(h.dialer.sent(id).contains(&r#"{"type":"playback_speed","speed":2.0}"#.to_string()));
    }

    #[test]
    fn invalid_speed_is_rejected_without_sending() {
        let mut h = Harness::new();
        let id = h.playing("a.txt");
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                h.session.set_speed_multiplier(bad, &mut h.sink),
                Err(SessionError::InvalidSpeed(_))
            ));
        }
        assert_eq!(h.dialer.sent(id).len(), 1);
    }

    #[test]
    fn controls_require_open_connection() {
        let mut h = Harness::new();
        assert_eq!(
            h.session.pause(&mut h.sink),
            Err(SessionError::NotActive(SessionKind::Playback))
        );

        h.session.select(PlaybackTarget::new("a.txt").unwrap());
        h.session.start(&mut h.sink).unwrap();
        assert_eq!(h.session.pause(&mut h.sink), Err(SessionError::NotConnected));
        assert_eq!(
            h.session
                .set_speed(PlaybackSpeed::default(), &mut h.sink),
            Err(SessionError::NotConnected)
        );
        assert_eq!(h.session.state(), PlaybackState::Connecting);
    }

    #[test]
    fn stop_sends_playback_stop_and_goes_idle_immediately() {
        let mut h = Harness::new();
        let id = h.playing("a.txt");
        h.session.stop(&mut h.sink).unwrap();
        assert!(h.session.is_idle());
        assert_eq!(h.sink.status, "Playback stopped");
        assert_eq!(
            h.dialer.sent_messages(id).last(),
            Some(&ClientMessage::PlaybackStop)
        );
        assert_eq!(h.dialer.close_count(id), 1);

        // Late close of the stopped connection raises no error.
        assert!(!h.feed(id, ConnectionEvent::Closed));
        assert_eq!(h.sink.last_notice(), Some(&Notice::PlaybackStopped));
    }

    #[test]
    fn stop_while_connecting_sends_nothing() {
        let mut h = Harness::new();
        h.session.select(PlaybackTarget::new("a.txt").unwrap());
        h.session.start(&mut h.sink).unwrap();
        let id = h.dialer.last_id().unwrap();
        h.session.stop(&mut h.sink).unwrap();
        assert!(h.dialer.sent(id).is_empty());
        assert_eq!(h.dialer.close_count(id), 1);
        assert!(!h.feed(id, ConnectionEvent::Opened));
        assert!(h.dialer.sent(id).is_empty());
    }

    #[test]
    fn inbound_messages_are_shown_verbatim() {
        let mut h = Harness::new();
        let id = h.playing("a.txt");
        h.feed(id, ConnectionEvent::Message("##..\n..##".into()));
        assert_eq!(h.sink.frame, "##..\n..##");
    }

    #[test]
    fn unsolicited_close_surfaces_notice() {
        let mut h = Harness::new();
        let id = h.playing("a.txt");
        h.session.pause(&mut h.sink).unwrap();
        h.feed(id, ConnectionEvent::Closed);
        assert!(h.session.is_idle());
        assert_eq!(h.session.speed(), PlaybackSpeed::default());
        assert_eq!(h.sink.last_notice(), Some(&Notice::ConnectionLost));
        // The selection survives so the same file can be replayed.
        assert_eq!(h.session.selected().map(|t| t.filename()), Some("a.txt"));
    }

    #[test]
    fn error_records_and_collapses_to_idle() {
        let mut h = Harness::new();
        let id = h.playing("a.txt");
        let err = TransportError::Channel("reset".into());
        h.feed(id, ConnectionEvent::Error(err.clone()));
        assert!(h.session.is_idle());
        assert_eq!(h.session.last_error(), Some(&err));
        assert_eq!(h.dialer.close_count(id), 1);
    }

    #[test]
    fn cleared_selection_blocks_start() {
        let mut h = Harness::new();
        h.session.select(PlaybackTarget::new("a.txt").unwrap());
        h.session.clear_selection();
        assert_eq!(h.session.start(&mut h.sink), Err(SessionError::NoTarget));
    }
}
