//! Live streaming session.
//!
//! Handshake (authenticated mode):
//! `Connecting` -(opened / send auth)-> `Authenticating`
//! -(`AUTH_CONTROLLER_SUCCESS` / send config)-> `Configuring`
//! -(`CONFIG_APPLIED`)-> `Streaming`.
//! Unauthenticated mode sends `config` on open and goes straight to `Streaming`.
//!
//! Stopping sends `stop` and waits for `STREAM_STOPPED`, the channel closing, or
//! the grace deadline, whichever comes first. Every failure collapses to `Idle`;
//! there is no reconnect.
//!
//! All transitions live in [`transition`]; the session only performs the effects
//! it returns.

use std::time::{Duration, Instant};

use asciicam_types::{ClientMessage, Credential, Sentinel, StreamConfig};

use crate::config::HandshakeMode;
use crate::connection::{Connection, ConnectionEvent, ConnectionManager, ConnectionUpdate};
use crate::display::{DisplaySink, Notice};
use crate::error::{SessionError, SessionKind, TransportError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiveState {
    Idle,
    Connecting,
    Authenticating,
    Configuring,
    Streaming,
    Stopping,
}

impl LiveState {
    pub fn as_str(self) -> &'static str {
        match self {
            LiveState::Idle => "idle",
            LiveState::Connecting => "connecting",
            LiveState::Authenticating => "authenticating",
            LiveState::Configuring => "configuring",
            LiveState::Streaming => "streaming",
            LiveState::Stopping => "stopping",
        }
    }
}

/// Inputs of the live transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LiveInput<'a> {
    Opened,
    Frame(&'a str),
    Sentinel(Sentinel),
    Closed,
    Failed,
    StopRequested,
    GraceElapsed,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum LiveEffect<'a> {
    SendAuth,
    SendConfig,
    SendStop,
    ArmGrace,
    Close,
    ShowFrame(&'a str),
    Notify(Notice),
}

#[derive(Debug, PartialEq)]
pub(crate) struct Step<'a> {
    pub(crate) next: LiveState,
    pub(crate) effects: Vec<LiveEffect<'a>>,
}

/// The live session transition table.
///
/// `channel_open` tells whether a `stop` can still be delivered.
pub(crate) fn transition<'a>(
    state: LiveState,
    input: LiveInput<'a>,
    handshake: HandshakeMode,
    channel_open: bool,
) -> Step<'a> {
    use LiveEffect::*;
    use LiveInput as In;
    use LiveState as S;

    let stay = |effects: Vec<LiveEffect<'a>>| Step {
        next: state,
        effects,
    };
    let to = |next: LiveState, effects: Vec<LiveEffect<'a>>| Step { next, effects };

    match (state, input) {
        (S::Idle, _) => stay(vec![]),

        (S::Connecting, In::Opened) => match handshake {
            HandshakeMode::Authenticated => to(S::Authenticating, vec![SendAuth]),
            HandshakeMode::Unauthenticated => {
                to(S::Streaming, vec![SendConfig, Notify(Notice::StreamStarted)])
            }
        },
        (_, In::Opened) => stay(vec![]),

        (S::Authenticating, In::Sentinel(Sentinel::AuthControllerSuccess)) => {
            to(S::Configuring, vec![SendConfig])
        }
        (S::Configuring, In::Sentinel(Sentinel::ConfigApplied)) => {
            to(S::Streaming, vec![Notify(Notice::StreamStarted)])
        }
        (S::Streaming | S::Stopping, In::Sentinel(Sentinel::StreamStopped)) => {
            to(S::Idle, vec![Close, Notify(Notice::StreamStopped)])
        }
        (_, In::Sentinel(_)) => stay(vec![]),

        (S::Authenticating | S::Configuring | S::Streaming, In::Frame(text)) => {
            stay(vec![ShowFrame(text)])
        }
        (_, In::Frame(_)) => stay(vec![]),

        (S::Stopping, In::GraceElapsed) => to(S::Idle, vec![Close, Notify(Notice::StreamStopped)]),
        (_, In::GraceElapsed) => stay(vec![]),

        // Closed implies stop; the channel is gone so nothing is sent.
        (S::Stopping, In::Closed) => to(S::Idle, vec![Notify(Notice::StreamStopped)]),
        (_, In::Closed) => to(S::Idle, vec![Notify(Notice::ConnectionLost)]),

        (S::Stopping, In::StopRequested | In::Failed) => stay(vec![]),
        (_, In::StopRequested) if channel_open => {
            to(S::Stopping, vec![SendStop, ArmGrace, Notify(Notice::Stopping)])
        }
        (_, In::StopRequested) => to(S::Idle, vec![Close, Notify(Notice::StreamStopped)]),
        (_, In::Failed) if channel_open => to(S::Stopping, vec![SendStop, ArmGrace]),
        (_, In::Failed) => to(S::Idle, vec![Close]),
    }
}

#[derive(Clone, Debug)]
pub struct LiveSettings {
    /// Full `ws://` or `wss://` URL of the `/stream` endpoint.
    pub url: String,
    pub handshake: HandshakeMode,
    pub stop_grace: Duration,
}

/// Per-attempt state; exists only while the session is not idle.
#[derive(Debug)]
struct ActiveStream {
    state: LiveState,
    connection: Connection,
    config: StreamConfig,
    credential: Credential,
    grace_deadline: Option<Instant>,
}

pub struct LiveSession {
    settings: LiveSettings,
    active: Option<ActiveStream>,
    last_error: Option<TransportError>,
    // Last, so an open connection is released before the dialer can be dropped.
    manager: ConnectionManager,
}

impl LiveSession {
    pub fn new(manager: ConnectionManager, settings: LiveSettings) -> Self {
        Self {
            manager,
            settings,
            active: None,
            last_error: None,
        }
    }

    pub fn settings(&self) -> &LiveSettings {
        &self.settings
    }

    pub fn state(&self) -> LiveState {
        self.active
            .as_ref()
            .map(|a| a.state)
            .unwrap_or(LiveState::Idle)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.active.as_ref().map(|a| &a.connection)
    }

    /// Configuration of the running attempt.
    pub fn config(&self) -> Option<&StreamConfig> {
        self.active.as_ref().map(|a| &a.config)
    }

    /// Transport error seen by the most recent attempt.
    pub fn last_error(&self) -> Option<&TransportError> {
        self.last_error.as_ref()
    }

    pub fn owns(&self, update: &ConnectionUpdate) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.connection.id() == update.id)
    }

    /// Open a connection and begin the handshake.
    ///
    /// The credential is only sent in authenticated mode; an empty one is sent as-is.
    pub fn start(
        &mut self,
        config: StreamConfig,
        credential: Credential,
        sink: &mut dyn DisplaySink,
    ) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyActive(SessionKind::Live));
        }
        let connection = self.manager.open(&self.settings.url);
        tracing::info!(
            connection = %connection.id(),
            url = %self.settings.url,
            camera = config.camera_index,
            resolution = %config.resolution,
            fps = config.fps.get(),
            handshake = ?self.settings.handshake,
            "starting live stream"
        );
        self.last_error = None;
        self.active = Some(ActiveStream {
            state: LiveState::Connecting,
            connection,
            config,
            credential,
            grace_deadline: None,
        });
        sink.notice(Notice::Connecting);
        Ok(())
    }

    /// Ask the service to stop, or drop a connection that never opened.
    pub fn stop(&mut self, sink: &mut dyn DisplaySink) -> Result<(), SessionError> {
        match self.state() {
            LiveState::Idle => Err(SessionError::NotActive(SessionKind::Live)),
            LiveState::Stopping => Err(SessionError::InvalidState {
                action: "stop",
                state: LiveState::Stopping.as_str(),
            }),
            _ => {
                self.drive(LiveInput::StopRequested, sink);
                Ok(())
            }
        }
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
            ConnectionEvent::Opened => self.drive(LiveInput::Opened, sink),
            ConnectionEvent::Message(payload) => {
                let input = match Sentinel::parse(payload) {
                    Some(sentinel) => {
                        tracing::debug!(%sentinel, state = self.state().as_str(), "live sentinel");
                        LiveInput::Sentinel(sentinel)
                    }
                    None => LiveInput::Frame(payload),
                };
                self.drive(input, sink);
            }
            ConnectionEvent::Closed => self.drive(LiveInput::Closed, sink),
            ConnectionEvent::Error(err) => {
                tracing::warn!(connection = %update.id, state = self.state().as_str(), "live stream error: {err}");
                self.last_error = Some(err.clone());
                sink.notice(Notice::Error(err.to_string()));
                self.drive(LiveInput::Failed, sink);
            }
        }
        true
    }

    /// Earliest instant at which [`LiveSession::on_tick`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.as_ref().and_then(|a| a.grace_deadline)
    }

    /// Fire the stop grace timer if it has expired.
    pub fn on_tick(&mut self, now: Instant, sink: &mut dyn DisplaySink) {
        if self.next_deadline().is_some_and(|deadline| now >= deadline) {
            tracing::debug!("stop grace period elapsed; closing");
            self.drive(LiveInput::GraceElapsed, sink);
        }
    }

    fn drive(&mut self, input: LiveInput<'_>, sink: &mut dyn DisplaySink) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let from = active.state;
        let step = transition(
            from,
            input,
            self.settings.handshake,
            active.connection.is_open(),
        );

        for effect in step.effects {
            match effect {
                LiveEffect::SendAuth => {
                    if active.credential.is_empty() {
                        tracing::warn!("authenticating with an empty api key");
                    }
                    active.connection.send(&ClientMessage::auth(&active.credential));
                }
                LiveEffect::SendConfig => {
                    active.connection.send(&ClientMessage::config(&active.config));
                }
                LiveEffect::SendStop => {
                    active.connection.send(&ClientMessage::Stop);
                }
                LiveEffect::ArmGrace => {
                    active.grace_deadline = Some(Instant::now() + self.settings.stop_grace);
                }
                LiveEffect::Close => active.connection.close(),
                LiveEffect::ShowFrame(text) => sink.frame(text),
                LiveEffect::Notify(notice) => sink.notice(notice),
            }
        }

        if step.next != from {
            tracing::info!(
                connection = %active.connection.id(),
                from = from.as_str(),
                to = step.next.as_str(),
                "live session transition"
            );
        }
        if step.next == LiveState::Idle {
            self.active = None;
        } else {
            active.state = step.next;
        }
    }
}
