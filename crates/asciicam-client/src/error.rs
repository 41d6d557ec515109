//! Error types surfaced by sessions and the connection layer.

use std::fmt;

use thiserror::Error;

/// Which control session an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionKind {
    Live,
    Playback,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Live => f.write_str("live"),
            SessionKind::Playback => f.write_str("playback"),
        }
    }
}

/// A session operation was requested in a state that does not allow it.
///
/// These are reported to the user; the session state is left untouched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0} session is already active")]
    AlreadyActive(SessionKind),
    #[error("{0} session is not active")]
    NotActive(SessionKind),
    #[error("no recording selected")]
    NoTarget,
    #[error("connection is not open")]
    NotConnected,
    #[error("invalid playback speed {0}")]
    InvalidSpeed(String),
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
}

/// Failure of the duplex channel itself.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect to {url} failed: {detail}")]
    Connect { url: String, detail: String },
    #[error("channel error: {0}")]
    Channel(String),
    #[error("channel is closed")]
    Closed,
}
