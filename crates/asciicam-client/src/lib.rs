//! Client-side session control for an ASCII camera service.
//!
//! A [`hub::SessionHub`] drives the [`live::LiveSession`] (controller handshake,
//! streaming, graceful stop) and the [`playback::PlaybackSession`] (replay of a
//! stored recording) from one loop. Connections come from a
//! [`connection::Dialer`]: WebSockets in production, an in-memory recorder in
//! tests.

pub mod config;
pub mod connection;
pub mod credentials;
pub mod directory;
pub mod display;
pub mod error;
pub mod hub;
pub mod live;
pub mod playback;

pub use config::{HandshakeMode, ResolvedConfig, TransportSecurity};
pub use directory::DirectoryClient;
pub use display::{DisplaySink, FrameBuffer, Notice};
pub use error::{SessionError, SessionKind, TransportError};
pub use hub::SessionHub;
pub use live::{LiveSession, LiveState};
pub use playback::{PlaybackSession, PlaybackState};
