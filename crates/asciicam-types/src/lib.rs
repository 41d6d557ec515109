//! Wire and model types shared by the `asciicam` client library and front end.
//!
//! Control messages travel as JSON text frames tagged by a `type` field. Service
//! replies are raw text: either an opaque frame to display or one of the reserved
//! [`Sentinel`] values that drive the live streaming handshake.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role announced in the `auth` message.
pub const CONTROLLER_ROLE: &str = "controller";

/// Frame rate used when neither config nor flags pick one.
pub const DEFAULT_FPS: u32 = 10;

/// Client-to-service control message.
///
/// Also deserializable, so a service or a test peer can decode what the
/// client sends.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Controller authentication for the live stream.
    Auth { api_key: String, role: String },
    /// Capture configuration for the live stream.
    Config {
        camera_index: u32,
        resolution: Resolution,
        fps: u32,
    },
    /// Ask the service to stop the live stream.
    Stop,
    /// Begin replaying a recording.
    PlaybackStart { filename: String },
    PlaybackPause,
    PlaybackResume,
    PlaybackStop,
    /// Change the replay rate multiplier.
    PlaybackSpeed { speed: f64 },
}

impl ClientMessage {
    pub fn auth(credential: &Credential) -> Self {
        ClientMessage::Auth {
            api_key: credential.api_key.clone(),
            role: CONTROLLER_ROLE.to_string(),
        }
    }

    pub fn config(config: &StreamConfig) -> Self {
        ClientMessage::Config {
            camera_index: config.camera_index,
            resolution: config.resolution,
            fps: config.fps.get(),
        }
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Auth { .. } => "auth",
            ClientMessage::Config { .. } => "config",
            ClientMessage::Stop => "stop",
            ClientMessage::PlaybackStart { .. } => "playback_start",
            ClientMessage::PlaybackPause => "playback_pause",
            ClientMessage::PlaybackResume => "playback_resume",
            ClientMessage::PlaybackStop => "playback_stop",
            ClientMessage::PlaybackSpeed { .. } => "playback_speed",
        }
    }
}

/// Reserved service replies that drive the live streaming handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sentinel {
    AuthControllerSuccess,
    ConfigApplied,
    StreamStopped,
}

impl Sentinel {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentinel::AuthControllerSuccess => "AUTH_CONTROLLER_SUCCESS",
            Sentinel::ConfigApplied => "CONFIG_APPLIED",
            Sentinel::StreamStopped => "STREAM_STOPPED",
        }
    }

    /// Match a raw payload against the sentinels.
    ///
    /// Control characters (including NUL padding) are removed and surrounding
    /// whitespace trimmed before the exact comparison.
    pub fn parse(payload: &str) -> Option<Self> {
        let cleaned: String = payload.chars().filter(|c| !c.is_control()).collect();
        match cleaned.trim() {
            "AUTH_CONTROLLER_SUCCESS" => Some(Sentinel::AuthControllerSuccess),
            "CONFIG_APPLIED" => Some(Sentinel::ConfigApplied),
            "STREAM_STOPPED" => Some(Sentinel::StreamStopped),
            _ => None,
        }
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text frame resolutions the capture service accepts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "80x60")]
    Tiny,
    #[default]
    #[serde(rename = "120x90")]
    Small,
    #[serde(rename = "160x120")]
    Medium,
    #[serde(rename = "320x240")]
    Large,
    #[serde(rename = "640x480")]
    Huge,
}

impl Resolution {
    pub const ALL: [Resolution; 5] = [
        Resolution::Tiny,
        Resolution::Small,
        Resolution::Medium,
        Resolution::Large,
        Resolution::Huge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Tiny => "80x60",
            Resolution::Small => "120x90",
            Resolution::Medium => "160x120",
            Resolution::Large => "320x240",
            Resolution::Huge => "640x480",
        }
    }

    /// Next entry in [`Resolution::ALL`], wrapping around.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|r| *r == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let supported: Vec<&str> = Self::ALL.iter().map(|r| r.as_str()).collect();
                format!(
                    "unsupported resolution {wanted:?} (expected one of {})",
                    supported.join(", ")
                )
            })
    }
}

/// Capture settings sent once per live session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    pub camera_index: u32,
    pub resolution: Resolution,
    pub fps: NonZeroU32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            resolution: Resolution::default(),
            fps: NonZeroU32::new(DEFAULT_FPS).unwrap_or(NonZeroU32::MIN),
        }
    }
}

/// API key echoed in the `auth` message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credential {
    pub api_key: String,
}

impl Credential {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.api_key.is_empty()
    }
}

/// Payload of `GET /api`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialInfo {
    /// Stream endpoint advertised by the service.
    #[serde(default)]
    pub endpoint: Option<String>,
    pub api_key: String,
}

impl From<CredentialInfo> for Credential {
    fn from(info: CredentialInfo) -> Self {
        Credential::new(info.api_key)
    }
}

/// Entry of `GET /cameras`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
}

/// Entry of `GET /recordings`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recording {
    pub filename: String,
    /// File size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Duration in seconds, when the service could determine it.
    #[serde(default)]
    pub duration: Option<u64>,
    /// Modification time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub last_modified: i64,
    /// Preformatted capture time, if the service provides one.
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Recording picked for replay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackTarget {
    filename: String,
}

impl PlaybackTarget {
    /// Returns `None` for an empty (or whitespace-only) filename.
    pub fn new(filename: impl Into<String>) -> Option<Self> {
        let filename = filename.into();
        if filename.trim().is_empty() {
            return None;
        }
        Some(Self { filename })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}

impl fmt::Display for PlaybackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename)
    }
}

/// Positive replay rate multiplier.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct PlaybackSpeed(f64);

impl PlaybackSpeed {
    /// Steps offered by the front end.
    pub const PRESETS: [f64; 6] = [0.25, 0.5, 1.0, 1.5, 2.0, 4.0];

    /// Returns `None` unless `multiplier` is finite and strictly positive.
    pub fn new(multiplier: f64) -> Option<Self> {
        if multiplier.is_finite() && multiplier > 0.0 {
            Some(Self(multiplier))
        } else {
            None
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }

    /// Next preset above the current value, or the current value at the top.
    pub fn faster(self) -> Self {
        Self::PRESETS
            .iter()
            .copied()
            .find(|p| *p > self.0 + f64::EPSILON)
            .map(Self)
            .unwrap_or(self)
    }

    /// Next preset below the current value, or the current value at the bottom.
    pub fn slower(self) -> Self {
        Self::PRESETS
            .iter()
            .rev()
            .copied()
            .find(|p| *p < self.0 - f64::EPSILON)
            .map(Self)
            .unwrap_or(self)
    }
}

impl Default for PlaybackSpeed {
    fn default() -> Self {
        Self(1.0)
    }
}

impl fmt::Display for PlaybackSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn auth_message_carries_controller_role() {
        let msg = ClientMessage::auth(&Credential::new("k1"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({ "type": "auth", "api_key": "k1", "role": "controller" })
        );
    }

    #[test]
    fn config_message_uses_resolution_string() {
        let config = StreamConfig {
            camera_index: 2,
            resolution: Resolution::Huge,
            fps: NonZeroU32::new(10).unwrap(),
        };
        let value = serde_json::to_value(ClientMessage::config(&config)).unwrap();
        assert_eq!(
            value,
            json!({ "type": "config", "camera_index": 2, "resolution": "640x480", "fps": 10 })
        );
    }

    #[test]
    fn unit_messages_only_carry_type() {
        assert_eq!(
            serde_json::to_value(ClientMessage::Stop).unwrap(),
            json!({ "type": "stop" })
        );
        assert_eq!(
            serde_json::to_value(ClientMessage::PlaybackPause).unwrap(),
            json!({ "type": "playback_pause" })
        );
        assert_eq!(
            serde_json::to_value(ClientMessage::PlaybackResume).unwrap(),
            json!({ "type": "playback_resume" })
        );
    }

    #[test]
    fn playback_speed_message_carries_multiplier() {
        let value = serde_json::to_value(ClientMessage::PlaybackSpeed { speed: 2.0 }).unwrap();
        assert_eq!(value["type"], "playback_speed");
        assert_eq!(value["speed"].as_f64(), Some(2.0));
    }

    #[test]
    fn sentinel_parse_strips_control_characters() {
        assert_eq!(
            Sentinel::parse("CONFIG_APPLIED"),
            Some(Sentinel::ConfigApplied)
        );
        assert_eq!(
            Sentinel::parse("  AUTH_CONTROLLER_SUCCESS\r\n"),
            Some(Sentinel::AuthControllerSuccess)
        );
        assert_eq!(
            Sentinel::parse("STREAM_\0STOPPED\0"),
            Some(Sentinel::StreamStopped)
        );
    }

    #[test]
    fn sentinel_parse_requires_exact_match() {
        assert_eq!(Sentinel::parse("config_applied"), None);
        assert_eq!(Sentinel::parse("CONFIG_APPLIED now"), None);
        assert_eq!(Sentinel::parse(""), None);
        assert_eq!(Sentinel::parse("@@##..\n  .."), None);
    }

    #[test]
    fn resolution_parses_supported_strings() {
        assert_eq!("320x240".parse::<Resolution>(), Ok(Resolution::Large));
        assert_eq!(" 80X60 ".parse::<Resolution>(), Ok(Resolution::Tiny));
        assert!("1920x1080".parse::<Resolution>().is_err());
        assert_eq!(Resolution::Huge.next(), Resolution::Tiny);
    }

    #[test]
    fn playback_target_rejects_blank_filename() {
        assert!(PlaybackTarget::new("").is_none());
        assert!(PlaybackTarget::new("   ").is_none());
        assert_eq!(
            PlaybackTarget::new("ascii_stream_20240101_120000.asr")
                .unwrap()
                .filename(),
            "ascii_stream_20240101_120000.asr"
        );
    }

    #[test]
    fn playback_speed_validates_and_steps_presets() {
        assert!(PlaybackSpeed::new(0.0).is_none());
        assert!(PlaybackSpeed::new(-1.0).is_none());
        assert!(PlaybackSpeed::new(f64::NAN).is_none());

        let speed = PlaybackSpeed::default();
        assert_eq!(speed.faster().get(), 1.5);
        assert_eq!(speed.slower().get(), 0.5);
        assert_eq!(PlaybackSpeed::new(4.0).unwrap().faster().get(), 4.0);
        assert_eq!(PlaybackSpeed::new(0.25).unwrap().slower().get(), 0.25);
        assert_eq!(PlaybackSpeed::new(3.0).unwrap().faster().get(), 4.0);
    }

    #[test]
    fn client_message_decodes_on_the_service_side() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"playback_speed","speed":2.0}"#).unwrap();
        assert_eq!(msg, ClientMessage::PlaybackSpeed { speed: 2.0 });
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"stop"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Stop);
    }

    #[test]
    fn recording_tolerates_missing_optional_fields() {
        let rec: Recording =
            serde_json::from_value(json!({ "filename": "a.asr", "size": 2048 })).unwrap();
        assert_eq!(rec.duration, None);
        assert_eq!(rec.last_modified, 0);
        assert_eq!(rec.timestamp, None);
    }

    #[test]
    fn credential_info_converts_to_credential() {
        let info: CredentialInfo = serde_json::from_value(json!({
            "endpoint": "ws://localhost:8080/stream",
            "api_key": "abc"
        }))
        .unwrap();
        assert_eq!(Credential::from(info), Credential::new("abc"));
    }
}
