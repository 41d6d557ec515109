//! Configuration loading and resolution.
//!
//! The TOML file is optional; every field falls back to a command-line override
//! or a built-in default.

use std::num::NonZeroU32;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use asciicam_types::{DEFAULT_FPS, Resolution, StreamConfig};
use serde::Deserialize;

pub const DEFAULT_STOP_GRACE_MS: u64 = 300;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 2000;

/// Whether the live handshake authenticates before configuring.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeMode {
    #[default]
    Authenticated,
    Unauthenticated,
}

impl FromStr for HandshakeMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "authenticated" | "auth" => Ok(HandshakeMode::Authenticated),
            "unauthenticated" | "none" => Ok(HandshakeMode::Unauthenticated),
            other => Err(format!(
                "unknown handshake mode {other:?} (expected authenticated or unauthenticated)"
            )),
        }
    }
}

/// Plain (`ws`/`http`) or secured (`wss`/`https`) transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportSecurity {
    #[default]
    Plain,
    Secured,
}

impl TransportSecurity {
    pub fn ws_scheme(self) -> &'static str {
        match self {
            TransportSecurity::Plain => "ws",
            TransportSecurity::Secured => "wss",
        }
    }

    pub fn http_scheme(self) -> &'static str {
        match self {
            TransportSecurity::Plain => "http",
            TransportSecurity::Secured => "https",
        }
    }
}

impl FromStr for TransportSecurity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(TransportSecurity::Plain),
            "secured" | "secure" | "tls" => Ok(TransportSecurity::Secured),
            other => Err(format!(
                "unknown transport {other:?} (expected plain or secured)"
            )),
        }
    }
}

/// Client configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct ClientConfig {
    /// Service address (host:port), optionally with an http(s)/ws(s) scheme.
    pub server: Option<String>,
    pub handshake: Option<HandshakeMode>,
    pub transport: Option<TransportSecurity>,
    /// Frame rate requested in `config` messages.
    pub fps: Option<u32>,
    /// How long to wait for `STREAM_STOPPED` after sending `stop`.
    pub stop_grace_ms: Option<u64>,
    /// Default capture resolution, e.g. "120x90".
    pub resolution: Option<String>,
    pub camera_index: Option<u32>,
    /// Timeout for each directory HTTP call.
    pub http_timeout_ms: Option<u64>,
}

impl ClientConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ClientConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Values given on the command line; they win over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub server: Option<String>,
    pub handshake: Option<HandshakeMode>,
    pub transport: Option<TransportSecurity>,
    pub fps: Option<u32>,
    pub resolution: Option<Resolution>,
    pub camera_index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Normalized `host[:port]`, no scheme and no trailing slash.
    pub host: String,
    pub handshake: HandshakeMode,
    pub transport: TransportSecurity,
    pub fps: NonZeroU32,
    pub stop_grace: Duration,
    pub resolution: Resolution,
    pub camera_index: u32,
    pub http_timeout: Duration,
}

impl ResolvedConfig {
    pub fn stream_url(&self) -> String {
        format!("{}://{}/stream", self.transport.ws_scheme(), self.host)
    }

    pub fn playback_url(&self) -> String {
        format!("{}://{}/playback", self.transport.ws_scheme(), self.host)
    }

    pub fn http_base(&self) -> String {
        format!("{}://{}", self.transport.http_scheme(), self.host)
    }

    /// Stream settings for a session started without further choices.
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            camera_index: self.camera_index,
            resolution: self.resolution,
            fps: self.fps,
        }
    }
}

/// Merge file values, overrides and defaults, validating the result.
pub fn resolve(cfg: &ClientConfig, overrides: &Overrides) -> Result<ResolvedConfig> {
    let raw_server = overrides
        .server
        .as_deref()
        .or(cfg.server.as_deref())
        .ok_or_else(|| anyhow::anyhow!("server is required (--server or `server` in config)"))?;
    let (host, scheme_security) = normalize_server(raw_server);
    if host.is_empty() {
        return Err(anyhow::anyhow!("server address is empty: {raw_server:?}"));
    }

    let transport = overrides
        .transport
        .or(cfg.transport)
        .or(scheme_security)
        .unwrap_or_default();

    let fps = overrides.fps.or(cfg.fps).unwrap_or(DEFAULT_FPS);
    let fps = NonZeroU32::new(fps).ok_or_else(|| anyhow::anyhow!("fps must be positive"))?;

    let grace_ms = cfg.stop_grace_ms.unwrap_or(DEFAULT_STOP_GRACE_MS);
    if grace_ms == 0 {
        return Err(anyhow::anyhow!("stop_grace_ms must be positive"));
    }
    let timeout_ms = cfg.http_timeout_ms.unwrap_or(DEFAULT_HTTP_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(anyhow::anyhow!("http_timeout_ms must be positive"));
    }

    let resolution = match overrides.resolution {
        Some(resolution) => resolution,
        None => match cfg.resolution.as_deref() {
            Some(raw) => raw
                .parse::<Resolution>()
                .map_err(|e| anyhow::anyhow!(e))
                .context("parse resolution")?,
            None => Resolution::default(),
        },
    };

    Ok(ResolvedConfig {
        host,
        handshake: overrides.handshake.or(cfg.handshake).unwrap_or_default(),
        transport,
        fps,
        stop_grace: Duration::from_millis(grace_ms),
        resolution,
        camera_index: overrides.camera_index.or(cfg.camera_index).unwrap_or(0),
        http_timeout: Duration::from_millis(timeout_ms),
    })
}

/// Strip scheme and trailing slashes; report the security the scheme implied.
pub fn normalize_server(raw: &str) -> (String, Option<TransportSecurity>) {
    let trimmed = raw.trim();
    let (rest, security) = [
        ("https://", TransportSecurity::Secured),
        ("wss://", TransportSecurity::Secured),
        ("http://", TransportSecurity::Plain),
        ("ws://", TransportSecurity::Plain),
    ]
    .iter()
    .find_map(|(prefix, security)| {
        trimmed
            .get(..prefix.len())
            .filter(|head| head.eq_ignore_ascii_case(prefix))
            .map(|_| (&trimmed[prefix.len()..], Some(*security)))
    })
    .unwrap_or((trimmed, None));
    (rest.trim_end_matches('/').to_string(), security)
}
