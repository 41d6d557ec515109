use std::path::PathBuf;

use asciicam_client::{HandshakeMode, TransportSecurity};
use asciicam_types::Resolution;
use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "asciicam", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to asciicam.toml (defaults to one next to the executable, if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Camera service address, e.g. 192.168.1.20:8080 or https://cam.example
    #[arg(long)]
    pub server: Option<String>,

    /// Live handshake: authenticated or unauthenticated
    #[arg(long)]
    pub handshake: Option<HandshakeMode>,

    /// Transport security: plain (ws/http) or secured (wss/https)
    #[arg(long)]
    pub transport: Option<TransportSecurity>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List capture devices
    Cameras,

    /// List stored recordings, newest first
    Recordings,

    /// Delete a stored recording
    Delete {
        filename: String,
    },

    /// Watch the live stream
    Stream {
        /// Camera index (see `cameras`)
        #[arg(long)]
        camera: Option<u32>,

        /// Capture resolution, e.g. 160x120
        #[arg(long)]
        resolution: Option<Resolution>,

        /// Requested frames per second
        #[arg(long)]
        fps: Option<u32>,

        /// Print frames to stdout instead of the TUI; Ctrl-C stops gracefully
        #[arg(long)]
        plain: bool,

        /// In plain mode, append frames instead of redrawing the screen
        #[arg(long, requires = "plain")]
        no_clear: bool,
    },

    /// Browse and replay recordings
    Play {
        /// Start playing this recording right away
        filename: Option<String>,
    },
}
