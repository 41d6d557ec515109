//! `asciicam`: terminal client for an ASCII camera service.
//!
//! - `cameras` / `recordings` / `delete`: one-shot directory calls
//! - `stream`: live view (TUI, or `--plain` frames on stdout)
//! - `play`: browse and replay recordings

mod cli;
mod logging;
mod plain;
mod table;
mod ui;

use std::path::PathBuf;

use anyhow::Result;
use asciicam_client::config::{self, ClientConfig, Overrides, ResolvedConfig};
use asciicam_client::{DirectoryClient, SessionHub};
use clap::Parser;

use cli::{Args, Command};

fn main() -> Result<()> {
    let args = Args::parse();

    let tui = matches!(
        args.cmd,
        Command::Stream { plain: false, .. } | Command::Play { .. }
    );
    let log_rx = if tui {
        Some(logging::init_panel())
    } else {
        logging::init_stderr();
        None
    };

    let resolved = resolve_config(&args)?;
    tracing::info!(
        host = %resolved.host,
        handshake = ?resolved.handshake,
        transport = ?resolved.transport,
        "asciicam {}",
        env!("CARGO_PKG_VERSION")
    );
    let directory = DirectoryClient::new(resolved.http_base(), resolved.http_timeout);

    match args.cmd {
        Command::Cameras => {
            table::print_cameras(&directory.cameras()?);
            Ok(())
        }
        Command::Recordings => {
            table::print_recordings(directory.recordings()?);
            Ok(())
        }
        Command::Delete { filename } => {
            directory.delete_recording(&filename)?;
            println!("Deleted {filename}");
            Ok(())
        }
        Command::Stream {
            plain: true,
            no_clear,
            ..
        } => {
            let hub = SessionHub::websocket(&resolved)?;
            plain::run(hub, &directory, resolved.stream_config(), !no_clear)
        }
        Command::Stream { .. } => {
            let hub = SessionHub::websocket(&resolved)?;
            ui::run_stream_tui(hub, directory, log_rx.unwrap_or_else(orphan_log_rx))
        }
        Command::Play { filename } => {
            let hub = SessionHub::websocket(&resolved)?;
            ui::run_playback_tui(
                hub,
                directory,
                filename,
                log_rx.unwrap_or_else(orphan_log_rx),
            )
        }
    }
}

/// Receiver that never yields; used if the panel layer was not installed.
fn orphan_log_rx() -> crossbeam_channel::Receiver<String> {
    crossbeam_channel::never()
}

fn resolve_config(args: &Args) -> Result<ResolvedConfig> {
    let file = match args.config.as_ref() {
        Some(path) => ClientConfig::load(path)?,
        None => match default_config_path().filter(|path| path.exists()) {
            Some(path) => ClientConfig::load(&path)?,
            None => ClientConfig::default(),
        },
    };

    let (camera_index, resolution, fps) = match &args.cmd {
        Command::Stream {
            camera,
            resolution,
            fps,
            ..
        } => (*camera, *resolution, *fps),
        _ => (None, None, None),
    };
    let overrides = Overrides {
        server: args.server.clone(),
        handshake: args.handshake,
        transport: args.transport,
        fps,
        resolution,
        camera_index,
    };
    config::resolve(&file, &overrides)
}

fn default_config_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join("asciicam.toml")))
}
