//! Non-interactive live view: frames go to stdout, notices to stderr.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use asciicam_client::{DirectoryClient, DisplaySink, Notice, SessionHub};
use asciicam_types::StreamConfig;
use crossbeam_channel::bounded;
use crossterm::{cursor::MoveTo, execute, terminal::Clear, terminal::ClearType};

struct FrameWriter<W: Write> {
    out: W,
    clear: bool,
}

impl<W: Write> DisplaySink for FrameWriter<W> {
    fn frame(&mut self, text: &str) {
        if self.clear {
            let _ = execute!(self.out, Clear(ClearType::All), MoveTo(0, 0));
        }
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
    }

    fn notice(&mut self, notice: Notice) {
        eprintln!("[{notice}]");
    }
}

/// Stream until the service stops or the user presses Ctrl-C.
///
/// The first Ctrl-C sends `stop` and waits out the grace period; a second one
/// exits immediately. With `clear` each frame replaces the previous one on screen.
pub(crate) fn run(
    mut hub: SessionHub,
    directory: &DirectoryClient,
    config: StreamConfig,
    clear: bool,
) -> Result<()> {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let mut presses = 0u32;
    ctrlc::set_handler(move || {
        presses += 1;
        if presses > 1 {
            std::process::exit(130);
        }
        let _ = stop_tx.try_send(());
    })
    .context("install Ctrl-C handler")?;

    let mut sink = FrameWriter {
        out: io::stdout(),
        clear,
    };
    hub.start_live(config, directory, &mut sink)?;

    while !hub.live().is_idle() {
        if stop_rx.try_recv().is_ok() {
            if let Err(e) = hub.live_mut().stop(&mut sink) {
                tracing::debug!("stop ignored: {e}");
            }
        }
        hub.wait(Duration::from_millis(50), &mut sink);
    }

    if let Some(err) = hub.live().last_error() {
        return Err(anyhow::anyhow!("stream ended with error: {err}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_written_verbatim_without_clear() {
        let mut sink = FrameWriter {
            out: Vec::new(),
            clear: false,
        };
        sink.frame("@@..\n..@@");
        sink.frame("next");
        assert_eq!(String::from_utf8(sink.out).unwrap(), "@@..\n..@@\nnext\n");
    }

    #[test]
    fn clear_moves_home_before_each_frame() {
        let mut sink = FrameWriter {
            out: Vec::new(),
            clear: true,
        };
        sink.frame("a");
        sink.frame("b");
        let written = String::from_utf8(sink.out).unwrap();
        assert_eq!(written.matches("\x1b[2J").count(), 2);
        assert!(written.ends_with("b\n"));
        assert!(!written.starts_with('a'));
    }
}
