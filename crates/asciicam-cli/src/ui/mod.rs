//! Ratatui front end.
//!
//! Stream keys:
//! - s / Enter: start or stop the live stream
//! - c: next camera, r: next resolution (while idle)
//! - l: toggle logs
//! - q / Esc: quit (stops the stream first)
//!
//! Playback keys:
//! - Up/Down: move selection
//! - Enter: play selected recording
//! - Space: pause/resume
//! - + / -: faster / slower
//! - x: stop
//! - d: delete selected recording
//! - r: refresh list
//! - l: toggle logs
//! - q / Esc: quit

mod playback;
mod render;
mod stream;

use std::collections::VecDeque;
use std::io;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};

pub(crate) use playback::run_playback_tui;
pub(crate) use stream::run_stream_tui;

type Term = Terminal<CrosstermBackend<io::Stdout>>;

fn init_terminal() -> Result<Term> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("create terminal")
}

fn restore_terminal(terminal: &mut Term) {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
}

fn is_quit(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}

/// Toggleable log overlay fed by the tracing panel layer.
pub(crate) struct LogPanel {
    pub(crate) open: bool,
    pub(crate) lines: VecDeque<String>,
    pub(crate) scroll: usize,
    rx: Receiver<String>,
    last_status: String,
}

impl LogPanel {
    const CAP: usize = 500;

    pub(crate) fn new(rx: Receiver<String>) -> Self {
        Self {
            open: false,
            lines: VecDeque::new(),
            scroll: 0,
            rx,
            last_status: String::new(),
        }
    }

    pub(crate) fn toggle(&mut self) {
        self.open = !self.open;
        if !self.open {
            self.scroll = 0;
        }
    }

    pub(crate) fn scroll_up(&mut self) {
        let max = self.lines.len().saturating_sub(1);
        self.scroll = (self.scroll + 1).min(max);
    }

    pub(crate) fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(1);
    }

    pub(crate) fn push(&mut self, line: String) {
        if self.lines.len() >= Self::CAP {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub(crate) fn drain(&mut self) {
        while let Ok(line) = self.rx.try_recv() {
            self.push(line);
        }
    }

    /// Mirror status line changes into the log history.
    pub(crate) fn note_status(&mut self, status: &str) {
        if self.last_status == status {
            return;
        }
        self.last_status = status.to_string();
        if !status.is_empty() {
            self.push(format!("status: {status}"));
        }
    }

    /// Keys while the panel is open; everything else is ignored.
    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('l') => self.toggle(),
            KeyCode::Up => self.scroll_up(),
            KeyCode::Down => self.scroll_down(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;

    #[test]
    fn log_panel_caps_history_and_mirrors_status_once() {
        let (tx, rx) = unbounded();
        let mut panel = LogPanel::new(rx);
        for i in 0..(LogPanel::CAP + 10) {
            tx.send(format!("line {i}")).unwrap();
        }
        panel.drain();
        assert_eq!(panel.lines.len(), LogPanel::CAP);
        assert_eq!(panel.lines.front().map(String::as_str), Some("line 10"));

        panel.note_status("Stream started");
        panel.note_status("Stream started");
        let mirrored = panel
            .lines
            .iter()
            .filter(|l| l.as_str() == "status: Stream started")
            .count();
        assert_eq!(mirrored, 1);
    }

    #[test]
    fn log_scroll_is_bounded() {
        let (_tx, rx) = unbounded();
        let mut panel = LogPanel::new(rx);
        panel.push("a".into());
        panel.push("b".into());
        panel.scroll_up();
        panel.scroll_up();
        panel.scroll_up();
        assert_eq!(panel.scroll, 1);
        panel.toggle();
        panel.toggle();
        assert_eq!(panel.scroll, 0);
    }

    #[test]
    fn ctrl_c_counts_as_quit() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(is_quit(&key));
        assert!(!is_quit(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE)));
    }
}
