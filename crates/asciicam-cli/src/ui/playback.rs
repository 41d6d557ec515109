use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use asciicam_client::{DirectoryClient, FrameBuffer, PlaybackState, SessionHub};
use asciicam_types::{PlaybackTarget, Recording};
use crossbeam_channel::{Receiver, Sender, unbounded};
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind};
use ratatui::widgets::ListState;

use super::{LogPanel, Term, init_terminal, is_quit, render, restore_terminal};
use crate::table::sort_newest_first;

/// Directory work done off the UI thread.
enum DirRequest {
    Refresh,
    Delete(String),
}

enum DirReply {
    Recordings(Result<Vec<Recording>, String>),
    Deleted {
        filename: String,
        result: Result<(), String>,
    },
}

/// Launch the playback browser. `autoplay` starts that recording immediately.
pub(crate) fn run_playback_tui(
    hub: SessionHub,
    directory: DirectoryClient,
    autoplay: Option<String>,
    log_rx: Receiver<String>,
) -> Result<()> {
    let (req_tx, req_rx) = unbounded::<DirRequest>();
    let (reply_tx, reply_rx) = unbounded::<DirReply>();
    std::thread::spawn({
        let directory = directory.clone();
        move || {
            while let Ok(req) = req_rx.recv() {
                let reply = match req {
                    DirRequest::Refresh => {
                        DirReply::Recordings(directory.recordings().map_err(|e| format!("{e:#}")))
                    }
                    DirRequest::Delete(filename) => {
                        let result = directory
                            .delete_recording(&filename)
                            .map_err(|e| format!("{e:#}"));
                        DirReply::Deleted { filename, result }
                    }
                };
                if reply_tx.send(reply).is_err() {
                    break;
                }
            }
        }
    });

    let mut app = PlaybackApp::new(
        hub,
        directory.base().to_string(),
        req_tx,
        reply_rx,
        LogPanel::new(log_rx),
    );
    app.refresh();
    if let Some(filename) = autoplay {
        app.play(&filename);
    }

    let mut term = init_terminal()?;
    let result = ui_loop(&mut term, &mut app);
    restore_terminal(&mut term);
    result
}

pub(crate) struct PlaybackApp {
    pub(crate) server: String,
    pub(crate) hub: SessionHub,
    pub(crate) view: FrameBuffer,
    pub(crate) recordings: Vec<Recording>,
    pub(crate) list_state: ListState,
    pub(crate) logs: LogPanel,
    req_tx: Sender<DirRequest>,
    reply_rx: Receiver<DirReply>,
    quitting: bool,
}

impl PlaybackApp {
    fn new(
        hub: SessionHub,
        server: String,
        req_tx: Sender<DirRequest>,
        reply_rx: Receiver<DirReply>,
        logs: LogPanel,
    ) -> Self {
        Self {
            server,
            hub,
            view: FrameBuffer::new(),
            recordings: Vec::new(),
            list_state: ListState::default(),
            logs,
            req_tx,
            reply_rx,
            quitting: false,
        }
    }

    fn selected_recording(&self) -> Option<&Recording> {
        self.list_state
            .selected()
            .and_then(|idx| self.recordings.get(idx))
    }

    fn is_playing(&self, filename: &str) -> bool {
        self.hub
            .playback()
            .playing()
            .is_some_and(|t| t.filename() == filename)
    }

    fn refresh(&mut self) {
        if self.req_tx.send(DirRequest::Refresh).is_ok() {
            self.view.status = "Loading recordings...".into();
        }
    }

    fn drain_replies(&mut self) {
        while let Ok(reply) = self.reply_rx.try_recv() {
            match reply {
                DirReply::Recordings(Ok(mut list)) => {
                    sort_newest_first(&mut list);
                    self.set_recordings(list);
                }
                DirReply::Recordings(Err(e)) => {
                    tracing::warn!("recordings unavailable: {e}");
                    self.view.status = format!("Recordings unavailable: {e}");
                }
                DirReply::Deleted { filename, result } => match result {
                    Ok(()) => {
                        self.view.status = format!("Deleted {filename}");
                        let _ = self.req_tx.send(DirRequest::Refresh);
                    }
                    Err(e) => self.view.status = format!("Delete failed: {e}"),
                },
            }
        }
    }

    /// Replace the list, keeping the selection on the same file when possible.
    fn set_recordings(&mut self, list: Vec<Recording>) {
        let previous = self.selected_recording().map(|r| r.filename.clone());
        self.recordings = list;
        let idx = previous
            .and_then(|name| self.recordings.iter().position(|r| r.filename == name))
            .or(if self.recordings.is_empty() { None } else { Some(0) });
        self.list_state.select(idx);
        if self.view.status == "Loading recordings..." {
            self.view.status = format!("{} recordings", self.recordings.len());
        }
    }

    fn select_next(&mut self) {
        if self.recordings.is_empty() {
            return;
        }
        let next = match self.list_state.selected() {
            Some(i) => (i + 1).min(self.recordings.len() - 1),
            None => 0,
        };
        self.list_state.select(Some(next));
    }

    fn select_prev(&mut self) {
        if self.recordings.is_empty() {
            return;
        }
        let prev = self.list_state.selected().map(|i| i.saturating_sub(1)).unwrap_or(0);
        self.list_state.select(Some(prev));
    }

    /// Stop whatever is playing and start `filename`.
    fn play(&mut self, filename: &str) {
        let Some(target) = PlaybackTarget::new(filename) else {
            self.view.status = "Empty filename".into();
            return;
        };
        if !self.hub.playback().is_idle() {
            let _ = self.hub.playback_mut().stop(&mut self.view);
        }
        self.hub.playback_mut().select(target);
        if let Err(e) = self.hub.playback_mut().start(&mut self.view) {
            self.view.status = format!("Error: {e}");
        }
    }

    fn play_selected(&mut self) {
        let Some(filename) = self.selected_recording().map(|r| r.filename.clone()) else {
            return;
        };
        self.play(&filename);
    }

    fn toggle_pause(&mut self) {
        if let Err(e) = self.hub.playback_mut().toggle_pause(&mut self.view) {
            self.view.status = format!("Error: {e}");
        }
    }

    fn step_speed(&mut self, faster: bool) {
        let current = self.hub.playback().speed();
        let next = if faster { current.faster() } else { current.slower() };
        if let Err(e) = self.hub.playback_mut().set_speed(next, &mut self.view) {
            self.view.status = format!("Error: {e}");
        }
    }

    fn stop(&mut self) {
        if let Err(e) = self.hub.playback_mut().stop(&mut self.view) {
            self.view.status = format!("Error: {e}");
        }
    }

    fn delete_selected(&mut self) {
        let Some(filename) = self.selected_recording().map(|r| r.filename.clone()) else {
            return;
        };
        if self.is_playing(&filename) {
            self.view.status = "Stop playback before deleting".into();
            return;
        }
        if self.req_tx.send(DirRequest::Delete(filename.clone())).is_ok() {
            self.view.status = format!("Deleting {filename}...");
        }
    }

    fn request_quit(&mut self) {
        if !self.hub.playback().is_idle() {
            let _ = self.hub.playback_mut().stop(&mut self.view);
        }
        self.quitting = true;
    }

    pub(crate) fn state(&self) -> PlaybackState {
        self.hub.playback().state()
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if self.logs.open {
            if key.code == KeyCode::Esc {
                self.logs.toggle();
            } else if is_quit(&key) {
                self.request_quit();
            } else {
                self.logs.handle_key(key.code);
            }
            return;
        }
        if is_quit(&key) {
            self.request_quit();
            return;
        }
        match key.code {
            KeyCode::Up => self.select_prev(),
            KeyCode::Down => self.select_next(),
            KeyCode::Enter => self.play_selected(),
            KeyCode::Char(' ') => self.toggle_pause(),
            KeyCode::Char('+') | KeyCode::Char('=') => self.step_speed(true),
            KeyCode::Char('-') => self.step_speed(false),
            KeyCode::Char('x') => self.stop(),
            KeyCode::Char('d') => self.delete_selected(),
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('l') => self.logs.toggle(),
            _ => {}
        }
    }
}

fn ui_loop(terminal: &mut Term, app: &mut PlaybackApp) -> Result<()> {
    let tick = Duration::from_millis(33);
    let mut last_tick = Instant::now();

    loop {
        app.drain_replies();
        app.hub.pump(Instant::now(), &mut app.view);
        app.logs.drain();
        app.logs.note_status(&app.view.status);
        if app.quitting {
            return Ok(());
        }

        terminal.draw(|f| render::draw_playback(f, app))?;

        let timeout = tick.saturating_sub(last_tick.elapsed());
        if event::poll(timeout).context("poll terminal events")? {
            if let CEvent::Key(k) = event::read().context("read terminal event")? {
                if k.kind == KeyEventKind::Press {
                    app.handle_key(k);
                }
            }
        }

        if last_tick.elapsed() >= tick {
            last_tick = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use asciicam_client::config::{ClientConfig, Overrides, resolve};
    use asciicam_client::connection::{ConnectionEvent, ConnectionUpdate, MemoryDialer};
    use asciicam_types::ClientMessage;
    use crossterm::event::KeyModifiers;

    use super::*;

    struct Fixture {
        app: PlaybackApp,
        dialer: MemoryDialer,
        requests: Receiver<DirRequest>,
        replies: Sender<DirReply>,
    }

    fn fixture() -> Fixture {
        let cfg = ClientConfig {
            server: Some("camhost:8080".to_string()),
            ..ClientConfig::default()
        };
        let resolved = resolve(&cfg, &Overrides::default()).unwrap();
        let dialer = MemoryDialer::new();
        let hub = SessionHub::new(Arc::new(dialer.clone()), &resolved);
        let (req_tx, requests) = unbounded();
        let (replies, reply_rx) = unbounded();
        let (_log_tx, log_rx) = unbounded();
        Fixture {
            app: PlaybackApp::new(hub, resolved.http_base(), req_tx, reply_rx, LogPanel::new(log_rx)),
            dialer,
            requests,
            replies,
        }
    }

    fn recording(filename: &str, last_modified: i64) -> Recording {
        Recording {
            filename: filename.to_string(),
            size: 100,
            duration: Some(5),
            last_modified,
            timestamp: None,
        }
    }

    impl Fixture {
        fn press(&mut self, code: KeyCode) {
            self.app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
        }

        fn load(&mut self, list: Vec<Recording>) {
            self.replies.send(DirReply::Recordings(Ok(list))).unwrap();
            self.app.drain_replies();
        }

        fn open(&mut self) {
            let id = self.dialer.last_id().unwrap();
            self.app.hub.dispatch(
                &ConnectionUpdate { id, event: ConnectionEvent::Opened },
                &mut self.app.view,
            );
        }
    }

    #[test]
    fn list_is_sorted_newest_first_and_enter_plays_selection() {
        let mut fx = fixture();
        fx.load(vec![recording("old.txt", 1), recording("new.txt", 2)]);
        assert_eq!(fx.app.recordings[0].filename, "new.txt");

        fx.press(KeyCode::Down);
        fx.press(KeyCode::Enter);
        fx.open();
        assert_eq!(fx.app.state(), PlaybackState::Playing);
        assert_eq!(
            fx.dialer.sent_messages(fx.dialer.last_id().unwrap()),
            vec![ClientMessage::PlaybackStart { filename: "old.txt".into() }]
        );
        assert_eq!(
            fx.dialer.dialed_urls(),
            vec!["ws://camhost:8080/playback".to_string()]
        );
    }

    #[test]
    fn playing_another_file_stops_the_current_one() {
        let mut fx = fixture();
        fx.load(vec![recording("a.txt", 2), recording("b.txt", 1)]);
        fx.press(KeyCode::Enter);
        fx.open();
        let first = fx.dialer.last_id().unwrap();

        fx.press(KeyCode::Down);
        fx.press(KeyCode::Enter);
        assert_eq!(fx.dialer.close_count(first), 1);
        assert_eq!(
            fx.dialer.sent_messages(first).last(),
            Some(&ClientMessage::PlaybackStop)
        );
        assert_eq!(fx.dialer.dial_count(), 2);
        assert_eq!(fx.app.state(), PlaybackState::Connecting);
    }

    #[test]
    fn space_and_speed_keys_drive_session() {
        let mut fx = fixture();
        fx.load(vec![recording("a.txt", 1)]);
        fx.press(KeyCode::Enter);
        fx.open();
        fx.press(KeyCode::Char(' '));
        fx.press(KeyCode::Char('+'));
        assert_eq!(fx.app.state(), PlaybackState::Paused);
        assert_eq!(fx.app.hub.playback().speed().get(), 1.5);
        fx.press(KeyCode::Char('-'));
        fx.press(KeyCode::Char('-'));
        assert_eq!(fx.app.hub.playback().speed().get(), 0.5);
        fx.press(KeyCode::Char('x'));
        assert_eq!(fx.app.state(), PlaybackState::Idle);
    }

    #[test]
    fn speed_before_connect_reports_error() {
        let mut fx = fixture();
        fx.load(vec![recording("a.txt", 1)]);
        fx.press(KeyCode::Enter);
        fx.press(KeyCode::Char('+'));
        assert_eq!(fx.app.view.status, "Error: connection is not open");
    }

    #[test]
    fn delete_refuses_playing_file_and_refreshes_after_success() {
        let mut fx = fixture();
        fx.load(vec![recording("a.txt", 2), recording("b.txt", 1)]);
        fx.press(KeyCode::Enter);
        fx.press(KeyCode::Char('d'));
        assert_eq!(fx.app.view.status, "Stop playback before deleting");
        assert!(fx.requests.try_recv().is_err());

        fx.press(KeyCode::Down);
        fx.press(KeyCode::Char('d'));
        assert!(matches!(fx.requests.try_recv(), Ok(DirRequest::Delete(name)) if name == "b.txt"));

        fx.replies
            .send(DirReply::Deleted { filename: "b.txt".into(), result: Ok(()) })
            .unwrap();
        fx.app.drain_replies();
        assert_eq!(fx.app.view.status, "Deleted b.txt");
        assert!(matches!(fx.requests.try_recv(), Ok(DirRequest::Refresh)));
    }

    #[test]
    fn refresh_keeps_selection_on_same_file() {
        let mut fx = fixture();
        fx.load(vec![recording("a.txt", 3), recording("b.txt", 2)]);
        fx.press(KeyCode::Down);
        fx.load(vec![recording("new.txt", 9), recording("a.txt", 3), recording("b.txt", 2)]);
        assert_eq!(fx.app.selected_recording().map(|r| r.filename.as_str()), Some("b.txt"));
    }

    #[test]
    fn quit_stops_active_playback() {
        let mut fx = fixture();
        fx.load(vec![recording("a.txt", 1)]);
        fx.press(KeyCode::Enter);
        fx.open();
        fx.press(KeyCode::Char('q'));
        assert!(fx.app.quitting);
        assert!(fx.app.hub.playback().is_idle());
    }
}
