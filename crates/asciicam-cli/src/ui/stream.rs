use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use asciicam_client::{DirectoryClient, FrameBuffer, SessionHub};
use asciicam_types::{CameraInfo, StreamConfig};
use crossbeam_channel::{Receiver, unbounded};
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind};

use super::{LogPanel, Term, init_terminal, is_quit, render, restore_terminal};

type CameraReply = Result<Vec<CameraInfo>, String>;

/// Launch the live view; the camera list loads in the background.
pub(crate) fn run_stream_tui(
    hub: SessionHub,
    directory: DirectoryClient,
    log_rx: Receiver<String>,
) -> Result<()> {
    let (cameras_tx, cameras_rx) = unbounded::<CameraReply>();
    std::thread::spawn({
        let directory = directory.clone();
        move || {
            let _ = cameras_tx.send(directory.cameras().map_err(|e| format!("{e:#}")));
        }
    });

    let mut app = StreamApp::new(hub, directory, cameras_rx, LogPanel::new(log_rx));
    let mut term = init_terminal()?;
    let result = ui_loop(&mut term, &mut app);
    restore_terminal(&mut term);
    result
}

pub(crate) struct StreamApp {
    pub(crate) hub: SessionHub,
    directory: DirectoryClient,
    pub(crate) view: FrameBuffer,
    /// Settings used by the next start.
    pub(crate) config: StreamConfig,
    pub(crate) cameras: Vec<CameraInfo>,
    cameras_rx: Receiver<CameraReply>,
    pub(crate) logs: LogPanel,
    quitting: bool,
}

impl StreamApp {
    fn new(
        hub: SessionHub,
        directory: DirectoryClient,
        cameras_rx: Receiver<CameraReply>,
        logs: LogPanel,
    ) -> Self {
        let config = hub.defaults();
        Self {
            hub,
            directory,
            view: FrameBuffer::new(),
            config,
            cameras: Vec::new(),
            cameras_rx,
            logs,
            quitting: false,
        }
    }

    pub(crate) fn server(&self) -> &str {
        self.directory.base()
    }

    pub(crate) fn camera_label(&self) -> String {
        let index = self.config.camera_index;
        match self.cameras.iter().find(|c| c.index == index) {
            Some(camera) => format!("{index} ({})", camera.name),
            None => index.to_string(),
        }
    }

    fn drain_cameras(&mut self) {
        while let Ok(reply) = self.cameras_rx.try_recv() {
            match reply {
                Ok(cameras) => {
                    tracing::info!(count = cameras.len(), "camera list loaded");
                    self.cameras = cameras;
                }
                Err(e) => {
                    tracing::warn!("camera list unavailable: {e}");
                    self.view.status = format!("Camera list unavailable: {e}");
                }
            }
        }
    }

    fn toggle_stream(&mut self) {
        let result = if self.hub.live().is_idle() {
            self.hub
                .start_live(self.config, &self.directory, &mut self.view)
        } else {
            self.hub.live_mut().stop(&mut self.view)
        };
        if let Err(e) = result {
            self.view.status = format!("Error: {e}");
        }
    }

    fn next_camera(&mut self) {
        if !self.hub.live().is_idle() {
            self.view.status = "Stop the stream to change camera".into();
            return;
        }
        if self.cameras.is_empty() {
            self.view.status = "No cameras reported".into();
            return;
        }
        let pos = self
            .cameras
            .iter()
            .position(|c| c.index == self.config.camera_index)
            .map(|p| (p + 1) % self.cameras.len())
            .unwrap_or(0);
        self.config.camera_index = self.cameras[pos].index;
        self.view.status = format!("Camera {}", self.camera_label());
    }

    fn next_resolution(&mut self) {
        if !self.hub.live().is_idle() {
            self.view.status = "Stop the stream to change resolution".into();
            return;
        }
        self.config.resolution = self.config.resolution.next();
        self.view.status = format!("Resolution {}", self.config.resolution);
    }

    fn request_quit(&mut self) {
        self.quitting = true;
        if !self.hub.live().is_idle() {
            if let Err(e) = self.hub.live_mut().stop(&mut self.view) {
                tracing::debug!("stop on quit: {e}");
            }
        }
    }

    fn should_exit(&self) -> bool {
        self.quitting && self.hub.live().is_idle()
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
            KeyCode::Char('s') | KeyCode::Enter => self.toggle_stream(),
            KeyCode::Char('c') => self.next_camera(),
            KeyCode::Char('r') => self.next_resolution(),
            KeyCode::Char('l') => self.logs.toggle(),
            _ => {}
        }
    }
}

fn ui_loop(terminal: &mut Term, app: &mut StreamApp) -> Result<()> {
    let tick = Duration::from_millis(33);
    let mut last_tick = Instant::now();

    loop {
        app.drain_cameras();
        app.hub.pump(Instant::now(), &mut app.view);
        app.logs.drain();
        app.logs.note_status(&app.view.status);
        if app.should_exit() {
            return Ok(());
        }

        terminal.draw(|f| render::draw_stream(f, app))?;

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
