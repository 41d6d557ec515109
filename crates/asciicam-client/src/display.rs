//! Where sessions put what the operator should see.

use std::fmt;

use asciicam_types::PlaybackSpeed;

/// Status change worth showing next to (or instead of) the current frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    Connecting,
    StreamStarted,
    Stopping,
    StreamStopped,
    PlaybackStarted { filename: String },
    PlaybackPaused,
    PlaybackResumed,
    PlaybackSpeed(PlaybackSpeed),
    PlaybackStopped,
    /// The service or network dropped the channel.
    ConnectionLost,
    /// A transport error was reported by the channel.
    Error(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Connecting => f.write_str("Connecting..."),
            Notice::StreamStarted => f.write_str("Stream started"),
            Notice::Stopping => f.write_str("Stopping stream..."),
            Notice::StreamStopped => f.write_str("Stream stopped"),
            Notice::PlaybackStarted { filename } => write!(f, "Playing {filename}"),
            Notice::PlaybackPaused => f.write_str("Paused"),
            Notice::PlaybackResumed => f.write_str("Playing"),
            Notice::PlaybackSpeed(speed) => write!(f, "Speed {speed}"),
            Notice::PlaybackStopped => f.write_str("Playback stopped"),
            Notice::ConnectionLost => f.write_str("Connection closed by service"),
            Notice::Error(detail) => write!(f, "Error: {detail}"),
        }
    }
}

/// Receives frames and notices from one session.
pub trait DisplaySink {
    /// Replace the current frame with `text`, verbatim.
    fn frame(&mut self, text: &str);
    fn notice(&mut self, notice: Notice);
}

/// Sink that keeps the latest frame and status line.
#[derive(Clone, Debug, Default)]
pub struct FrameBuffer {
    pub frame: String,
    pub status: String,
    /// Bumped on every frame; lets renderers skip unchanged frames.
    pub frame_seq: u64,
    pub notices: Vec<Notice>,
}

impl FrameBuffer {
    const NOTICE_CAP: usize = 64;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_notice(&self) -> Option<&Notice> {
        self.notices.last()
    }
}

impl DisplaySink for FrameBuffer {
    fn frame(&mut self, text: &str) {
        self.frame.clear();
        self.frame.push_str(text);
        self.frame_seq = self.frame_seq.wrapping_add(1);
    }

    fn notice(&mut self, notice: Notice) {
        self.status = notice.to_string();
        if self.notices.len() >= Self::NOTICE_CAP {
            self.notices.remove(0);
        }
        self.notices.push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_buffer_keeps_latest_frame_verbatim() {
        let mut buf = FrameBuffer::new();
        buf.frame("  @@\n ##\0");
        buf.frame(".. ..\n");
        assert_eq!(buf.frame, ".. ..\n");
        assert_eq!(buf.frame_seq, 2);
    }

    #[test]
    fn notice_updates_status_line() {
        let mut buf = FrameBuffer::new();
        buf.notice(Notice::StreamStarted);
        assert_eq!(buf.status, "Stream started");
        buf.notice(Notice::Error("boom".into()));
        assert_eq!(buf.status, "Error: boom");
        assert_eq!(buf.notices.len(), 2);
    }

    #[test]
    fn notice_history_is_capped() {
        let mut buf = FrameBuffer::new();
        for _ in 0..100 {
            buf.notice(Notice::PlaybackPaused);
        }
        assert_eq!(buf.notices.len(), FrameBuffer::NOTICE_CAP);
    }
}
