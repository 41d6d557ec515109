use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
};

use asciicam_client::LiveState;

use super::LogPanel;
use super::playback::PlaybackApp;
use super::stream::StreamApp;
use crate::table::{format_duration, format_file_size};

pub(crate) fn draw_stream(f: &mut ratatui::Frame, app: &StreamApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(5), Constraint::Length(3)])
        .split(f.area());

    let state = app.hub.live().state();
    let header = Paragraph::new(vec![
        Line::from(format!("asciicam  →  {}", app.server())),
        Line::from(format!(
            "camera: {}  resolution: {}  fps: {}  state: {}",
            app.camera_label(),
            app.config.resolution,
            app.config.fps,
            state.as_str()
        )),
    ])
    .block(Block::default().borders(Borders::ALL).title("Live"));
    f.render_widget(header, chunks[0]);

    let frame_style = match state {
        LiveState::Streaming => Style::default(),
        _ => Style::default().fg(Color::DarkGray),
    };
    let frame = Paragraph::new(app.view.frame.as_str())
        .style(frame_style)
        .block(Block::default().borders(Borders::ALL).title("Frame"));
    f.render_widget(frame, chunks[1]);

    let action = if state == LiveState::Idle { "start" } else { "stop" };
    draw_status(
        f,
        chunks[2],
        &app.view.status,
        &format!("s {action}  c camera  r resolution  l logs  q quit"),
    );

    draw_logs(f, &app.logs);
}

pub(crate) fn draw_playback(f: &mut ratatui::Frame, app: &mut PlaybackApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(3)])
        .split(f.area());
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(chunks[0]);

    let playing = app
        .hub
        .playback()
        .playing()
        .map(|t| t.filename().to_string());
    let width = panes[0].width.saturating_sub(22) as usize;
    let items: Vec<ListItem> = app
        .recordings
        .iter()
        .map(|r| {
            let marker = if playing.as_deref() == Some(r.filename.as_str()) {
                "▶ "
            } else {
                "  "
            };
            ListItem::new(format!(
                "{marker}{:<width$} {:>9} {:>5}",
                truncate_label(&r.filename, width),
                format_file_size(r.size),
                format_duration(r.duration),
            ))
        })
        .collect();
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Recordings @ {}", app.server)),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    f.render_stateful_widget(list, panes[0], &mut app.list_state);

    let state = app.state();
    let title = match &playing {
        Some(name) => format!("{name} [{} {}]", state.as_str(), app.hub.playback().speed()),
        None => "Playback".to_string(),
    };
    let frame = Paragraph::new(app.view.frame.as_str())
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(frame, panes[1]);

    draw_status(
        f,
        chunks[1],
        &app.view.status,
        "Enter play  Space pause  +/- speed  x stop  d delete  r refresh  l logs  q quit",
    );

    draw_logs(f, &app.logs);
}

fn draw_status(f: &mut ratatui::Frame, area: Rect, status: &str, keys: &str) {
    let status = if status.is_empty() { "-" } else { status };
    let line = Paragraph::new(format!("{status}  |  {keys}"))
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(line, area);
}

fn draw_logs(f: &mut ratatui::Frame, logs: &LogPanel) {
    if !logs.open {
        return;
    }
    let area = centered_rect(90, 80, f.area());
    f.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Logs (Esc to close, ↑/↓ scroll)");
    let height = block.inner(area).height as usize;
    let end = logs.lines.len().saturating_sub(logs.scroll);
    let start = end.saturating_sub(height);
    let mut items: Vec<ListItem> = logs
        .lines
        .iter()
        .skip(start)
        .take(end - start)
        .map(|line| ListItem::new(line.as_str()))
        .collect();
    if items.is_empty() {
        items.push(ListItem::new("<no logs>"));
    }
    f.render_widget(List::new(items).block(block), area);
}

fn truncate_label(label: &str, max: usize) -> String {
    if max == 0 || label.chars().count() <= max {
        return label.to_string();
    }
    if max <= 3 {
        return label.chars().take(max).collect();
    }
    let kept: String = label.chars().take(max - 3).collect();
    format!("{kept}...")
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
