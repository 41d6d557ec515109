//! Text formatting for listings.

use asciicam_types::{CameraInfo, Recording};
use time::OffsetDateTime;

pub(crate) fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    }
}

/// `m:ss`, or `N/A` when the service could not measure the recording.
pub(crate) fn format_duration(secs: Option<u64>) -> String {
    match secs {
        Some(secs) => format!("{}:{:02}", secs / 60, secs % 60),
        None => "N/A".to_string(),
    }
}

/// Capture time as given by the service, else the modification time in UTC.
pub(crate) fn format_recorded_at(recording: &Recording) -> String {
    if let Some(stamp) = recording.timestamp.as_deref().filter(|s| !s.is_empty()) {
        return stamp.to_string();
    }
    let nanos = i128::from(recording.last_modified) * 1_000_000;
    match OffsetDateTime::from_unix_timestamp_nanos(nanos) {
        Ok(dt) => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            dt.year(),
            u8::from(dt.month()),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second()
        ),
        Err(_) => "-".to_string(),
    }
}

pub(crate) fn sort_newest_first(recordings: &mut [Recording]) {
    recordings.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.filename.cmp(&b.filename))
    });
}

pub(crate) fn recording_row(recording: &Recording, name_width: usize) -> String {
    format!(
        "{:<name_width$}  {:>10}  {:>6}  {}",
        recording.filename,
        format_file_size(recording.size),
        format_duration(recording.duration),
        format_recorded_at(recording),
    )
}

pub(crate) fn print_recordings(mut recordings: Vec<Recording>) {
    if recordings.is_empty() {
        println!("No recordings.");
        return;
    }
    sort_newest_first(&mut recordings);
    let name_width = recordings
        .iter()
        .map(|r| r.filename.chars().count())
        .max()
        .unwrap_or(0)
        .max("FILENAME".len());
    println!(
        "{:<name_width$}  {:>10}  {:>6}  {}",
        "FILENAME", "SIZE", "LENGTH", "RECORDED"
    );
    for recording in &recordings {
        println!("{}", recording_row(recording, name_width));
    }
}

pub(crate) fn print_cameras(cameras: &[CameraInfo]) {
    if cameras.is_empty() {
        println!("No cameras reported.");
        return;
    }
    for camera in cameras {
        println!("{:>3}  {}", camera.index, camera.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(filename: &str, last_modified: i64) -> Recording {
        Recording {
            filename: filename.to_string(),
            size: 0,
            duration: None,
            last_modified,
            timestamp: None,
        }
    }

    #[test]
    fn sizes_use_binary_units_with_two_decimals() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1023), "1023 B");
        assert_eq!(format_file_size(1024), "1.00 KB");
        assert_eq!(format_file_size(1536), "1.50 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024 + 512 * 1024), "5.50 MB");
    }

    #[test]
    fn durations_render_minutes_and_padded_seconds() {
        assert_eq!(format_duration(Some(0)), "0:00");
        assert_eq!(format_duration(Some(75)), "1:15");
        assert_eq!(format_duration(Some(605)), "10:05");
        assert_eq!(format_duration(None), "N/A");
    }

    #[test]
    fn newest_recording_comes_first() {
        let mut list = vec![recording("old.txt", 10), recording("new.txt", 30), recording("mid.txt", 20)];
        sort_newest_first(&mut list);
        let names: Vec<_> = list.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["new.txt", "mid.txt", "old.txt"]);
    }

    #[test]
    fn recorded_at_prefers_service_timestamp() {
        let mut rec = recording("a.txt", 0);
        assert_eq!(format_recorded_at(&rec), "1970-01-01 00:00:00");
        rec.last_modified = 1_700_000_000_000;
        assert_eq!(format_recorded_at(&rec), "2023-11-14 22:13:20");
        rec.timestamp = Some("2024-01-01 10:00".to_string());
        assert_eq!(format_recorded_at(&rec), "2024-01-01 10:00");
    }

    #[test]
    fn row_aligns_columns() {
        let mut rec = recording("clip.txt", 0);
        rec.size = 2048;
        rec.duration = Some(61);
        let row = recording_row(&rec, 10);
        assert!(row.starts_with("clip.txt    "));
        assert!(row.contains("2.00 KB"));
        assert!(row.contains("1:01"));
    }
}
