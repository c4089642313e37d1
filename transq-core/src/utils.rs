//! Small helpers for time parsing and display names.

use std::path::Path;

use crate::error::{CoreError, CoreResult};

/// Renders an elapsed time as `HH:MM:SS` for the CLI's summary line.
///
/// Hours keep counting past 24. Negative or non-finite input renders as
/// `??:??:??`.
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    if !(seconds.is_finite() && seconds >= 0.0) {
        return "??:??:??".to_string();
    }
    let whole = seconds.trunc() as u64;
    let (hours, rest) = (whole / 3600, whole % 3600);
    format!("{:02}:{:02}:{:02}", hours, rest / 60, rest % 60)
}

/// Parses FFmpeg time string (HH:MM:SS.MS) to seconds. Returns None if invalid.
#[must_use]
pub fn parse_ffmpeg_time(time: &str) -> Option<f64> {
    let mut parts = time.split(':');
    let (Some(h), Some(m), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let hours = h.parse::<f64>().ok()?;
    let minutes = m.parse::<f64>().ok()?;
    let seconds = s.parse::<f64>().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Extracts the file name of `path` for log lines and notifications.
pub fn get_filename_safe(path: &Path) -> CoreResult<String> {
    Ok(path
        .file_name()
        .ok_or_else(|| CoreError::PathError(format!("Failed to get filename for {}", path.display())))?
        .to_string_lossy()
        .to_string())
}
