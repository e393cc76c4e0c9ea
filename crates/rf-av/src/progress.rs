//! Incremental decoder for ffmpeg's `-progress` output.
//!
//! With `-progress pipe:2 -nostats` ffmpeg writes blocks of `key=value`
//! lines to stderr, each block terminated by `progress=continue` or
//! `progress=end`. The input header lines (`Duration: 00:01:02.50, ...`)
//! arrive on the same stream and give the total length used for percent.

use rf_core::ProgressSnapshot;

/// Placeholder used when ffmpeg reports no output size.
pub const UNKNOWN_SIZE: &str = "Unknown";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Stateful parser fed one stderr line at a time.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    /// Sum of every `Duration:` header seen, in seconds.
    total_duration: f64,
    elapsed: f64,
    speed: String,
    total_size: Option<u64>,
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self {
            total_duration: 0.0,
            elapsed: 0.0,
            speed: "N/A".to_string(),
            total_size: None,
        }
    }
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total input duration discovered so far, in seconds.
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    /// Feed one line. Returns a snapshot when the line closes a progress
    /// block; anything unrecognised is ignored.
    pub fn feed_line(&mut self, line: &str) -> Option<ProgressSnapshot> {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("Duration:") {
            let mark = rest.split(',').next().unwrap_or_default();
            if let Some(secs) = parse_timemark_secs(mark) {
                self.total_duration += secs;
            }
            return None;
        }

        let (key, value) = line.split_once('=')?;
        let value = value.trim();
        match key.trim() {
            "out_time" => {
                self.elapsed = parse_timemark_secs(value).unwrap_or(0.0);
            }
            "speed" => self.speed = value.to_string(),
            "total_size" => self.total_size = value.parse().ok(),
            "progress" => {
                let finished = value == "end";
                return Some(self.snapshot(finished));
            }
            _ => {}
        }
        None
    }

    fn snapshot(&self, finished: bool) -> ProgressSnapshot {
        let percent = if finished {
            100.0
        } else if self.total_duration > 0.0 {
            let raw = self.elapsed / self.total_duration * 100.0;
            ((raw * 100.0).round() / 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        ProgressSnapshot {
            percent,
            elapsed_secs: self.elapsed as u64,
            speed: self.speed.clone(),
            estimated_size: self
                .total_size
                .map(format_target_size)
                .unwrap_or_else(|| UNKNOWN_SIZE.to_string()),
        }
    }
}

/// Whether `line` belongs to a `-progress` block rather than ffmpeg's
/// regular log output.
pub fn is_progress_line(line: &str) -> bool {
    match line.trim().split_once('=') {
        Some((key, _)) => {
            !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

/// Parse an `HH:MM:SS[.frac]` time mark into whole seconds. Fractional
/// seconds are truncated; anything malformed yields 0.
pub fn parse_timemark(mark: &str) -> u64 {
    parse_timemark_secs(mark).map(|s| s as u64).unwrap_or(0)
}

fn parse_timemark_secs(mark: &str) -> Option<f64> {
    let mut parts = mark.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let whole = hours.checked_mul(3600)?.checked_add(minutes.checked_mul(60)?)?;
    Some(whole as f64 + seconds)
}

/// Render a byte count as whole megabytes, e.g. `"12MB"`.
pub fn format_target_size(bytes: u64) -> String {
    format!("{}MB", (bytes as f64 / BYTES_PER_MB).round() as u64)
}
