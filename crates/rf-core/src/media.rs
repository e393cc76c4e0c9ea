//! Probe results and size formatting.

use serde::{Deserialize, Serialize};

/// Duration reported by the degraded probe estimate.
pub const ESTIMATED_DURATION_SECS: f64 = 30.5;
/// Resolution reported by the degraded probe estimate.
pub const ESTIMATED_RESOLUTION: &str = "1920x1080";
/// Frame rate reported by the degraded probe estimate.
pub const ESTIMATED_FPS: f64 = 30.0;
/// Codec reported by the degraded probe estimate.
pub const ESTIMATED_CODEC: &str = "h264";

/// Metadata describing a single media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds.
    pub duration: f64,
    /// Human-readable file size, e.g. `"1.5 KB"`.
    pub size: String,
    /// Overall bitrate in bits per second, as decimal text.
    pub bitrate: String,
    /// Video codec identifier as reported by the engine.
    pub codec: String,
    /// Resolution formatted as `WxH`.
    pub resolution: String,
    /// Frames per second.
    pub fps: f64,
    /// Set when the values are a placeholder estimate rather than probe output.
    #[serde(default)]
    pub estimated: bool,
}

impl MediaInfo {
    /// Build the placeholder value used when probing fails.
    ///
    /// Only `size` and `bitrate` are derived from the file itself; every other
    /// field is a fixed value.
    pub fn estimate(byte_count: u64) -> Self {
        let bitrate = (byte_count as f64 * 8.0 / ESTIMATED_DURATION_SECS).round() as u64;
        Self {
            duration: ESTIMATED_DURATION_SECS,
            size: format_bytes(byte_count),
            bitrate: bitrate.to_string(),
            codec: ESTIMATED_CODEC.to_string(),
            resolution: ESTIMATED_RESOLUTION.to_string(),
            fps: ESTIMATED_FPS,
            estimated: true,
        }
    }
}

const SIZE_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Format a byte count with binary (1024) units and at most two decimals.
///
/// `0` → `"0 Bytes"`, `1536` → `"1.5 KB"`, `1073741824` → `"1 GB"`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut exp = 0;
    let mut unit: u64 = 1;
    while exp < SIZE_UNITS.len() - 1 && bytes >= unit * 1024 {
        unit *= 1024;
        exp += 1;
    }
    let scaled = bytes as f64 / unit as f64;
    let rounded = (scaled * 100.0).round() / 100.0;
    format!("{} {}", rounded, SIZE_UNITS[exp])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_zero() {
        assert_eq!(format_bytes(0), "0 Bytes");
    }

    #[test]
    fn format_bytes_small() {
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1023), "1023 Bytes");
    }

    #[test]
    fn format_bytes_fractional_kb() {
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1024), "1 KB");
    }

    #[test]
    fn format_bytes_rounds_to_two_decimals() {
        // 1234567 / 1024^2 = 1.1773...
        assert_eq!(format_bytes(1_234_567), "1.18 MB");
    }

    #[test]
    fn format_bytes_gigabyte() {
        assert_eq!(format_bytes(1_073_741_824), "1 GB");
    }

    #[test]
    fn format_bytes_caps_at_terabytes() {
        assert_eq!(format_bytes(1024_u64.pow(5)), "1024 TB");
    }

    #[test]
    fn estimate_uses_placeholders() {
        let info = MediaInfo::estimate(2048);
        assert_eq!(info.duration, 30.5);
        assert_eq!(info.resolution, "1920x1080");
        assert_eq!(info.fps, 30.0);
        assert_eq!(info.codec, "h264");
        assert_eq!(info.size, "2 KB");
        assert_eq!(info.bitrate, "537");
        assert!(info.estimated);
    }

    #[test]
    fn media_info_serde_defaults_estimated() {
        let json = r#"{"duration":1.0,"size":"1 KB","bitrate":"8000","codec":"vp9","resolution":"640x360","fps":25.0}"#;
        let info: MediaInfo = serde_json::from_str(json).unwrap();
        assert!(!info.estimated);
        assert_eq!(info.codec, "vp9");
    }
}
