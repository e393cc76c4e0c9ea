//! FFprobe-based media inspection.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and maps the JSON output into [`MediaInfo`].
//!
//! Probing is lenient: when ffprobe is missing, exits non-zero or prints
//! something unparsable, [`FfprobeProber::inspect`] returns
//! [`MediaInfo::estimate`] for the file instead of an error. Only a missing
//! file, a timeout, or a file without a video stream are reported as errors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rf_core::config::ProbeConfig;
use rf_core::{format_bytes, Error, MediaInfo, Result};
use serde::Deserialize;

use crate::command::ToolCommand;
use crate::tools::{ToolRegistry, FFPROBE};

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    /// Path to the ffprobe binary; `None` when it could not be found.
    ffprobe_path: Option<PathBuf>,
    timeout: Duration,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffprobe_path: Some(ffprobe_path),
            timeout,
        }
    }

    /// Create a prober from a discovered registry. A missing ffprobe is not
    /// an error here; every probe then returns the estimate.
    pub fn from_registry(registry: &ToolRegistry, config: &ProbeConfig) -> Self {
        let ffprobe_path = match registry.require(FFPROBE) {
            Ok(tool) => Some(tool.path.clone()),
            Err(e) => {
                tracing::warn!("{e}; probes will return estimates");
                None
            }
        };
        Self {
            ffprobe_path,
            timeout: config.timeout(),
        }
    }

    /// Inspect `path` and return its metadata.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `path` does not exist.
    /// - [`Error::Timeout`] if ffprobe runs longer than the configured bound.
    /// - [`Error::NoVideoStream`] if ffprobe succeeded but found no video track.
    pub async fn inspect(&self, path: &Path) -> Result<MediaInfo> {
        let byte_count = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found("file", path.display()));
            }
            Err(e) => return Err(e.into()),
        };

        let result = match &self.ffprobe_path {
            Some(ffprobe) => self.run(ffprobe, path).await,
            None => Err(Error::tool(FFPROBE, "not available")),
        };

        match result.and_then(|output| interpret(path, output, byte_count)) {
            Ok(info) => Ok(info),
            Err(e @ (Error::Timeout { .. } | Error::NoVideoStream(_))) => Err(e),
            Err(e) => {
                tracing::warn!(
                    "Probe of {} failed ({e}); returning estimate",
                    path.display()
                );
                Ok(MediaInfo::estimate(byte_count))
            }
        }
    }

    async fn run(&self, ffprobe: &Path, path: &Path) -> Result<FfprobeOutput> {
        let mut cmd = ToolCommand::new(ffprobe.to_path_buf());
        cmd.args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());
        cmd.timeout(self.timeout);

        let output = cmd.execute().await?;
        serde_json::from_str(&output.stdout)
            .map_err(|e| Error::Probe(format!("ffprobe JSON parse error: {e}")))
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    bit_rate: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn interpret(path: &Path, output: FfprobeOutput, byte_count: u64) -> Result<MediaInfo> {
    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::NoVideoStream(path.display().to_string()))?;

    let duration = output
        .format
        .duration
        .as_deref()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let size = output
        .format
        .size
        .as_deref()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(byte_count);

    let bitrate = [output.format.bit_rate.as_deref(), video.bit_rate.as_deref()]
        .into_iter()
        .flatten()
        .find_map(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .map(|f| (f * 100.0).round() / 100.0)
        .unwrap_or(0.0);

    Ok(MediaInfo {
        duration,
        size: format_bytes(size),
        bitrate: bitrate.to_string(),
        codec: video.codec_name.clone().unwrap_or_else(|| "unknown".into()),
        resolution: format!("{}x{}", video.width.unwrap_or(0), video.height.unwrap_or(0)),
        fps,
        estimated: false,
    })
}

/// Parse an ffprobe frame rate such as `30000/1001` or `25`.
pub fn parse_frame_rate(rate_str: &str) -> Option<f64> {
    let parts: Vec<&str> = rate_str.trim().split('/').collect();
    if parts.len() == 2 {
        let num: f64 = parts[0].parse().ok()?;
        let den: f64 = parts[1].parse().ok()?;
        if den != 0.0 {
            return Some(num / den);
        }
        return None;
    }
    rate_str.trim().parse().ok().filter(|f: &f64| f.is_finite())
}
