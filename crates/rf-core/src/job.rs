//! Job request and progress types shared by the builder, the supervisor and
//! the bridge.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ids::JobId;

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// The kind of transformation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Convert,
    Thumbnail,
    ExtractAudio,
    Compress,
    Merge,
}

impl Operation {
    /// Whether the operation consumes more than one input.
    pub fn is_multi_input(self) -> bool {
        matches!(self, Operation::Merge)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Convert => write!(f, "convert"),
            Self::Thumbnail => write!(f, "thumbnail"),
            Self::ExtractAudio => write!(f, "extract-audio"),
            Self::Compress => write!(f, "compress"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "convert" => Ok(Self::Convert),
            "thumbnail" => Ok(Self::Thumbnail),
            "extract-audio" | "extract_audio" => Ok(Self::ExtractAudio),
            "compress" => Ok(Self::Compress),
            "merge" => Ok(Self::Merge),
            other => Err(Error::invalid(format!("unknown operation '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Quality
// ---------------------------------------------------------------------------

/// Named bitrate preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::invalid(format!("unknown quality '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Output frame size override, written `WxH` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::invalid(format!("resolution '{s}' is not WxH"));
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Resolution> for String {
    fn from(r: Resolution) -> Self {
        r.to_string()
    }
}

// ---------------------------------------------------------------------------
// JobRequest
// ---------------------------------------------------------------------------

/// Operation-specific knobs. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Target container/format (`mp4`, `webm`, `gif`, `mp3`, ...). Falls back
    /// to the output file extension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Bitrate preset; `medium` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Seek position for thumbnails, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_offset: Option<f64>,
    /// Explicit audio encoder, overriding the format table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

/// A request to run one job.
///
/// On the wire a single input may be given as `"input": "a.mov"`; several as
/// `"inputs": [...]`. Options sit next to the paths:
///
/// ```json
/// {"operation": "convert", "input": "a.mov", "output": "a.mp4", "format": "mp4", "quality": "medium"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub operation: Operation,
    #[serde(alias = "input", deserialize_with = "one_or_many")]
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    #[serde(flatten)]
    pub options: JobOptions,
}

impl JobRequest {
    /// Create a request with default options.
    pub fn new(operation: Operation, inputs: Vec<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            operation,
            inputs,
            output: output.into(),
            options: JobOptions::default(),
        }
    }

    /// Set the options, builder style.
    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    /// Target format: the explicit option, else the output extension, lowercased.
    pub fn target_format(&self) -> Option<String> {
        self.options
            .format
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| f.trim_start_matches('.').to_ascii_lowercase())
            .or_else(|| extension_of(&self.output))
    }

    /// Effective quality tier.
    pub fn quality(&self) -> Quality {
        self.options.quality.unwrap_or_default()
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(PathBuf),
        Many(Vec<PathBuf>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(p) => vec![p],
        OneOrMany::Many(v) => v,
    })
}

// ---------------------------------------------------------------------------
// Progress & state
// ---------------------------------------------------------------------------

/// One decoded progress report from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Percent complete, 0–100.
    pub percent: f64,
    /// Processed media time in whole seconds.
    pub elapsed_secs: u64,
    /// Engine-reported speed, e.g. `"2.5x"`.
    pub speed: String,
    /// Output size so far as `"<n>MB"`, or `"Unknown"`.
    pub estimated_size: String,
}

/// Live phase of the supervisor's single job slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Idle,
    Running,
    /// Stop was requested; waiting for the subprocess to exit.
    Completing,
}

/// How the most recent job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    Completed,
    Stopped,
    Failed,
}

/// Snapshot of the supervisor for status queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupervisorStatus {
    pub state: JobState,
    /// The job occupying the slot, if any.
    pub job_id: Option<JobId>,
    pub last_outcome: Option<JobOutcome>,
}

impl SupervisorStatus {
    pub fn is_busy(&self) -> bool {
        self.state != JobState::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn request_accepts_single_input() {
        let json = r#"{"operation":"convert","input":"a.mov","output":"a.mp4","format":"mp4","quality":"medium"}"#;
        let req: JobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.operation, Operation::Convert);
        assert_eq!(req.inputs, vec![PathBuf::from("a.mov")]);
        assert_eq!(req.options.format.as_deref(), Some("mp4"));
        assert_eq!(req.quality(), Quality::Medium);
    }

    #[test]
    fn request_accepts_input_list() {
        let json = r#"{"operation":"merge","inputs":["a.mp4","b.mp4"],"output":"ab.mp4"}"#;
        let req: JobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.operation, Operation::Merge);
        assert_eq!(req.inputs.len(), 2);
        assert_eq!(req.options, JobOptions::default());
    }

    #[test]
    fn request_parses_extract_audio_and_resolution() {
        let json = r#"{"operation":"extract-audio","input":"a.mov","output":"a.mp3","resolution":"1280x720","fps":24}"#;
        let req: JobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.operation, Operation::ExtractAudio);
        assert_eq!(
            req.options.resolution,
            Some(Resolution { width: 1280, height: 720 })
        );
        assert_eq!(req.options.fps, Some(24.0));
    }

    #[test]
    fn request_rejects_bad_resolution() {
        let json = r#"{"operation":"convert","input":"a.mov","output":"a.mp4","resolution":"big"}"#;
        assert!(serde_json::from_str::<JobRequest>(json).is_err());
    }

    #[test]
    fn target_format_prefers_option() {
        let mut req = JobRequest::new(Operation::Convert, vec!["a.mov".into()], "out.mp4");
        assert_eq!(req.target_format().as_deref(), Some("mp4"));
        req.options.format = Some(".WEBM".into());
        assert_eq!(req.target_format().as_deref(), Some("webm"));
    }

    #[test]
    fn target_format_missing_extension() {
        let req = JobRequest::new(Operation::Convert, vec!["a.mov".into()], "out");
        assert_eq!(req.target_format(), None);
    }

    #[test]
    fn operation_round_trips_through_str() {
        for op in [
            Operation::Convert,
            Operation::Thumbnail,
            Operation::ExtractAudio,
            Operation::Compress,
            Operation::Merge,
        ] {
            assert_eq!(op.to_string().parse::<Operation>().unwrap(), op);
        }
        assert_matches!("transmogrify".parse::<Operation>(), Err(Error::InvalidRequest(_)));
    }

    #[test]
    fn resolution_parsing() {
        assert_eq!(
            "640X480".parse::<Resolution>().unwrap(),
            Resolution { width: 640, height: 480 }
        );
        assert!("0x480".parse::<Resolution>().is_err());
        assert!("640".parse::<Resolution>().is_err());
    }

    #[test]
    fn status_busy() {
        let mut status = SupervisorStatus::default();
        assert!(!status.is_busy());
        status.state = JobState::Completing;
        assert!(status.is_busy());
    }
}
