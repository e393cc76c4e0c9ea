//! Unified error type for reelforge.
//!
//! All crates funnel their failures into [`Error`]. The bridge reports each
//! failure to the observer using the stable identifier from [`Error::kind`].

use std::fmt;
use std::time::Duration;

/// Unified error type covering all failure modes in reelforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A path referenced by a request or probe does not exist.
    #[error("{entity} not found: {path}")]
    NotFound {
        /// The kind of entity (e.g. "input", "file").
        entity: String,
        /// The path that was looked up.
        path: String,
    },

    /// The request is empty or ill-formed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A job is already running; admission was rejected.
    #[error("Busy: a job is already running")]
    Busy,

    /// An external tool did not finish within its time bound.
    #[error("Timeout [{tool}]: no result after {after:?}")]
    Timeout {
        /// Name of the tool that timed out.
        tool: String,
        /// The bound that was exceeded.
        after: Duration,
    },

    /// The probed file has no video track.
    #[error("No video stream found in {0}")]
    NoVideoStream(String),

    /// The transcoding engine exited with an error while running a job.
    #[error("Engine failure: {0}")]
    Engine(String),

    /// An external tool could not be located or spawned.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Probe output could not be interpreted.
    #[error("Probe error: {0}")]
    Probe(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable identifier for this error, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Busy => "busy",
            Error::Timeout { .. } => "timeout",
            Error::NoVideoStream(_) => "no_video_stream",
            Error::Engine(_) => "engine_failure",
            Error::Tool { .. } => "tool",
            Error::Probe(_) => "probe",
            Error::Io { .. } => "io",
            Error::Config(_) => "config",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether this failure was decided at admission, before any subprocess
    /// existed.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. } | Error::InvalidRequest(_) | Error::Busy
        )
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, path: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            path: path.to_string(),
        }
    }

    /// Convenience constructor for [`Error::InvalidRequest`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidRequest(message.into())
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Engine`].
    pub fn engine(message: impl Into<String>) -> Self {
        Error::Engine(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
