//! # rf-av
//!
//! External transcoding engine plumbing for reelforge.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout,
//!   stderr streaming and cancellation.
//! - **Probing** ([`FfprobeProber`]) -- media metadata via ffprobe, with an
//!   estimate when inspection fails.
//! - **Command building** ([`builder::build_args`]) -- the ffmpeg argument
//!   list for each job operation.
//! - **Progress parsing** ([`ProgressParser`]) -- decode `-progress` blocks
//!   into [`rf_core::ProgressSnapshot`]s.

pub mod builder;
pub mod command;
pub mod probe;
pub mod progress;
pub mod tools;

// ---- Re-exports for convenience ----

pub use builder::{build_args, describe};
pub use command::{StreamExit, ToolCommand, ToolOutput};
pub use probe::FfprobeProber;
pub use progress::ProgressParser;
pub use tools::{ToolConfig, ToolInfo, ToolRegistry, FFMPEG, FFPROBE};
