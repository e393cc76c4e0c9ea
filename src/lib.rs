//! reelforge: a single-job video transcoding supervisor.
//!
//! The workspace crates do the work ([`rf_core`] data model and events,
//! [`rf_av`] ffmpeg/ffprobe plumbing, [`rf_jobs`] the supervisor). This crate
//! adds the outer surfaces: the JSON-lines [`bridge`] used by desktop
//! front-ends and the [`host`] status query.

pub mod bridge;
pub mod host;

pub use rf_av;
pub use rf_core;
pub use rf_jobs;
