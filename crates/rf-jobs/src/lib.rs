//! rf-jobs: the single-slot job supervisor.
//!
//! [`JobSupervisor`] admits at most one transcoding job at a time, runs it as
//! an ffmpeg subprocess on a Tokio task, and publishes its lifecycle on the
//! shared [`rf_core::events::EventBus`].

pub mod supervisor;

pub use supervisor::JobSupervisor;
