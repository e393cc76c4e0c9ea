//! rf-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for the other rf-* crates,
//! providing the job/media data model, a unified error type, application
//! configuration, and the broadcast event bus that carries job lifecycle
//! events to observers.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod job;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use job::*;
pub use media::{format_bytes, MediaInfo};
