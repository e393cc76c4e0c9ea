//! Typed ID wrappers.
//!
//! Each ID type is a newtype over `Uuid` so a job identifier can never be
//! confused with an event identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a random-UUID newtype.
macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            // Keeps clippy's `new_without_default` quiet.
            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(&self.0, f)
                }
            }
        )+
    };
}

typed_id! {
    /// Identifier of one transcoding job, stamped on every event it emits.
    JobId,
    /// Identifier of a single emitted event.
    EventId,
}
