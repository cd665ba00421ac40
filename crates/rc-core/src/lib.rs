//! rc-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for all other rc-* crates,
//! providing type-safe identifiers, the error taxonomy for probing,
//! planning and transcoding, media-domain enums, application configuration,
//! and a broadcast event bus for UI notifications.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, JobError, PlanError, ProbeError, Result};
pub use ids::*;
pub use media::*;
