//! Transcoder process management.

mod job;
mod manager;

pub use job::{JobHandle, JobStatus};
pub use manager::{JobEvent, JobRequest, TranscodeManager};
