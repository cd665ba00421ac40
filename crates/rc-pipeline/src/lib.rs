//! # rc-pipeline
//!
//! Planning, transcoding and queue orchestration for reelcast.
//!
//! This crate provides:
//!
//! - **[`DeviceProfile`]** -- what a receiver model plays natively.
//! - **[`plan`]** -- per-stream copy/transcode decisions for one file and one
//!   device.
//! - **[`TranscodeManager`]** -- at most one ffmpeg job per queue item, with
//!   observable progress, cancellation and cleanup of partial output.
//! - **[`spawn_queue_controller`]** -- the actor that owns the queue, keeps the
//!   lookahead window prepared and drives the [`Receiver`].
//! - **[`ServeTable`]** -- the items the streaming server may serve.

pub mod device;
pub mod planner;
pub mod queue;
pub mod receiver;
pub mod serve;
pub mod transcoder;

// Re-export key types at the crate root.
pub use device::DeviceProfile;
pub use planner::{plan, SubtitleSelection, TranscodePlan};
pub use queue::{
    spawn_queue_controller, ControllerSettings, ItemSnapshot, PlaybackSnapshot, PlaybackStatus,
    QueueHandle, QueueSnapshot,
};
pub use receiver::{PlaybackSink, Receiver, ReceiverCall, RecordingReceiver};
pub use serve::{MediaMetadata, MediaSource, ServeEntry, ServeTable};
pub use transcoder::{JobEvent, JobHandle, JobRequest, JobStatus, TranscodeManager};
