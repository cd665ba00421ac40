//! # rc-av
//!
//! External tool management for the reelcast pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout,
//!   line-by-line stderr streaming and cooperative cancellation.
//! - **Probe backends** ([`probe::FfprobeProber`], [`probe::BannerProber`])
//!   -- implement [`rc_probe::Prober`] by shelling out to the CLI tools.
//! - **Transcoding** ([`transcode`]) -- ffmpeg argument construction for
//!   per-stream copy/encode directives and `-progress` output parsing.
//! - **Artifacts** ([`artifacts`]) -- thumbnail and WebVTT subtitle extraction.

pub mod artifacts;
pub mod command;
pub mod probe;
pub mod tools;
pub mod transcode;

// ---- Re-exports for convenience ----

pub use artifacts::{extract_subtitle_vtt, extract_thumbnail, SubtitleSource};
pub use command::{RunOutcome, ToolCommand, ToolOutput};
pub use probe::{BannerProber, FfprobeProber};
pub use tools::{Tool, ToolInfo, ToolRegistry};
pub use transcode::{
    build_transcode_args, run_transcode, ProgressEvent, ProgressParser, ProgressSnapshot,
    StreamDirective, TranscodeSpec, VideoEncoder,
};
