//! Media-domain enums for stream kinds, plan actions, and lifecycle states.
//!
//! All enums serialize in lowercase (via `serde(rename_all = "lowercase")`) and
//! implement `Display` manually for consistent string representation.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// StreamKind
// ---------------------------------------------------------------------------

/// The kind of a physical stream inside a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Subtitle => write!(f, "subtitle"),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan actions
// ---------------------------------------------------------------------------

/// What happens to one selected stream in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamAction {
    Copy,
    Transcode,
    /// The source has no stream of this kind.
    None,
}

impl fmt::Display for StreamAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Transcode => write!(f, "transcode"),
            Self::None => write!(f, "none"),
        }
    }
}

/// How the output container is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAction {
    Remux,
    Transcode,
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remux => write!(f, "remux"),
            Self::Transcode => write!(f, "transcode"),
        }
    }
}

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// Lifecycle of one transcode job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    /// Terminal states are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// ItemState
// ---------------------------------------------------------------------------

/// Lifecycle of one queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Queued,
    Probing,
    Probed,
    Transcoding,
    Ready,
    Playing,
    Played,
    Error,
}

impl ItemState {
    /// Whether the item has a probed stream inventory.
    pub fn is_probed(self) -> bool {
        matches!(
            self,
            Self::Probed | Self::Transcoding | Self::Ready | Self::Playing | Self::Played
        )
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Probing => write!(f, "probing"),
            Self::Probed => write!(f, "probed"),
            Self::Transcoding => write!(f, "transcoding"),
            Self::Ready => write!(f, "ready"),
            Self::Playing => write!(f, "playing"),
            Self::Played => write!(f, "played"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Codec names
// ---------------------------------------------------------------------------

/// Normalize a codec name reported by a probe tool.
///
/// Lowercases and folds the common aliases so device profile lookups can
/// compare plain strings.
pub fn normalize_codec(raw: &str) -> String {
    let lower = raw.trim().trim_end_matches(',').to_ascii_lowercase();
    match lower.as_str() {
        "h265" | "x265" => "hevc".into(),
        "avc" | "avc1" | "x264" => "h264".into(),
        "mp3float" => "mp3".into(),
        "ac-3" => "ac3".into(),
        "e-ac-3" => "eac3".into(),
        _ => lower,
    }
}

/// Normalize a container name (ffprobe `format_name` or file extension).
pub fn normalize_container(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    // ffprobe reports comma-separated demuxer aliases.
    let first = lower.split(',').next().unwrap_or("");
    match first {
        "mov" | "m4v" | "m4a" | "mp4" => "mp4".into(),
        "matroska" | "mkv" => "mkv".into(),
        "mpegts" | "ts" | "m2ts" => "mpegts".into(),
        "adts" | "aac" => "aac".into(),
        "mp3" => "mp3".into(),
        "wav" => "wav".into(),
        "avi" => "avi".into(),
        "webm" => "webm".into(),
        other => other.to_string(),
    }
}
