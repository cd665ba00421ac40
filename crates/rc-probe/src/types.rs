//! Core types for probe results.

use std::path::PathBuf;
use std::time::Duration;

use rc_core::StreamKind;
use serde::{Deserialize, Serialize};

use crate::index::StreamIndex;

/// One physical stream inside a media file. Immutable once probed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: StreamIndex,
    pub kind: StreamKind,
    /// Normalized lowercase codec name.
    pub codec: String,
    pub is_default: bool,
    /// False for sidecar files attached after probing.
    pub is_embedded: bool,
    pub language: Option<String>,
    pub title: Option<String>,
    /// Audio channel count.
    pub channels: Option<u32>,
}

impl StreamInfo {
    /// A default-flagged embedded stream with no optional metadata.
    pub fn new(index: StreamIndex, kind: StreamKind, codec: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            codec: rc_core::normalize_codec(&codec.into()),
            is_default: false,
            is_embedded: true,
            language: None,
            title: None,
            channels: None,
        }
    }

    /// Display label: title, then language, then codec.
    pub fn label(&self) -> String {
        let name = self
            .title
            .clone()
            .or_else(|| self.language.clone())
            .unwrap_or_else(|| format!("{} #{}", self.kind, self.index.index()));
        match (self.kind, self.channels) {
            (StreamKind::Audio, Some(ch)) => {
                format!("{name} ({}/{})", self.codec, channel_layout(ch))
            }
            _ => format!("{name} ({})", self.codec),
        }
    }
}

/// Human-readable channel layout.
pub fn channel_layout(channels: u32) -> String {
    match channels {
        1 => "mono".into(),
        2 => "stereo".into(),
        6 => "5.1".into(),
        8 => "7.1".into(),
        n => n.to_string(),
    }
}

/// Complete stream inventory of a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Path to the probed file.
    pub file_path: PathBuf,
    /// File size in bytes.
    pub file_size: u64,
    /// Normalized container name (`mp4`, `mkv`, `mp3`, ...).
    pub container: String,
    /// Total duration (if determinable).
    pub duration: Option<Duration>,
    /// All streams in the order the tool reported them.
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    /// Streams of one kind, in file order.
    pub fn streams_of(&self, kind: StreamKind) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(move |s| s.kind == kind)
    }

    /// Look up a stream by its canonical index.
    pub fn stream(&self, index: u32) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.index.index() == index)
    }

    /// The stream a player would pick for `kind`: the first default-flagged
    /// one, falling back to the first one.
    pub fn primary(&self, kind: StreamKind) -> Option<&StreamInfo> {
        self.streams_of(kind)
            .find(|s| s.is_default)
            .or_else(|| self.streams_of(kind).next())
    }

    pub fn primary_video(&self) -> Option<&StreamInfo> {
        self.primary(StreamKind::Video)
    }

    pub fn primary_audio(&self) -> Option<&StreamInfo> {
        self.primary(StreamKind::Audio)
    }

    /// True when there is audio but no video.
    pub fn is_audio_only(&self) -> bool {
        self.streams_of(StreamKind::Video).next().is_none()
            && self.streams_of(StreamKind::Audio).next().is_some()
    }
}
