//! Transcode planning.
//!
//! Decides per stream whether the receiver can take it as-is. The decision
//! table, with "ok" meaning the device decodes the codec (or the stream is
//! absent):
//!
//! | video | audio | plan                          |
//! |-------|-------|-------------------------------|
//! | ok    | ok    | copy / copy / remux           |
//! | ok    | bad   | copy / transcode / remux      |
//! | bad   | ok    | transcode / copy / remux      |
//! | bad   | bad   | transcode / transcode / transcode |
//!
//! A compatible pair of codecs inside an unsupported container is remuxed.
//! When nothing needs converting and the source container is already one the
//! device plays, the file is served directly without a job.

use std::path::{Path, PathBuf};

use rc_av::{StreamDirective, TranscodeSpec};
use rc_core::{ContainerAction, PlanError, StreamAction, StreamKind};
use rc_probe::{MediaInfo, StreamIndex, StreamInfo};
use serde::Serialize;

use crate::device::DeviceProfile;

/// Video codec produced when video has to be re-encoded.
pub const VIDEO_TARGET: &str = "h264";

/// Which subtitle track, if any, accompanies playback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SubtitleSelection {
    #[default]
    None,
    /// Canonical index of an embedded subtitle stream.
    Embedded(u32),
    /// A sidecar subtitle file.
    External(PathBuf),
}

/// The outcome of planning one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscodePlan {
    pub video_action: StreamAction,
    pub audio_action: StreamAction,
    pub container_action: ContainerAction,
    pub video_stream: Option<StreamIndex>,
    pub audio_stream: Option<StreamIndex>,
    /// Codec for `audio_action == Transcode`.
    pub audio_target: Option<String>,
    /// The source container can be played without rewriting.
    pub direct_play: bool,
}

impl TranscodePlan {
    /// Whether an external process has to run before the item is servable.
    pub fn requires_job(&self) -> bool {
        !self.direct_play
    }

    /// Build the ffmpeg job description for this plan.
    pub fn to_spec(&self, input: &Path, output: &Path) -> TranscodeSpec {
        let video = self.video_stream.map(|stream| match self.video_action {
            StreamAction::Transcode => StreamDirective::Encode {
                stream,
                codec: VIDEO_TARGET.into(),
            },
            _ => StreamDirective::Copy(stream),
        });
        let audio = self.audio_stream.map(|stream| match (self.audio_action, &self.audio_target) {
            (StreamAction::Transcode, Some(codec)) => StreamDirective::Encode {
                stream,
                codec: codec.clone(),
            },
            _ => StreamDirective::Copy(stream),
        });
        TranscodeSpec {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            video,
            audio,
        }
    }
}

/// Plan playback of `media` on `device`.
///
/// `audio` selects an audio stream by canonical index; `None` picks the
/// file's default. An embedded subtitle selection is validated against the
/// inventory but does not influence the plan, since subtitles are served as
/// a separate WebVTT track.
///
/// # Errors
///
/// [`PlanError::UnknownStream`] or [`PlanError::WrongKind`] when a selected
/// index does not name a stream of the expected kind.
pub fn plan(
    media: &MediaInfo,
    audio: Option<u32>,
    subtitle: &SubtitleSelection,
    device: &DeviceProfile,
) -> Result<TranscodePlan, PlanError> {
    let audio_stream = match audio {
        Some(index) => Some(select(media, index, StreamKind::Audio)?),
        None => media.primary_audio(),
    };
    if let SubtitleSelection::Embedded(index) = subtitle {
        select(media, *index, StreamKind::Subtitle)?;
    }
    let video_stream = if device.audio_only {
        None
    } else {
        media.primary_video()
    };

    let video_ok = video_stream.map_or(true, |v| device.supports_video(&v.codec));
    let audio_ok = audio_stream.map_or(true, |a| device.supports_audio(&a.codec));

    let action = |stream: Option<&StreamInfo>, ok: bool| match (stream, ok) {
        (None, _) => StreamAction::None,
        (Some(_), true) => StreamAction::Copy,
        (Some(_), false) => StreamAction::Transcode,
    };
    let video_action = action(video_stream, video_ok);
    let audio_action = action(audio_stream, audio_ok);
    let container_action = if video_ok || audio_ok {
        ContainerAction::Remux
    } else {
        ContainerAction::Transcode
    };

    let audio_target = (audio_action == StreamAction::Transcode).then(|| {
        let channels = audio_stream.and_then(|a| a.channels).unwrap_or(2);
        if device.ac3 && channels > 2 {
            "ac3".to_string()
        } else {
            "mp3".to_string()
        }
    });

    // Serving the source file plays whatever the receiver picks by default,
    // so only the file's own default audio track qualifies. Dropping the
    // video of an audio-only device also needs a job.
    let plays_default_audio = match (audio_stream, media.primary_audio()) {
        (Some(selected), Some(primary)) => selected.index == primary.index,
        _ => true,
    };
    let keeps_all_video = video_stream.is_some() || media.primary_video().is_none();
    let direct_play = video_action != StreamAction::Transcode
        && audio_action != StreamAction::Transcode
        && device.supports_container(&media.container)
        && plays_default_audio
        && keeps_all_video;

    Ok(TranscodePlan {
        video_action,
        audio_action,
        container_action,
        video_stream: video_stream.map(|s| s.index),
        audio_stream: audio_stream.map(|s| s.index),
        audio_target,
        direct_play,
    })
}

fn select(media: &MediaInfo, index: u32, expected: StreamKind) -> Result<&StreamInfo, PlanError> {
    let stream = media.stream(index).ok_or(PlanError::UnknownStream { index })?;
    if stream.kind != expected {
        return Err(PlanError::WrongKind {
            index,
            expected,
            actual: stream.kind,
        });
    }
    Ok(stream)
}
