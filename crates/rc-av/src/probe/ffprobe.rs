//! The preferred prober: ffprobe's JSON report.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rc_core::{ProbeError, StreamKind};
use rc_probe::{MediaInfo, Prober, StreamIndex, StreamInfo};
use serde::Deserialize;

use crate::command::ToolCommand;

#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            timeout,
        }
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn supports(&self, path: &Path) -> bool {
        path.is_file()
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        if !path.exists() {
            return Err(ProbeError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let mut cmd = ToolCommand::new(&self.ffprobe_path);
        cmd.args(["-v", "quiet", "-print_format", "json"])
            .args(["-show_format", "-show_streams"])
            .arg(path);

        let stdout = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ProbeError::Timeout {
                path: path.to_path_buf(),
                timeout: self.timeout,
            })?
            .map_err(|e| ProbeError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .stdout;

        let mut info = parse_ffprobe_json(path, &stdout)?;
        if info.file_size == 0 {
            info.file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        }
        Ok(info)
    }
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    format: ReportFormat,
    #[serde(default)]
    streams: Vec<ReportStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportStream {
    index: u32,
    /// Container-level id such as `0x1100` in MPEG-TS.
    id: Option<String>,
    #[serde(rename = "codec_type")]
    kind: Option<String>,
    #[serde(rename = "codec_name")]
    codec: Option<String>,
    channels: Option<u32>,
    #[serde(default)]
    disposition: Disposition,
    #[serde(default)]
    tags: Tags,
}

#[derive(Debug, Default, Deserialize)]
struct Disposition {
    #[serde(default)]
    default: u8,
}

#[derive(Debug, Default, Deserialize)]
struct Tags {
    language: Option<String>,
    title: Option<String>,
}

/// Build a [`MediaInfo`] from `ffprobe -print_format json` output.
///
/// Data and attachment streams are dropped; if nothing else is left the
/// file is [`ProbeError::Unreadable`].
pub fn parse_ffprobe_json(path: &Path, json: &str) -> Result<MediaInfo, ProbeError> {
    let unreadable = |reason: String| ProbeError::Unreadable {
        path: path.to_path_buf(),
        reason,
    };
    let report: Report =
        serde_json::from_str(json).map_err(|e| unreadable(format!("bad ffprobe JSON: {e}")))?;
    let ReportFormat {
        format_name,
        duration,
        size,
    } = report.format;

    let streams: Vec<StreamInfo> = report
        .streams
        .into_iter()
        .filter_map(|stream| {
            let kind = match stream.kind.as_deref()? {
                "video" => StreamKind::Video,
                "audio" => StreamKind::Audio,
                "subtitle" => StreamKind::Subtitle,
                _ => return None,
            };
            let tag = stream
                .id
                .as_deref()
                .and_then(|id| StreamIndex::parse_hex_tag(id).ok());
            let index = StreamIndex::new(stream.index).with_hex_tag(tag);

            let mut info = StreamInfo::new(index, kind, stream.codec.unwrap_or_default());
            info.is_default = stream.disposition.default == 1;
            info.language = stream.tags.language.filter(|l| l != "und");
            info.title = stream.tags.title;
            if kind == StreamKind::Audio {
                info.channels = stream.channels;
            }
            Some(info)
        })
        .collect();

    if streams.is_empty() {
        return Err(unreadable("no audio, video or subtitle stream found".into()));
    }

    Ok(MediaInfo {
        file_path: path.to_path_buf(),
        file_size: size.and_then(|s| s.parse().ok()).unwrap_or(0),
        container: rc_core::normalize_container(format_name.as_deref().unwrap_or("")),
        duration: duration
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64),
        streams,
    })
}
