//! Prober that reads the input banner `ffmpeg -i` prints on stderr.
//!
//! ```text
//! Input #0, matroska,webm, from 'show.mkv':
//!   Duration: 00:21:25.48, start: 0.000000, bitrate: 4430 kb/s
//!   Stream #0:0(eng): Video: hevc (Main 10), yuv420p10le, 1920x1080 (default)
//!   Stream #0:1[0x2](eng): Audio: ac3, 48000 Hz, 5.1(side), fltp, 640 kb/s
//!     Metadata:
//!       title           : Surround
//! ```

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use rc_core::{ProbeError, StreamKind};
use rc_probe::{MediaInfo, Prober, StreamIndex, StreamInfo};
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::command::{RunOutcome, ToolCommand};

/// Stderr lines kept for the error message when nothing parses.
const DIAGNOSTIC_TAIL: usize = 5;

/// Fallback prober for hosts that have ffmpeg but no ffprobe.
#[derive(Debug, Clone)]
pub struct BannerProber {
    ffmpeg_path: PathBuf,
    timeout: Duration,
}

impl BannerProber {
    pub fn new(ffmpeg_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            timeout,
        }
    }
}

#[async_trait]
impl Prober for BannerProber {
    fn name(&self) -> &'static str {
        "ffmpeg-banner"
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

        // Without an output ffmpeg exits 1 after printing the banner, so the
        // exit status is ignored and only the parsed streams count.
        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone());
        cmd.args(["-hide_banner", "-nostdin", "-i"]);
        cmd.arg(path);

        let mut banner = String::new();
        let never = CancellationToken::new();
        let run = cmd.stream_stderr(
            |line| {
                banner.push_str(line);
                banner.push('\n');
            },
            &never,
        );

        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(RunOutcome::Aborted(reason))) => {
                return Err(ProbeError::Unreadable {
                    path: path.to_path_buf(),
                    reason,
                })
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(ProbeError::Unreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ProbeError::Timeout {
                    path: path.to_path_buf(),
                    timeout: self.timeout,
                })
            }
        }

        let mut info = parse_banner(path, &banner)?;
        info.file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        Ok(info)
    }
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(Patterns::compile);

struct Patterns {
    input: Regex,
    duration: Regex,
    stream: Regex,
    title: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            input: Regex::new(r"^Input #\d+, (.+?), from ")?,
            duration: Regex::new(r"^\s*Duration: (\d+):(\d{2}):(\d{2}(?:\.\d+)?)")?,
            stream: Regex::new(
                r"^\s*Stream #(\S+?)(?:\(([A-Za-z]+)\))?: (Video|Audio|Subtitle): ([^,\s]+)(.*)$",
            )?,
            title: Regex::new(r"^\s+title\s*:\s*(.+?)\s*$")?,
        })
    }
}

/// Parse an ffmpeg input banner into a [`MediaInfo`].
///
/// `file_size` is left at zero; the caller fills it from the filesystem.
pub fn parse_banner(path: &Path, banner: &str) -> Result<MediaInfo, ProbeError> {
    let re = PATTERNS.as_ref().map_err(|e| ProbeError::Unreadable {
        path: path.to_path_buf(),
        reason: format!("banner pattern: {e}"),
    })?;
    let mut container = String::new();
    let mut duration = None;
    let mut streams: Vec<StreamInfo> = Vec::new();

    for line in banner.lines() {
        if let Some(caps) = re.input.captures(line) {
            container = rc_core::normalize_container(&caps[1]);
        } else if let Some(caps) = re.duration.captures(line) {
            duration = parse_clock(&caps[1], &caps[2], &caps[3]);
        } else if let Some(caps) = re.stream.captures(line) {
            let Ok(index) = caps[1].parse::<StreamIndex>() else {
                tracing::debug!(token = &caps[1], "skipping unparseable stream token");
                continue;
            };
            let kind = match &caps[3] {
                "Video" => StreamKind::Video,
                "Audio" => StreamKind::Audio,
                _ => StreamKind::Subtitle,
            };
            let rest = &caps[5];
            let mut info = StreamInfo::new(index, kind, &caps[4]);
            info.language = caps
                .get(2)
                .map(|m| m.as_str().to_lowercase())
                .filter(|l| l != "und");
            info.is_default = rest.contains("(default)");
            if kind == StreamKind::Audio {
                info.channels = parse_channels(rest);
            }
            streams.push(info);
        } else if let Some(caps) = re.title.captures(line) {
            // Metadata blocks before the first stream belong to the file.
            if let Some(last) = streams.last_mut() {
                if last.title.is_none() {
                    last.title = Some(caps[1].to_string());
                }
            }
        }
    }

    if streams.is_empty() {
        let tail: Vec<&str> = banner.lines().rev().take(DIAGNOSTIC_TAIL).collect();
        let reason = if tail.is_empty() {
            "no stream found in ffmpeg output".to_string()
        } else {
            tail.into_iter().rev().collect::<Vec<_>>().join("; ")
        };
        return Err(ProbeError::Unreadable {
            path: path.to_path_buf(),
            reason,
        });
    }

    Ok(MediaInfo {
        file_path: path.to_path_buf(),
        file_size: 0,
        container,
        duration,
        streams,
    })
}

fn parse_clock(hours: &str, minutes: &str, seconds: &str) -> Option<Duration> {
    let h: f64 = hours.parse().ok()?;
    let m: f64 = minutes.parse().ok()?;
    let s: f64 = seconds.parse().ok()?;
    let total = h * 3600.0 + m * 60.0 + s;
    (total > 0.0).then(|| Duration::from_secs_f64(total))
}

/// Channel count from the layout field of an audio stream description.
fn parse_channels(rest: &str) -> Option<u32> {
    rest.split(',').map(str::trim).find_map(|field| {
        let layout = field.split('(').next().unwrap_or(field);
        match layout {
            "mono" => Some(1),
            "stereo" => Some(2),
            "quad" => Some(4),
            "5.0" => Some(5),
            "5.1" => Some(6),
            "6.1" => Some(7),
            "7.1" => Some(8),
            other => other
                .strip_suffix(" channels")
                .and_then(|n| n.trim().parse().ok()),
        }
    })
}
