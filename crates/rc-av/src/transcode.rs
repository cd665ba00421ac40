//! Cast-compatible transcoding with ffmpeg.
//!
//! Output is always fragmented MP4 (`frag_keyframe+empty_moov`) so a
//! receiver can start reading the file while ffmpeg is still appending to
//! it. Progress is read from `-progress pipe:2` key/value blocks interleaved
//! with ffmpeg's own diagnostics on stderr.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rc_core::config::{HwAccel, TranscodeConfig};
use rc_core::JobError;
use rc_probe::StreamIndex;
use tokio_util::sync::CancellationToken;

use crate::command::{RunOutcome, ToolCommand};

/// Fragment flags for a progressively readable MP4.
pub const FRAGMENTED_MP4_FLAGS: &str = "frag_keyframe+empty_moov+default_base_moof";

/// Number of diagnostic lines retained for error reports.
const DIAGNOSTIC_LINES: usize = 20;

/// What to do with one selected input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDirective {
    /// Pass the stream through unchanged.
    Copy(StreamIndex),
    /// Re-encode the stream to `codec` (`h264`, `ac3`, `mp3`, `aac`).
    Encode { stream: StreamIndex, codec: String },
}

impl StreamDirective {
    pub fn stream(&self) -> &StreamIndex {
        match self {
            StreamDirective::Copy(s) => s,
            StreamDirective::Encode { stream, .. } => stream,
        }
    }

    pub fn is_encode(&self) -> bool {
        matches!(self, StreamDirective::Encode { .. })
    }
}

/// Everything ffmpeg needs to produce one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeSpec {
    pub input: PathBuf,
    pub output: PathBuf,
    pub video: Option<StreamDirective>,
    pub audio: Option<StreamDirective>,
}

/// The H.264 encoder used for a hardware acceleration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoEncoder {
    pub name: &'static str,
    /// Decoder flags, placed before `-i`.
    pub hwaccel: &'static [&'static str],
    /// Software x264 takes `-crf`; hardware encoders get a bitrate instead.
    pub crf: bool,
}

impl VideoEncoder {
    pub fn for_accel(accel: HwAccel) -> Self {
        let (name, hwaccel): (_, &'static [&'static str]) = match accel {
            HwAccel::None => ("libx264", &[]),
            HwAccel::Videotoolbox => ("h264_videotoolbox", &["-hwaccel", "videotoolbox"]),
            HwAccel::Nvenc => ("h264_nvenc", &["-hwaccel", "cuda"]),
            HwAccel::Vaapi => (
                "h264_vaapi",
                &["-hwaccel", "vaapi", "-hwaccel_output_format", "vaapi"],
            ),
            HwAccel::Qsv => ("h264_qsv", &["-hwaccel", "qsv"]),
        };
        Self {
            name,
            hwaccel,
            crf: accel == HwAccel::None,
        }
    }
}

/// ffmpeg encoder for an audio target codec.
fn audio_encoder(codec: &str) -> &str {
    match codec {
        "mp3" => "libmp3lame",
        other => other,
    }
}

fn push_args(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// Build the full ffmpeg argument list for `spec`.
pub fn build_transcode_args(spec: &TranscodeSpec, config: &TranscodeConfig) -> Vec<String> {
    let mut args = Vec::new();
    push_args(
        &mut args,
        &[
            "-hide_banner",
            "-nostdin",
            "-y",
            "-loglevel",
            "error",
            "-progress",
            "pipe:2",
            "-nostats",
        ],
    );

    let encoder = VideoEncoder::for_accel(config.hw_accel);
    if spec.video.as_ref().is_some_and(StreamDirective::is_encode) {
        push_args(&mut args, encoder.hwaccel);
    }

    args.push("-i".into());
    args.push(spec.input.to_string_lossy().to_string());

    for directive in [&spec.video, &spec.audio].into_iter().flatten() {
        args.push("-map".into());
        args.push(directive.stream().map_specifier());
    }

    match &spec.video {
        Some(StreamDirective::Copy(_)) => push_args(&mut args, &["-c:v", "copy"]),
        Some(StreamDirective::Encode { .. }) => {
            push_args(&mut args, &["-c:v", encoder.name, "-profile:v", "high"]);
            if encoder.crf {
                let crf = config.video_crf.to_string();
                push_args(&mut args, &["-crf", &crf, "-preset", &config.video_preset]);
            } else {
                push_args(&mut args, &["-b:v", "5M", "-maxrate", "8M", "-bufsize", "16M"]);
            }
            push_args(&mut args, &["-pix_fmt", "yuv420p"]);
        }
        None => args.push("-vn".into()),
    }

    match &spec.audio {
        Some(StreamDirective::Copy(_)) => push_args(&mut args, &["-c:a", "copy"]),
        Some(StreamDirective::Encode { codec, .. }) => push_args(
            &mut args,
            &["-c:a", audio_encoder(codec), "-b:a", &config.audio_bitrate],
        ),
        None => args.push("-an".into()),
    }

    push_args(&mut args, &["-f", "mp4", "-movflags", FRAGMENTED_MP4_FLAGS]);
    args.push(spec.output.to_string_lossy().to_string());
    args
}

// ---------------------------------------------------------------------------
// Progress parsing
// ---------------------------------------------------------------------------

/// One completed `-progress` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Media time encoded so far.
    pub out_time: Duration,
    /// Bytes written to the output so far.
    pub total_size: u64,
    pub fps: Option<f64>,
    pub speed: Option<String>,
    /// `progress=end` was seen.
    pub finished: bool,
}

impl ProgressSnapshot {
    /// Fraction of `duration` encoded, clamped to `0.0..=1.0`.
    pub fn fraction(&self, duration: Option<Duration>) -> Option<f32> {
        let total = duration?.as_secs_f64();
        if total <= 0.0 {
            return None;
        }
        Some((self.out_time.as_secs_f64() / total).clamp(0.0, 1.0) as f32)
    }
}

/// Classification of one stderr line.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A progress block ended.
    Update(ProgressSnapshot),
    /// A key/value field inside a block.
    Field,
    /// Anything else ffmpeg printed.
    Diagnostic,
}

/// Incremental parser for ffmpeg stderr with `-progress pipe:2`.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: ProgressSnapshot,
    diagnostics: VecDeque<String>,
    disk_full: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, line: &str) -> ProgressEvent {
        let line = line.trim_end();
        let Some((key, value)) = split_field(line) else {
            if line.contains("No space left on device") {
                self.disk_full = true;
            }
            if !line.is_empty() {
                if self.diagnostics.len() == DIAGNOSTIC_LINES {
                    self.diagnostics.pop_front();
                }
                self.diagnostics.push_back(line.to_string());
            }
            return ProgressEvent::Diagnostic;
        };

        match key {
            "out_time_us" | "out_time_ms" => {
                // Both keys carry microseconds; N/A before the first frame.
                if let Ok(us) = value.parse::<u64>() {
                    self.current.out_time = Duration::from_micros(us);
                }
            }
            "total_size" => {
                if let Ok(bytes) = value.parse::<u64>() {
                    self.current.total_size = bytes;
                }
            }
            "fps" => self.current.fps = value.parse().ok(),
            "speed" => {
                self.current.speed = (value != "N/A").then(|| value.to_string());
            }
            "progress" => {
                self.current.finished = value == "end";
                return ProgressEvent::Update(self.current.clone());
            }
            _ => {}
        }
        ProgressEvent::Field
    }

    /// Latest known values, including an unfinished block.
    pub fn latest(&self) -> &ProgressSnapshot {
        &self.current
    }

    /// Whether ffmpeg reported a full disk.
    pub fn saw_disk_full(&self) -> bool {
        self.disk_full
    }

    /// The retained diagnostic lines, newline-joined.
    pub fn diagnostic(&self) -> String {
        self.diagnostics
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Split a `-progress` line. Keys are lowercase identifiers and values never
/// contain whitespace, which keeps ffmpeg's error lines out.
fn split_field(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let is_key = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    (is_key && !value.contains(char::is_whitespace)).then_some((key, value.trim()))
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Run ffmpeg for `spec`, reporting each progress block to `on_progress`.
///
/// Returns `Ok(())` once ffmpeg exits successfully.
///
/// # Errors
///
/// - [`JobError::ProcessStartFailed`] if ffmpeg could not be spawned.
/// - [`JobError::Cancelled`] if `cancel` fired; the process has exited.
/// - [`JobError::DiskFull`] or [`JobError::ProcessCrashed`] on a non-zero
///   exit, carrying ffmpeg's diagnostic output.
/// - [`JobError::ProcessCrashed`] when the run outlived
///   `max_runtime_secs` or its stderr broke; ffmpeg has been killed.
pub async fn run_transcode(
    ffmpeg: &Path,
    spec: &TranscodeSpec,
    config: &TranscodeConfig,
    mut on_progress: impl FnMut(&ProgressSnapshot),
    cancel: CancellationToken,
) -> Result<(), JobError> {
    let args = build_transcode_args(spec, config);
    tracing::info!(
        input = %spec.input.display(),
        output = %spec.output.display(),
        "starting ffmpeg: {}",
        args.join(" ")
    );

    let mut cmd = ToolCommand::new(ffmpeg);
    cmd.timeout(config.max_runtime());
    cmd.kill_grace(config.kill_grace());
    cmd.args(args);

    let mut parser = ProgressParser::new();
    let outcome = cmd
        .stream_stderr(
            |line| {
                if let ProgressEvent::Update(snapshot) = parser.feed(line) {
                    on_progress(&snapshot);
                }
            },
            &cancel,
        )
        .await
        .map_err(|e| JobError::ProcessStartFailed {
            tool: "ffmpeg".into(),
            message: e.to_string(),
        })?;

    match outcome {
        RunOutcome::Cancelled => Err(JobError::Cancelled),
        RunOutcome::Aborted(reason) => Err(JobError::ProcessCrashed {
            status: reason,
            diagnostic: parser.diagnostic(),
        }),
        RunOutcome::Exited(status) if status.success() => Ok(()),
        RunOutcome::Exited(status) => {
            let diagnostic = parser.diagnostic();
            if parser.saw_disk_full() {
                Err(JobError::DiskFull {
                    output: spec.output.clone(),
                    diagnostic,
                })
            } else {
                Err(JobError::ProcessCrashed {
                    status: status.to_string(),
                    diagnostic,
                })
            }
        }
    }
}
