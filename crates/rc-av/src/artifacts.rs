//! Derived artifacts served next to the media: a JPEG thumbnail and WebVTT
//! subtitles.

use std::path::Path;
use std::time::Duration;

use rc_probe::StreamIndex;

use crate::command::ToolCommand;

/// Upper bound for a single artifact extraction.
const ARTIFACT_TIMEOUT: Duration = Duration::from_secs(120);

/// Where a subtitle track comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitleSource<'a> {
    /// A subtitle stream inside the media file.
    Embedded { media: &'a Path, stream: StreamIndex },
    /// A sidecar `.srt`/`.ass`/`.vtt` file.
    External(&'a Path),
}

/// Write one `width`-pixel-wide JPEG frame from `offset` into `output`.
///
/// Files shorter than `offset` produce no frame; the extraction is then
/// retried from the start.
pub async fn extract_thumbnail(
    ffmpeg: &Path,
    input: &Path,
    output: &Path,
    offset: Duration,
    width: u32,
) -> rc_core::Result<()> {
    match run_thumbnail(ffmpeg, input, output, offset, width).await {
        Ok(()) => {
            if non_empty(output).await {
                return Ok(());
            }
        }
        Err(e) if offset.is_zero() => return Err(e),
        Err(e) => tracing::debug!(input = %input.display(), "thumbnail at offset failed: {e}"),
    }

    tracing::debug!(
        input = %input.display(),
        "no frame at {}s, retrying thumbnail from the start",
        offset.as_secs()
    );
    run_thumbnail(ffmpeg, input, output, Duration::ZERO, width).await?;
    if non_empty(output).await {
        Ok(())
    } else {
        Err(rc_core::Error::Tool {
            tool: "ffmpeg".into(),
            message: format!("no thumbnail frame produced for {}", input.display()),
        })
    }
}

async fn run_thumbnail(
    ffmpeg: &Path,
    input: &Path,
    output: &Path,
    offset: Duration,
    width: u32,
) -> rc_core::Result<()> {
    let mut cmd = ToolCommand::new(ffmpeg);
    cmd.timeout(ARTIFACT_TIMEOUT);
    cmd.args(["-hide_banner", "-nostdin", "-y", "-v", "error"]);
    cmd.args(["-ss".to_string(), offset.as_secs().to_string()]);
    cmd.arg("-i");
    cmd.arg(input);
    cmd.args(["-f", "mjpeg", "-vframes", "1"]);
    cmd.args(["-vf".to_string(), format!("scale={width}:-1")]);
    cmd.arg(output);
    cmd.output().await?;
    Ok(())
}

/// Convert a subtitle track to WebVTT at `output`.
pub async fn extract_subtitle_vtt(
    ffmpeg: &Path,
    source: SubtitleSource<'_>,
    output: &Path,
) -> rc_core::Result<()> {
    let mut cmd = ToolCommand::new(ffmpeg);
    cmd.timeout(ARTIFACT_TIMEOUT);
    cmd.args(["-hide_banner", "-nostdin", "-y", "-v", "error"]);

    match &source {
        SubtitleSource::Embedded { media, stream } => {
            cmd.arg("-i");
            cmd.arg(media);
            cmd.args(["-vn", "-an", "-map"]);
            cmd.arg(stream.map_specifier());
        }
        SubtitleSource::External(path) => {
            cmd.arg("-i");
            cmd.arg(path);
        }
    }

    cmd.args(["-f", "webvtt", "-scodec", "webvtt"]);
    cmd.arg(output);
    cmd.output().await?;

    if !non_empty(output).await {
        return Err(rc_core::Error::Tool {
            tool: "ffmpeg".into(),
            message: format!("subtitle conversion produced no output at {}", output.display()),
        });
    }
    Ok(())
}

async fn non_empty(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len() > 0)
        .unwrap_or(false)
}
