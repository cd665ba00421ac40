//! Reading a transcode output while ffmpeg is still appending to it.
//!
//! A request for bytes past the written length waits for the file to grow,
//! watching both the job status channel and the on-disk length. The wait
//! ends when enough bytes exist, when the job reaches a terminal state, or
//! when the configured timeout elapses.

use std::io;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use rc_core::config::StreamingConfig;
use rc_core::JobState;
use rc_pipeline::JobHandle;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::ServerError;
use crate::range::READ_CHUNK;

/// How much of a job's output can be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Available {
    /// The job is still running and at least this many bytes are on disk.
    Written(u64),
    /// The job succeeded; the file is final.
    Complete(u64),
}

impl Available {
    pub fn len(self) -> u64 {
        match self {
            Available::Written(len) | Available::Complete(len) => len,
        }
    }
}

async fn on_disk_len(path: &Path) -> io::Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

/// Wait until `needed` bytes of the job's output exist or the job ends.
///
/// A job that succeeded returns [`Available::Complete`] even when the file
/// is shorter than `needed`; the caller clamps the range.
///
/// # Errors
/// - `ServerError::RangeUnavailable` - the job failed or was cancelled
/// - `ServerError::Timeout` - the bytes did not appear in time
pub async fn wait_for_bytes(
    job: &JobHandle,
    needed: u64,
    config: &StreamingConfig,
) -> Result<Available, ServerError> {
    let timeout = config.range_wait_timeout();
    let deadline = tokio::time::Instant::now() + timeout;
    let mut status = job.subscribe();
    let path = job.output_path();

    loop {
        let state = status.borrow_and_update().state;
        match state {
            JobState::Succeeded => {
                let len = tokio::fs::metadata(path).await.map(|m| m.len()).map_err(|e| {
                    ServerError::RangeUnavailable(format!("transcode output is gone: {e}"))
                })?;
                return Ok(Available::Complete(len));
            }
            JobState::Failed => {
                let reason = status
                    .borrow()
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "transcode failed".into());
                return Err(ServerError::RangeUnavailable(reason));
            }
            JobState::Cancelled => {
                return Err(ServerError::RangeUnavailable("transcode was cancelled".into()));
            }
            JobState::Pending | JobState::Running => {
                let len = on_disk_len(path).await?;
                if len >= needed {
                    return Ok(Available::Written(len));
                }
            }
        }

        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return Err(ServerError::RangeUnavailable("transcode job went away".into()));
                }
            }
            _ = tokio::time::sleep(config.poll_interval()) => {}
            _ = tokio::time::sleep_until(deadline) => {
                tracing::debug!(job_id = %job.id(), needed, "gave up waiting for transcode output");
                return Err(ServerError::Timeout { needed, waited: timeout });
            }
        }
    }
}

/// Stream the job's whole output from the start, following the file as it
/// grows. Ends once the job succeeds and every byte was sent; fails if the
/// job fails or stalls.
pub fn follow(
    job: JobHandle,
    config: Arc<StreamingConfig>,
) -> impl Stream<Item = io::Result<Bytes>> {
    async_stream::try_stream! {
        let mut offset = 0u64;
        let mut file: Option<tokio::fs::File> = None;

        loop {
            let available = match wait_for_bytes(&job, offset + 1, &config).await {
                Ok(available) => available,
                Err(e) => Err(io::Error::other(e.to_string()))?,
            };
            let len = available.len();
            if len <= offset {
                if matches!(available, Available::Complete(_)) {
                    break;
                }
                continue;
            }

            let reader = match file.as_mut() {
                Some(reader) => reader,
                None => {
                    let mut opened = tokio::fs::File::open(job.output_path()).await?;
                    opened.seek(io::SeekFrom::Start(offset)).await?;
                    file.insert(opened)
                }
            };
            while offset < len {
                let want = (len - offset).min(READ_CHUNK as u64) as usize;
                let mut buf = vec![0u8; want];
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                buf.truncate(n);
                offset += n as u64;
                yield Bytes::from(buf);
            }
        }
    }
}
