//! `GET /media/{item_id}`: the playable bytes of a queue item.
//!
//! Direct-play items serve the source file. Transcoded items serve the job
//! output: complete once the job succeeded, progressively while it runs.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use rc_core::JobState;
use rc_pipeline::{JobHandle, MediaSource};

use crate::context::ServerContext;
use crate::error::ServerError;
use crate::progressive::{self, Available};
use crate::range::{self, ByteRange};

pub async fn get_media(
    State(ctx): State<ServerContext>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ServerError> {
    let entry = super::lookup(&ctx, &item_id)?;
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(ByteRange::parse);
    let content_type = entry.metadata.content_type.as_str();

    match &entry.media {
        MediaSource::Pending => Err(ServerError::RangeUnavailable(format!(
            "item {item_id} is still being prepared"
        ))),
        MediaSource::Direct(path) => range::serve_complete_file(path, content_type, range).await,
        MediaSource::Job(job) => serve_job(&ctx, job, content_type, range).await,
    }
}

async fn serve_job(
    ctx: &ServerContext,
    job: &JobHandle,
    content_type: &str,
    range: Option<ByteRange>,
) -> Result<Response, ServerError> {
    let Some(range) = range else {
        return match job.state() {
            JobState::Succeeded => {
                range::serve_complete_file(job.output_path(), content_type, None).await
            }
            JobState::Failed | JobState::Cancelled => Err(ServerError::RangeUnavailable(
                format!("transcode {} did not complete", job.id()),
            )),
            JobState::Pending | JobState::Running => {
                tracing::debug!(job_id = %job.id(), "following transcode output");
                let stream = progressive::follow(job.clone(), ctx.streaming.clone());
                Ok(range::streaming_response(content_type, Body::from_stream(stream)))
            }
        };
    };

    // Open-ended ranges only wait for their first byte. Ends near u64::MAX
    // saturate and so wait for the final length.
    let (start, needed) = match range {
        ByteRange::From(start) => (start, start.saturating_add(1)),
        ByteRange::Span(start, end) => (start, end.saturating_add(1)),
        ByteRange::Suffix(_) if job.state() == JobState::Succeeded => {
            return range::serve_complete_file(job.output_path(), content_type, Some(range)).await;
        }
        ByteRange::Suffix(_) => {
            return Err(ServerError::RangeUnavailable(format!(
                "transcode {} has no final length yet",
                job.id()
            )))
        }
    };
    match progressive::wait_for_bytes(job, needed, &ctx.streaming).await? {
        Available::Complete(_) => {
            range::serve_complete_file(job.output_path(), content_type, Some(range)).await
        }
        Available::Written(len) => {
            let end = match range {
                ByteRange::Span(_, end) => end,
                _ => start
                    .saturating_add(ctx.streaming.effective_chunk_size() - 1)
                    .min(len - 1),
            };
            let body = range::file_body(job.output_path(), start, end - start + 1).await?;
            Ok(range::partial_response(content_type, (start, end), None, body))
        }
    }
}
