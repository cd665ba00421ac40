//! `Range` header handling and file bodies.

use std::io::SeekFrom;
use std::path::Path;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::error::ServerError;

pub const READ_CHUNK: usize = 64 * 1024;

/// A single `bytes=` range. Multi-range requests are treated as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=500-`
    From(u64),
    /// `bytes=500-999`, inclusive.
    Span(u64, u64),
    /// `bytes=-500`: the last 500 bytes.
    Suffix(u64),
}

impl ByteRange {
    pub fn parse(value: &str) -> Option<Self> {
        let spec = value.trim().strip_prefix("bytes=")?;
        if spec.contains(',') {
            return None;
        }
        let (first, last) = spec.split_once('-')?;
        let number = |s: &str| s.trim().parse::<u64>().ok();

        match (first.trim().is_empty(), last.trim().is_empty()) {
            (true, true) => None,
            (true, false) => number(last).filter(|&n| n > 0).map(ByteRange::Suffix),
            (false, true) => number(first).map(ByteRange::From),
            (false, false) => {
                let (start, end) = (number(first)?, number(last)?);
                (start <= end).then_some(ByteRange::Span(start, end))
            }
        }
    }

    /// Inclusive bounds within a file of `size` bytes.
    pub fn resolve(self, size: u64) -> Result<(u64, u64), ServerError> {
        let unsatisfiable = ServerError::RangeNotSatisfiable { size };
        let last = size.checked_sub(1).ok_or(unsatisfiable)?;
        match self {
            ByteRange::From(start) | ByteRange::Span(start, _) if start > last => {
                Err(ServerError::RangeNotSatisfiable { size })
            }
            ByteRange::From(start) => Ok((start, last)),
            ByteRange::Span(start, end) => Ok((start, end.min(last))),
            ByteRange::Suffix(len) => Ok((size.saturating_sub(len), last)),
        }
    }
}

/// Body of exactly `length` bytes of `path` from `start`, even if the file
/// keeps growing underneath.
pub async fn file_body(path: &Path, start: u64, length: u64) -> Result<Body, ServerError> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(start)).await?;
    let reader = ReaderStream::with_capacity(file.take(length), READ_CHUNK);
    Ok(Body::from_stream(reader))
}

fn with_headers(status: StatusCode, content_type: &str, body: Body) -> Response {
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    response
}

/// 206 for `start..=end`. The total is `*` while the file is still written.
pub fn partial_response(
    content_type: &str,
    (start, end): (u64, u64),
    total: Option<u64>,
    body: Body,
) -> Response {
    let mut response = with_headers(StatusCode::PARTIAL_CONTENT, content_type, body);
    let total = total.map_or_else(|| "*".to_owned(), |t| t.to_string());
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(end - start + 1));
    if let Ok(value) = HeaderValue::from_str(&format!("bytes {start}-{end}/{total}")) {
        headers.insert(header::CONTENT_RANGE, value);
    }
    response
}

/// 200 with a body of unknown length.
pub fn streaming_response(content_type: &str, body: Body) -> Response {
    with_headers(StatusCode::OK, content_type, body)
}

/// Serve a file whose size is final.
pub async fn serve_complete_file(
    path: &Path,
    content_type: &str,
    range: Option<ByteRange>,
) -> Result<Response, ServerError> {
    let size = tokio::fs::metadata(path).await?.len();
    let Some(range) = range else {
        let mut response =
            with_headers(StatusCode::OK, content_type, file_body(path, 0, size).await?);
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(size));
        return Ok(response);
    };

    let (start, end) = range.resolve(size)?;
    let body = file_body(path, start, end - start + 1).await?;
    Ok(partial_response(content_type, (start, end), Some(size), body))
}
