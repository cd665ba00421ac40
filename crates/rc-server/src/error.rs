//! Error-to-HTTP response conversion for the streaming routes.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Seconds a receiver should wait before retrying a transient failure.
const RETRY_AFTER_SECS: u64 = 2;

/// Failures returned to the receiver.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The URL names an item outside the current window. Never retried.
    #[error("{0} is not being served")]
    NotCurrent(String),

    /// The bytes cannot be produced right now; the job is pending, failed
    /// or was cancelled while the request waited.
    #[error("range unavailable: {0}")]
    RangeUnavailable(String),

    /// The transcoder did not write the requested bytes in time.
    #[error("timed out after {}s waiting for byte {needed}", waited.as_secs())]
    Timeout { needed: u64, waited: Duration },

    /// The range starts past the end of a complete file.
    #[error("range not satisfiable for {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::NotCurrent(_) => StatusCode::NOT_FOUND,
            ServerError::RangeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ServerError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServerError::RangeUnavailable(_) | ServerError::Timeout { .. }
        )
    }

    fn code(&self) -> &'static str {
        match self {
            ServerError::NotCurrent(_) => "not_current",
            ServerError::RangeUnavailable(_) => "range_unavailable",
            ServerError::Timeout { .. } => "timeout",
            ServerError::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            ServerError::Io(_) => "io_error",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && !self.is_retryable() {
            tracing::error!(status = %status, error = %self, "streaming request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "streaming request rejected");
        }

        let body = json!({
            "error": self.to_string(),
            "code": self.code(),
            "retryable": self.is_retryable(),
        });
        let mut response = (status, axum::Json(body)).into_response();

        let headers = response.headers_mut();
        if self.is_retryable() {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        if let ServerError::RangeNotSatisfiable { size } = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                headers.insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}
