//! Errors raised while casting.
//!
//! Each stage has its own enum so the queue can record a failure against
//! the item it belongs to. Everything converges on [`Error`].

use std::path::PathBuf;
use std::time::Duration;

use crate::media::StreamKind;

/// No stream inventory could be obtained for a file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The analysis tool failed or reported nothing usable.
    #[error("unreadable media {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("probing {} timed out after {}s", path.display(), timeout.as_secs())]
    Timeout { path: PathBuf, timeout: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("stream {index} is not in the probed inventory")]
    UnknownStream { index: u32 },

    #[error("stream {index} is {actual}, expected {expected}")]
    WrongKind {
        index: u32,
        expected: StreamKind,
        actual: StreamKind,
    },
}

/// Why a transcode attempt ended without a complete output. `diagnostic`
/// is the transcoder's own text, untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("failed to start {tool}: {message}")]
    ProcessStartFailed { tool: String, message: String },

    #[error("transcoder exited with {status}: {diagnostic}")]
    ProcessCrashed { status: String, diagnostic: String },

    #[error("disk full while writing {}: {diagnostic}", output.display())]
    DiskFull { output: PathBuf, diagnostic: String },

    #[error("job cancelled")]
    Cancelled,
}

impl JobError {
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            JobError::ProcessCrashed { diagnostic, .. } | JobError::DiskFull { diagnostic, .. } => {
                Some(diagnostic)
            }
            JobError::ProcessStartFailed { message, .. } => Some(message),
            JobError::Cancelled => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A queue index or item id that does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A request that cannot be honoured in the current queue state, or a
    /// bad configuration value.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// ffmpeg or ffprobe could not be run, or ran and failed.
    #[error("{tool}: {message}")]
    Tool { tool: String, message: String },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Job(#[from] JobError),

    /// The queue controller task is gone.
    #[error("queue controller has shut down")]
    Shutdown,

    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
