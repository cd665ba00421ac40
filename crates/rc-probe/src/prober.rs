//! The probing seam between the queue and the external analysis tools.

use std::path::Path;

use async_trait::async_trait;
use rc_core::ProbeError;

use crate::types::MediaInfo;

/// Produces the stream inventory of one file.
///
/// Implementations bound their own running time; the queue runs probes on
/// spawned tasks and has no timeout of its own.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Shown in logs.
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// - [`ProbeError::NotFound`] if `path` does not exist.
    /// - [`ProbeError::Unreadable`] if the tool fails or reports no stream.
    /// - [`ProbeError::Timeout`] if analysis exceeds the prober's bound.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError>;

    /// Cheap pre-check; `true` does not promise that [`Prober::probe`]
    /// succeeds.
    fn supports(&self, path: &Path) -> bool;
}
