//! Chaining probers: ffprobe first, the ffmpeg banner when ffprobe is
//! missing or gives up.

use std::path::Path;

use async_trait::async_trait;
use rc_core::ProbeError;

use crate::prober::Prober;
use crate::types::MediaInfo;

/// First success wins. A missing file stops the chain at once; otherwise
/// the error of the last backend tried is returned.
pub struct CompositeProber {
    probers: Vec<Box<dyn Prober>>,
}

impl CompositeProber {
    pub fn new(probers: Vec<Box<dyn Prober>>) -> Self {
        Self { probers }
    }
}

#[async_trait]
impl Prober for CompositeProber {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn supports(&self, path: &Path) -> bool {
        self.probers.iter().any(|p| p.supports(path))
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        if !path.exists() {
            return Err(ProbeError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let mut failure = None;
        for prober in self.probers.iter().filter(|p| p.supports(path)) {
            match prober.probe(path).await {
                Ok(info) => {
                    tracing::debug!(prober = prober.name(), path = %path.display(), "probed");
                    return Ok(info);
                }
                Err(e @ ProbeError::NotFound { .. }) => return Err(e),
                Err(e) => {
                    tracing::debug!(prober = prober.name(), "{e}; falling back");
                    failure = Some(e);
                }
            }
        }

        Err(failure.unwrap_or_else(|| ProbeError::Unreadable {
            path: path.to_path_buf(),
            reason: "no prober supports this file".into(),
        }))
    }
}
