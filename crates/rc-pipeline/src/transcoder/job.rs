//! Shared handle to one transcode job.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rc_core::{ItemId, JobError, JobId, JobState};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    /// Fraction of the source duration encoded, `0.0..=1.0`. Never decreases.
    pub progress: f32,
    /// Bytes the transcoder reports as written.
    pub written_bytes: u64,
    /// Media time encoded so far.
    pub out_time: Duration,
    pub error: Option<JobError>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            state: JobState::Pending,
            progress: 0.0,
            written_bytes: 0,
            out_time: Duration::ZERO,
            error: None,
        }
    }
}

struct JobShared {
    id: JobId,
    item_id: ItemId,
    output_path: PathBuf,
    status: watch::Sender<JobStatus>,
    cancel: CancellationToken,
}

/// Cloneable handle to a transcode job.
///
/// The worker task publishes status through a watch channel; readers (the
/// queue controller, the streaming server) subscribe to it and never touch
/// the process.
#[derive(Clone)]
pub struct JobHandle {
    shared: Arc<JobShared>,
}

impl JobHandle {
    pub(crate) fn new(id: JobId, item_id: ItemId, output_path: PathBuf) -> Self {
        let (status, _) = watch::channel(JobStatus::default());
        Self {
            shared: Arc::new(JobShared {
                id,
                item_id,
                output_path,
                status,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.shared.id
    }

    pub fn item_id(&self) -> ItemId {
        self.shared.item_id
    }

    /// Where the transcoder writes. The file may not exist yet.
    pub fn output_path(&self) -> &Path {
        &self.shared.output_path
    }

    pub fn status(&self) -> JobStatus {
        self.shared.status.borrow().clone()
    }

    pub fn state(&self) -> JobState {
        self.shared.status.borrow().state
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.shared.status.subscribe()
    }

    /// Request cancellation. Returns immediately; the job reaches
    /// [`JobState::Cancelled`] once the process has exited and the partial
    /// output is gone.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Wait until the job is in a terminal state.
    pub async fn wait_terminal(&self) -> JobStatus {
        let mut rx = self.subscribe();
        let status = match rx.wait_for(|s| s.state.is_terminal()).await {
            Ok(status) => status.clone(),
            // The sender lives in `shared`, which we hold.
            Err(_) => self.status(),
        };
        status
    }

    /// Cancel and wait for teardown.
    pub async fn cancel_and_wait(&self) -> JobStatus {
        self.cancel();
        self.wait_terminal().await
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut JobStatus)) {
        self.shared.status.send_modify(f);
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.shared.id)
            .field("item_id", &self.shared.item_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_terminal_sees_final_state() {
        let handle = JobHandle::new(JobId::new(), ItemId::new(), PathBuf::from("/tmp/x.mp4"));
        let waiter = {
            let h = handle.clone();
            tokio::spawn(async move { h.wait_terminal().await })
        };
        handle.update(|s| s.state = JobState::Running);
        handle.update(|s| {
            s.state = JobState::Succeeded;
            s.progress = 1.0;
        });
        let status = waiter.await.unwrap();
        assert_eq!(status.state, JobState::Succeeded);
        assert_eq!(status.progress, 1.0);
    }

    #[tokio::test]
    async fn wait_terminal_returns_at_once_when_already_done() {
        let handle = JobHandle::new(JobId::new(), ItemId::new(), PathBuf::from("/tmp/x.mp4"));
        handle.update(|s| s.state = JobState::Cancelled);
        let status = tokio::time::timeout(std::time::Duration::from_secs(1), handle.wait_terminal())
            .await
            .unwrap();
        assert_eq!(status.state, JobState::Cancelled);
    }

    #[test]
    fn clones_share_state() {
        let a = JobHandle::new(JobId::new(), ItemId::new(), PathBuf::from("/tmp/x.mp4"));
        let b = a.clone();
        a.update(|s| s.written_bytes = 42);
        assert_eq!(b.status().written_bytes, 42);
        assert_eq!(a.id(), b.id());
        b.cancel();
        assert!(a.cancel_token().is_cancelled());
    }
}
