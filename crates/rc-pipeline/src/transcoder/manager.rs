//! Transcode job supervision.
//!
//! At most one non-terminal job exists per item. A second `start_job` for an
//! item whose job is still pending or running returns the existing handle.
//! A worker task owns the ffmpeg process; it publishes status through the
//! [`JobHandle`] and posts [`JobEvent`]s in order, progress first and exactly
//! one terminal event last. The terminal state is published only after the
//! process has been reaped and any partial output removed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use rc_core::config::TranscodeConfig;
use rc_core::{ItemId, JobError, JobId, JobState};
use tokio::sync::mpsc;

use super::job::{JobHandle, JobStatus};
use crate::planner::TranscodePlan;

/// Everything needed to start a job for one item.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub item_id: ItemId,
    pub source: PathBuf,
    pub plan: TranscodePlan,
    /// Source duration, for progress fractions.
    pub duration: Option<Duration>,
}

/// Notifications from job workers, tagged with the job that produced them.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Progress {
        item_id: ItemId,
        job_id: JobId,
        status: JobStatus,
    },
    Terminal {
        item_id: ItemId,
        job_id: JobId,
        status: JobStatus,
    },
}

impl JobEvent {
    pub fn item_id(&self) -> ItemId {
        match self {
            JobEvent::Progress { item_id, .. } | JobEvent::Terminal { item_id, .. } => *item_id,
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Progress { job_id, .. } | JobEvent::Terminal { job_id, .. } => *job_id,
        }
    }
}

type JobSlot = Arc<Mutex<Option<JobHandle>>>;

/// Starts, tracks and cancels transcode jobs.
pub struct TranscodeManager {
    ffmpeg: PathBuf,
    config: TranscodeConfig,
    output_dir: PathBuf,
    slots: DashMap<ItemId, JobSlot>,
    events: Option<mpsc::UnboundedSender<JobEvent>>,
}

impl TranscodeManager {
    pub fn new(ffmpeg: PathBuf, config: TranscodeConfig) -> Self {
        let output_dir = config.resolved_output_dir();
        Self {
            ffmpeg,
            config,
            output_dir,
            slots: DashMap::new(),
            events: None,
        }
    }

    /// Post job events to `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<JobEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Start a job for `request.item_id`, or return the item's job if one is
    /// still pending or running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_job(&self, request: JobRequest) -> JobHandle {
        // Clone the slot out so the map shard is not held while locking it.
        let slot = self.slots.entry(request.item_id).or_default().clone();
        let mut current = slot.lock();

        if let Some(existing) = current.as_ref() {
            if !existing.state().is_terminal() {
                tracing::debug!(
                    item_id = %request.item_id,
                    job_id = %existing.id(),
                    "job already active, reusing handle"
                );
                return existing.clone();
            }
        }

        let job_id = JobId::new();
        let output = self.output_dir.join(format!(
            "reelcast_pid{}_transcode_{}.mp4",
            std::process::id(),
            job_id
        ));
        let handle = JobHandle::new(job_id, request.item_id, output);
        *current = Some(handle.clone());

        tracing::info!(
            item_id = %request.item_id,
            job_id = %job_id,
            source = %request.source.display(),
            video = %request.plan.video_action,
            audio = %request.plan.audio_action,
            "starting transcode job"
        );
        tokio::spawn(run_job(
            handle.clone(),
            request,
            self.ffmpeg.clone(),
            self.config.clone(),
            self.events.clone(),
        ));
        handle
    }

    /// The item's most recent job, terminal or not.
    pub fn job(&self, item_id: ItemId) -> Option<JobHandle> {
        let slot = self.slots.get(&item_id)?.clone();
        let current = slot.lock();
        current.clone()
    }

    /// Request cancellation of the item's active job without waiting.
    pub fn cancel(&self, item_id: ItemId) -> Option<JobHandle> {
        let handle = self.job(item_id).filter(|h| !h.state().is_terminal())?;
        tracing::debug!(item_id = %item_id, job_id = %handle.id(), "cancelling job");
        handle.cancel();
        Some(handle)
    }

    /// Cancel the item's job, wait for teardown, delete its output and
    /// forget it.
    pub async fn discard(&self, item_id: ItemId) {
        if let Some(handle) = self.job(item_id) {
            self.discard_job(&handle).await;
        }
    }

    /// Like [`discard`](Self::discard), for one specific job. A newer job for
    /// the same item is left alone.
    pub async fn discard_job(&self, handle: &JobHandle) {
        handle.cancel_and_wait().await;
        remove_output(handle.output_path()).await;
        self.slots.remove_if(&handle.item_id(), |_, slot| {
            slot.lock().as_ref().map(JobHandle::id) == Some(handle.id())
        });
    }

    /// Discard every job.
    pub async fn shutdown(&self) {
        let items: Vec<ItemId> = self.slots.iter().map(|e| *e.key()).collect();
        if !items.is_empty() {
            tracing::info!(jobs = items.len(), "stopping transcode jobs");
        }
        futures::future::join_all(items.into_iter().map(|id| self.discard(id))).await;
    }
}

async fn run_job(
    handle: JobHandle,
    request: JobRequest,
    ffmpeg: PathBuf,
    config: TranscodeConfig,
    events: Option<mpsc::UnboundedSender<JobEvent>>,
) {
    let cancel = handle.cancel_token();
    let output = handle.output_path().to_path_buf();
    let emit = |status: JobStatus, terminal: bool| {
        let Some(ref tx) = events else { return };
        let (item_id, job_id) = (handle.item_id(), handle.id());
        let event = if terminal {
            JobEvent::Terminal {
                item_id,
                job_id,
                status,
            }
        } else {
            JobEvent::Progress {
                item_id,
                job_id,
                status,
            }
        };
        // The controller may already be gone during shutdown.
        let _ = tx.send(event);
    };

    let result = if cancel.is_cancelled() {
        Err(JobError::Cancelled)
    } else if let Err(e) = prepare_output_dir(&output).await {
        Err(JobError::ProcessStartFailed {
            tool: "ffmpeg".into(),
            message: format!("cannot create output directory: {e}"),
        })
    } else {
        handle.update(|s| s.state = JobState::Running);
        emit(handle.status(), false);

        let spec = request.plan.to_spec(&request.source, &output);
        rc_av::run_transcode(
            &ffmpeg,
            &spec,
            &config,
            |snapshot| {
                handle.update(|s| {
                    if let Some(fraction) = snapshot.fraction(request.duration) {
                        s.progress = s.progress.max(fraction);
                    }
                    s.out_time = s.out_time.max(snapshot.out_time);
                    s.written_bytes = s.written_bytes.max(snapshot.total_size);
                });
                emit(handle.status(), false);
            },
            cancel,
        )
        .await
    };

    match result {
        Ok(()) => {
            let size = tokio::fs::metadata(&output).await.map(|m| m.len()).unwrap_or(0);
            tracing::info!(job_id = %handle.id(), bytes = size, "transcode finished");
            handle.update(|s| {
                s.state = JobState::Succeeded;
                s.progress = 1.0;
                s.written_bytes = s.written_bytes.max(size);
            });
        }
        Err(JobError::Cancelled) => {
            remove_output(&output).await;
            tracing::info!(job_id = %handle.id(), "transcode cancelled");
            handle.update(|s| s.state = JobState::Cancelled);
        }
        Err(e) => {
            remove_output(&output).await;
            tracing::warn!(job_id = %handle.id(), "transcode failed: {e}");
            handle.update(|s| {
                s.state = JobState::Failed;
                s.error = Some(e);
            });
        }
    }
    emit(handle.status(), true);
}

async fn prepare_output_dir(output: &Path) -> std::io::Result<()> {
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => tokio::fs::create_dir_all(dir).await,
        _ => Ok(()),
    }
}

async fn remove_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed transcode output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to remove transcode output: {e}"),
    }
}
