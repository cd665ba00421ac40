//! Queue items and the read-only snapshots handed to callers.

use std::path::PathBuf;
use std::sync::Arc;

use rc_core::{ItemId, ItemState};
use rc_probe::{MediaInfo, StreamInfo};
use serde::Serialize;

use crate::planner::{SubtitleSelection, TranscodePlan};
use crate::transcoder::JobHandle;

/// One queued file, owned by the controller task.
#[derive(Debug)]
pub(crate) struct QueueItem {
    pub id: ItemId,
    pub path: PathBuf,
    pub name: String,
    pub state: ItemState,
    pub info: Option<Arc<MediaInfo>>,
    pub audio: Option<u32>,
    pub subtitle: SubtitleSelection,
    pub plan: Option<TranscodePlan>,
    pub job: Option<JobHandle>,
    pub error: Option<String>,
    /// The job failed while the item was only being prefetched; it is
    /// restarted once the item becomes current.
    pub failed_in_prefetch: bool,
    pub thumbnail: Option<PathBuf>,
    pub subtitle_vtt: Option<PathBuf>,
}

impl QueueItem {
    pub fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            id: ItemId::new(),
            path,
            name,
            state: ItemState::Queued,
            info: None,
            audio: None,
            subtitle: SubtitleSelection::None,
            plan: None,
            job: None,
            error: None,
            failed_in_prefetch: false,
            thumbnail: None,
            subtitle_vtt: None,
        }
    }

    /// Servable without waiting: direct play, or a finished job.
    pub fn is_complete(&self) -> bool {
        match (&self.plan, &self.job) {
            (Some(plan), _) if !plan.requires_job() => true,
            (_, Some(job)) => job.state().is_terminal(),
            _ => false,
        }
    }

    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            path: self.path.clone(),
            name: self.name.clone(),
            state: self.state,
            progress: self.job.as_ref().map(|j| j.status().progress),
            streams: self
                .info
                .as_ref()
                .map(|i| i.streams.clone())
                .unwrap_or_default(),
            audio: self.audio,
            subtitle: self.subtitle.clone(),
            plan: self.plan.clone(),
            error: self.error.clone(),
        }
    }
}

/// Read-only view of one item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSnapshot {
    pub id: ItemId,
    pub path: PathBuf,
    pub name: String,
    pub state: ItemState,
    pub progress: Option<f32>,
    pub streams: Vec<StreamInfo>,
    pub audio: Option<u32>,
    pub subtitle: SubtitleSelection,
    pub plan: Option<TranscodePlan>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing,
    Paused,
}

/// What the receiver is doing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaybackSnapshot {
    pub item_id: Option<ItemId>,
    pub status: PlaybackStatus,
    pub position_secs: Option<f64>,
}

/// Read-only view of the whole queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub items: Vec<ItemSnapshot>,
    /// Index of the current item. Only set once that item is probed.
    pub current: Option<usize>,
    /// Index of the item playback is moving to, probed or not.
    pub selected: Option<usize>,
    pub playback: PlaybackSnapshot,
}

impl QueueSnapshot {
    /// Index following the current item, if any.
    pub fn next_index(&self) -> Option<usize> {
        self.current
            .map(|c| c + 1)
            .filter(|&n| n < self.items.len())
    }
}
