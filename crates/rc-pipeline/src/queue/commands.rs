//! Messages for the queue controller actor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rc_core::{ItemId, ProbeError, Result};
use rc_probe::MediaInfo;
use tokio::sync::oneshot;

use super::state::QueueSnapshot;
use crate::planner::{SubtitleSelection, TranscodePlan};
use crate::receiver::Receiver;

/// Requests from [`QueueHandle`](super::QueueHandle), each carrying a
/// responder for the result.
pub(crate) enum QueueCommand {
    AddFiles {
        paths: Vec<PathBuf>,
        responder: oneshot::Sender<Vec<ItemId>>,
    },
    SetCurrent {
        index: usize,
        responder: oneshot::Sender<Result<()>>,
    },
    Remove {
        index: usize,
        responder: oneshot::Sender<Result<()>>,
    },
    Reorder {
        from: usize,
        to: usize,
        responder: oneshot::Sender<Result<()>>,
    },
    Retry {
        index: usize,
        responder: oneshot::Sender<Result<()>>,
    },
    Skip {
        responder: oneshot::Sender<Result<()>>,
    },
    SelectStreams {
        index: usize,
        audio: Option<u32>,
        subtitle: SubtitleSelection,
        responder: oneshot::Sender<Result<Option<TranscodePlan>>>,
    },
    Pause {
        responder: oneshot::Sender<Result<()>>,
    },
    Resume {
        responder: oneshot::Sender<Result<()>>,
    },
    Seek {
        position: Duration,
        responder: oneshot::Sender<Result<()>>,
    },
    Stop {
        responder: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        responder: oneshot::Sender<QueueSnapshot>,
    },
    AttachReceiver {
        receiver: Arc<dyn Receiver>,
        responder: oneshot::Sender<()>,
    },
    Shutdown {
        responder: oneshot::Sender<()>,
    },
}

/// Completions posted back to the controller by its own background tasks and
/// by the receiver.
#[derive(Debug)]
pub(crate) enum ControllerEvent {
    ProbeCompleted {
        item_id: ItemId,
        result: std::result::Result<MediaInfo, ProbeError>,
    },
    ThumbnailReady {
        item_id: ItemId,
        path: Option<PathBuf>,
    },
    SubtitleReady {
        item_id: ItemId,
        selection: SubtitleSelection,
        path: Option<PathBuf>,
    },
    /// The receiver finished this item.
    PlaybackComplete(ItemId),
    Position(Duration),
}
