//! Handle for communicating with the queue controller actor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rc_core::{Error, ItemId, Result};
use tokio::sync::{mpsc, oneshot};

use super::commands::{ControllerEvent, QueueCommand};
use super::state::QueueSnapshot;
use crate::planner::{SubtitleSelection, TranscodePlan};
use crate::receiver::{PlaybackSink, Receiver};

/// Cloneable async API over the queue controller.
///
/// Every call is a message to the controller task; calls fail with
/// [`Error::Shutdown`] once the controller has stopped.
#[derive(Clone)]
pub struct QueueHandle {
    sender: mpsc::Sender<QueueCommand>,
    events: mpsc::UnboundedSender<ControllerEvent>,
}

impl QueueHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<QueueCommand>,
        events: mpsc::UnboundedSender<ControllerEvent>,
    ) -> Self {
        Self { sender, events }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> QueueCommand) -> Result<T> {
        let (responder, rx) = oneshot::channel();
        self.sender
            .send(build(responder))
            .await
            .map_err(|_| Error::Shutdown)?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    /// Append files to the queue. Returns the new item ids in order.
    pub async fn add_files(&self, paths: Vec<PathBuf>) -> Result<Vec<ItemId>> {
        self.request(|responder| QueueCommand::AddFiles { paths, responder })
            .await
    }

    /// Make `index` the current item and start playback once it is ready.
    ///
    /// # Errors
    /// - `Error::NotFound` - index out of range
    pub async fn set_current(&self, index: usize) -> Result<()> {
        self.request(|responder| QueueCommand::SetCurrent { index, responder })
            .await?
    }

    /// Remove an item, cancelling its job and waiting for teardown.
    pub async fn remove(&self, index: usize) -> Result<()> {
        self.request(|responder| QueueCommand::Remove { index, responder })
            .await?
    }

    /// Move the item at `from` to `to`.
    pub async fn reorder(&self, from: usize, to: usize) -> Result<()> {
        self.request(|responder| QueueCommand::Reorder {
            from,
            to,
            responder,
        })
        .await?
    }

    /// Re-probe or re-transcode an item in the error state.
    pub async fn retry(&self, index: usize) -> Result<()> {
        self.request(|responder| QueueCommand::Retry { index, responder })
            .await?
    }

    /// Abandon the current item and move to the next one.
    pub async fn skip(&self) -> Result<()> {
        self.request(|responder| QueueCommand::Skip { responder }).await?
    }

    /// Choose the audio stream and subtitle track for an item.
    ///
    /// Returns the new plan when the item is already probed.
    ///
    /// # Errors
    /// - `Error::NotFound` - index out of range
    /// - `Error::Plan` - the selection does not match the probed streams
    pub async fn select_streams(
        &self,
        index: usize,
        audio: Option<u32>,
        subtitle: SubtitleSelection,
    ) -> Result<Option<TranscodePlan>> {
        self.request(|responder| QueueCommand::SelectStreams {
            index,
            audio,
            subtitle,
            responder,
        })
        .await?
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|responder| QueueCommand::Pause { responder })
            .await?
    }

    /// Resume paused playback, or start the current item.
    pub async fn resume(&self) -> Result<()> {
        self.request(|responder| QueueCommand::Resume { responder })
            .await?
    }

    pub async fn seek(&self, position: Duration) -> Result<()> {
        self.request(|responder| QueueCommand::Seek {
            position,
            responder,
        })
        .await?
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|responder| QueueCommand::Stop { responder }).await?
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot> {
        self.request(|responder| QueueCommand::Snapshot { responder })
            .await
    }

    /// Set the playback target. Until one is attached, items are prepared
    /// but never played.
    pub async fn attach_receiver(&self, receiver: Arc<dyn Receiver>) -> Result<()> {
        self.request(|responder| QueueCommand::AttachReceiver {
            receiver,
            responder,
        })
        .await
    }

    /// Stop playback, cancel all jobs and remove temporary files.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|responder| QueueCommand::Shutdown { responder })
            .await
    }

    /// Sink through which a receiver reports playback progress.
    pub fn playback_sink(&self) -> PlaybackSink {
        PlaybackSink::new(self.events.clone())
    }
}
