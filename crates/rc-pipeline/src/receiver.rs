//! The playback target.
//!
//! A [`Receiver`] loads URLs from the streaming server and plays them. It
//! reports back through a [`PlaybackSink`] handed out by the queue
//! controller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rc_core::ItemId;
use tokio::sync::mpsc;

use crate::queue::ControllerEvent;

/// A device (or local player) that plays streaming URLs.
#[async_trait]
pub trait Receiver: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Load `url` for playback. `metadata_url` serves title and artwork.
    /// Completion is reported for `item_id`.
    async fn load(&self, item_id: ItemId, url: &str, metadata_url: &str) -> rc_core::Result<()>;

    async fn play(&self) -> rc_core::Result<()>;

    async fn pause(&self) -> rc_core::Result<()>;

    async fn seek(&self, position: Duration) -> rc_core::Result<()>;

    async fn stop(&self) -> rc_core::Result<()>;

    /// Current playback position, if the receiver knows it.
    async fn position(&self) -> Option<Duration> {
        None
    }
}

/// Where a receiver reports playback progress.
#[derive(Debug, Clone)]
pub struct PlaybackSink {
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl PlaybackSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self { tx }
    }

    /// The media loaded for `item_id` played to its end. Reports for an
    /// item that is no longer loaded are dropped by the controller.
    pub fn playback_complete(&self, item_id: ItemId) {
        let _ = self.tx.send(ControllerEvent::PlaybackComplete(item_id));
    }

    pub fn position(&self, position: Duration) {
        let _ = self.tx.send(ControllerEvent::Position(position));
    }
}

/// One call made on a [`RecordingReceiver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverCall {
    Load {
        item_id: ItemId,
        url: String,
        metadata_url: String,
    },
    Play,
    Pause,
    Seek(Duration),
    Stop,
}

/// Receiver that records calls and plays nothing. Used by tests and as the
/// fallback when no player is configured.
#[derive(Debug, Clone, Default)]
pub struct RecordingReceiver {
    calls: Arc<Mutex<Vec<ReceiverCall>>>,
}

impl RecordingReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ReceiverCall> {
        self.calls.lock().clone()
    }

    /// URLs passed to `load`, in order.
    pub fn loaded_urls(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                ReceiverCall::Load { url, .. } => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ReceiverCall) {
        tracing::debug!(?call, "receiver call");
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl Receiver for RecordingReceiver {
    fn name(&self) -> &str {
        "recording"
    }

    async fn load(&self, item_id: ItemId, url: &str, metadata_url: &str) -> rc_core::Result<()> {
        self.record(ReceiverCall::Load {
            item_id,
            url: url.to_string(),
            metadata_url: metadata_url.to_string(),
        });
        Ok(())
    }

    async fn play(&self) -> rc_core::Result<()> {
        self.record(ReceiverCall::Play);
        Ok(())
    }

    async fn pause(&self) -> rc_core::Result<()> {
        self.record(ReceiverCall::Pause);
        Ok(())
    }

    async fn seek(&self, position: Duration) -> rc_core::Result<()> {
        self.record(ReceiverCall::Seek(position));
        Ok(())
    }

    async fn stop(&self) -> rc_core::Result<()> {
        self.record(ReceiverCall::Stop);
        Ok(())
    }
}
