//! What the streaming server may serve.
//!
//! The queue controller republishes the table after every state change. Only
//! the current item and its lookahead window are present, so a URL for any
//! other item resolves to nothing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use rc_core::ItemId;
use rc_parser::ParsedTitle;
use serde::Serialize;

use crate::transcoder::JobHandle;

/// Where an item's playable bytes come from.
#[derive(Debug, Clone)]
pub enum MediaSource {
    /// Not probed or planned yet.
    Pending,
    /// The source file itself, already playable by the receiver.
    Direct(PathBuf),
    /// A transcode job's output, possibly still growing.
    Job(JobHandle),
}

/// Display metadata for the receiver.
#[derive(Debug, Clone, Serialize)]
pub struct MediaMetadata {
    pub title: String,
    pub parsed: ParsedTitle,
    pub content_type: String,
    pub duration_secs: Option<f64>,
    pub thumbnail_url: Option<String>,
    pub subtitle_url: Option<String>,
}

/// One servable item.
#[derive(Debug, Clone)]
pub struct ServeEntry {
    pub item_id: ItemId,
    pub media: MediaSource,
    pub thumbnail: Option<PathBuf>,
    pub subtitle: Option<PathBuf>,
    pub metadata: MediaMetadata,
    pub is_current: bool,
}

/// Shared lookup table from item id to servable files.
#[derive(Debug, Clone, Default)]
pub struct ServeTable {
    inner: Arc<RwLock<HashMap<ItemId, ServeEntry>>>,
}

impl ServeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, item_id: ItemId) -> Option<ServeEntry> {
        self.inner.read().get(&item_id).cloned()
    }

    /// Replace the whole table.
    pub fn publish(&self, entries: impl IntoIterator<Item = ServeEntry>) {
        let table = entries.into_iter().map(|e| (e.item_id, e)).collect();
        *self.inner.write() = table;
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
