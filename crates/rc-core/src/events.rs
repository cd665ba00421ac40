//! UI notification channel.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! history. Every event carries a sequence number, so a subscriber that
//! lagged or attached late asks for [`EventBus::since`] the last number it
//! saw. The queue controller is the only publisher; events are immutable
//! values and never carry references into controller state.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;

use crate::ids::{ItemId, JobId};
use crate::media::{ItemState, JobState};

/// Events kept for catch-up.
pub const HISTORY_LEN: usize = 100;

// ---------------------------------------------------------------------------
// EventCategory
// ---------------------------------------------------------------------------

/// Which UI surface an event is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// State changes reflected in the queue view.
    Status,
    /// User-visible errors that need acknowledgement.
    Error,
}

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // -- Queue ---------------------------------------------------------------
    ItemAdded {
        item_id: ItemId,
        name: String,
    },
    ItemRemoved {
        item_id: ItemId,
    },
    ItemStateChanged {
        item_id: ItemId,
        state: ItemState,
    },
    QueueReordered,
    CurrentChanged {
        index: Option<usize>,
    },

    // -- Jobs ----------------------------------------------------------------
    JobStarted {
        item_id: ItemId,
        job_id: JobId,
    },
    JobProgress {
        item_id: ItemId,
        job_id: JobId,
        progress: f32,
        written_bytes: u64,
    },
    JobFinished {
        item_id: ItemId,
        job_id: JobId,
        state: JobState,
    },

    // -- Playback ------------------------------------------------------------
    /// Waiting for the current item's transcode before playback can start.
    Preparing {
        item_id: ItemId,
    },
    PlaybackStarted {
        item_id: ItemId,
        url: String,
    },
    PlaybackPosition {
        item_id: ItemId,
        position_secs: f64,
    },
    QueueFinished,

    // -- Errors --------------------------------------------------------------
    ItemError {
        item_id: ItemId,
        message: String,
    },
}

impl EventPayload {
    /// The queue item an event is about, if any.
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            EventPayload::ItemAdded { item_id, .. }
            | EventPayload::ItemRemoved { item_id }
            | EventPayload::ItemStateChanged { item_id, .. }
            | EventPayload::JobStarted { item_id, .. }
            | EventPayload::JobProgress { item_id, .. }
            | EventPayload::JobFinished { item_id, .. }
            | EventPayload::Preparing { item_id }
            | EventPayload::PlaybackStarted { item_id, .. }
            | EventPayload::PlaybackPosition { item_id, .. }
            | EventPayload::ItemError { item_id, .. } => Some(*item_id),
            EventPayload::QueueReordered
            | EventPayload::CurrentChanged { .. }
            | EventPayload::QueueFinished => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Publication order on one bus, starting at 1.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    pub payload: EventPayload,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

struct History {
    last_seq: u64,
    events: VecDeque<Event>,
}

pub struct EventBus {
    tx: broadcast::Sender<Event>,
    history: Mutex<History>,
}

impl EventBus {
    /// `capacity` bounds the broadcast buffer; the history always keeps
    /// [`HISTORY_LEN`] events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            history: Mutex::new(History {
                last_seq: 0,
                events: VecDeque::with_capacity(HISTORY_LEN),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, category: EventCategory, payload: EventPayload) {
        let mut history = self.history.lock();
        history.last_seq += 1;
        let event = Event {
            seq: history.last_seq,
            timestamp: Utc::now(),
            category,
            payload,
        };
        if history.events.len() == HISTORY_LEN {
            history.events.pop_front();
        }
        history.events.push_back(event.clone());
        // Sent under the lock so subscribers see sequence order.
        let _ = self.tx.send(event);
    }

    pub fn status(&self, payload: EventPayload) {
        self.publish(EventCategory::Status, payload);
    }

    pub fn error(&self, payload: EventPayload) {
        self.publish(EventCategory::Error, payload);
    }

    /// Up to `n` of the latest events, newest first.
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        self.history.lock().events.iter().rev().take(n).cloned().collect()
    }

    /// Retained events published after `seq`, oldest first.
    pub fn since(&self, seq: u64) -> Vec<Event> {
        self.history
            .lock()
            .events
            .iter()
            .filter(|e| e.seq > seq)
            .cloned()
            .collect()
    }

    /// Retained events about one item, oldest first.
    pub fn item_history(&self, item_id: ItemId) -> Vec<Event> {
        self.history
            .lock()
            .events
            .iter()
            .filter(|e| e.payload.item_id() == Some(item_id))
            .cloned()
            .collect()
    }

    pub fn last_seq(&self) -> u64 {
        self.history.lock().last_seq
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
