//! The queue controller.
//!
//! A single task owns the queue. Callers talk to it through a cloneable
//! [`QueueHandle`]; transcode workers, probes and the receiver report back
//! over channels, so every state change happens on the controller task.

mod commands;
mod controller;
mod handle;
mod state;

pub(crate) use commands::ControllerEvent;
pub use controller::{spawn_queue_controller, ControllerSettings};
pub use handle::QueueHandle;
pub use state::{ItemSnapshot, PlaybackSnapshot, PlaybackStatus, QueueSnapshot};
