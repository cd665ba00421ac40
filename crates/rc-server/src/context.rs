//! Shared state for the streaming routes.

use std::sync::Arc;

use rc_core::config::StreamingConfig;
use rc_pipeline::ServeTable;

/// State handed to every handler through axum's `State` extractor.
///
/// The serve table is owned by the queue controller; the server only reads
/// it, so a URL stops resolving as soon as its item leaves the window.
#[derive(Clone)]
pub struct ServerContext {
    pub serve: ServeTable,
    pub streaming: Arc<StreamingConfig>,
}

impl ServerContext {
    pub fn new(serve: ServeTable, streaming: StreamingConfig) -> Self {
        Self {
            serve,
            streaming: Arc::new(streaming),
        }
    }
}
