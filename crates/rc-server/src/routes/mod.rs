//! Route handlers for the streaming surface.

pub mod assets;
pub mod media;

use rc_core::ItemId;
use rc_pipeline::ServeEntry;

use crate::context::ServerContext;
use crate::error::ServerError;

/// Resolve an item id from a URL against the serve table.
///
/// Unparseable ids and ids outside the window both map to
/// [`ServerError::NotCurrent`]; the receiver cannot tell them apart.
pub(crate) fn lookup(ctx: &ServerContext, raw: &str) -> Result<ServeEntry, ServerError> {
    raw.parse::<ItemId>()
        .ok()
        .and_then(|id| ctx.serve.get(id))
        .ok_or_else(|| ServerError::NotCurrent(format!("item {raw}")))
}
