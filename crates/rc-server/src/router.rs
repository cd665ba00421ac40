//! Axum router construction.

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::ServerContext;
use crate::routes;

/// Build the streaming router.
pub fn build_router(ctx: ServerContext) -> Router {
    // Receivers fetch cross-origin from their own web runtime.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/media/{item_id}", get(routes::media::get_media))
        .route("/subtitle/{file}", get(routes::assets::get_subtitle))
        .route("/thumbnail/{file}", get(routes::assets::get_thumbnail))
        .route("/metadata/{item_id}", get(routes::assets::get_metadata))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
