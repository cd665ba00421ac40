//! Subtitle, thumbnail and metadata routes.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use rc_pipeline::MediaMetadata;

use crate::context::ServerContext;
use crate::error::ServerError;

async fn read_artifact(
    path: Option<PathBuf>,
    what: &str,
    item_id: &str,
) -> Result<Vec<u8>, ServerError> {
    let Some(path) = path else {
        return Err(ServerError::NotCurrent(format!("{what} for item {item_id}")));
    };
    match tokio::fs::read(&path).await {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ServerError::NotCurrent(format!("{what} for item {item_id}")))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /subtitle/{item_id}.vtt
pub async fn get_subtitle(
    State(ctx): State<ServerContext>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let item_id = file
        .strip_suffix(".vtt")
        .ok_or_else(|| ServerError::NotCurrent(file.clone()))?;
    let entry = super::lookup(&ctx, item_id)?;
    let data = read_artifact(entry.subtitle, "subtitle", item_id).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/vtt; charset=utf-8")],
        data,
    ))
}

/// GET /thumbnail/{item_id}.jpg
pub async fn get_thumbnail(
    State(ctx): State<ServerContext>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let item_id = file
        .strip_suffix(".jpg")
        .ok_or_else(|| ServerError::NotCurrent(file.clone()))?;
    let entry = super::lookup(&ctx, item_id)?;
    let data = read_artifact(entry.thumbnail, "thumbnail", item_id).await?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "image/jpeg")], data))
}

/// GET /metadata/{item_id}
pub async fn get_metadata(
    State(ctx): State<ServerContext>,
    Path(item_id): Path<String>,
) -> Result<Json<MediaMetadata>, ServerError> {
    let entry = super::lookup(&ctx, &item_id)?;
    Ok(Json(entry.metadata))
}
