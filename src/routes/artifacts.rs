use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, Response, StatusCode, header},
};
use std::path::Path as FsPath;

use crate::error::AppResult;
use crate::models::AppState;
use crate::naming::is_safe_filename;

/// Serves a dish image from the output directory.
///
/// # Errors
///
/// 404 if the name is unsafe or no such file exists.
pub async fn dish_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<Response<Body>> {
    serve_file(&state.config.output_dir, &filename).await
}

/// Serves an original upload from the upload directory.
///
/// # Errors
///
/// 404 if the name is unsafe or no such file exists.
pub async fn original_upload(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<Response<Body>> {
    serve_file(&state.config.upload_dir, &filename).await
}

async fn serve_file(root: &FsPath, filename: &str) -> AppResult<Response<Body>> {
    if !is_safe_filename(filename) {
        tracing::warn!(%filename, "rejected unsafe artifact name");
        return Err(StatusCode::NOT_FOUND.into());
    }

    let bytes = match tokio::fs::read(root.join(filename)).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StatusCode::NOT_FOUND.into());
        }
        Err(e) => return Err(e.into()),
    };

    let mime = mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string();

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&mime)
                .unwrap_or(HeaderValue::from_static("application/octet-stream")),
        )
        .body(Body::from(bytes))
        .map_err(|e| anyhow::anyhow!(e).into())
}
