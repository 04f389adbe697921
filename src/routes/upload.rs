use axum::extract::Multipart;
use axum::{Json, extract::State};

use crate::error::{AppResult, PipelineError};
use crate::models::{AppState, UploadResponse};

/// Process a menu photo: extract its dishes and return an image per dish.
///
/// Accepts a multipart form with a single field named `file`.
///
/// # Errors
///
/// Returns an error if no file is provided, the API key is missing and the
/// upload isn't cached, dish extraction fails, or no dishes are found.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    tracing::info!("upload request received");

    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?.to_vec();
            file = Some((filename, bytes));
            break;
        }
    }

    let Some((filename, bytes)) = file else {
        return Err(PipelineError::InputInvalid("No file provided".into()).into());
    };

    let response = state.pipeline.process(&filename, &bytes).await?;
    Ok(Json(response))
}
