use axum::{Extension, Json, extract::Multipart, extract::State};

use tripyy_types::api::{Claims, UploadResponse};

use crate::error::ApiError;
use crate::media::{MAX_IMAGE_BYTES, MediaError};
use crate::state::AppState;

const UPLOAD_FOLDER: &str = "tripyy";

pub async fn upload(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(format!("Malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::InvalidInput(format!("Failed to read file: {e}")))?;
            bytes = Some(data.to_vec());
            break;
        }
    }

    let bytes = bytes.ok_or_else(|| ApiError::InvalidInput("Missing 'file' field".into()))?;
    if bytes.is_empty() {
        return Err(ApiError::InvalidInput("Uploaded file is empty".into()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::InvalidInput("File exceeds the 10 MB limit".into()));
    }

    let uploaded = state
        .media
        .upload(bytes, UPLOAD_FOLDER)
        .await
        .map_err(|e| match e {
            MediaError::NotConfigured => {
                ApiError::ServiceUnavailable("Image uploads are not configured".into())
            }
            MediaError::UploadFailed(msg) => {
                ApiError::ServiceUnavailable(format!("Image upload failed: {msg}"))
            }
        })?;

    Ok(Json(UploadResponse {
        url: uploaded.url,
        public_id: uploaded.public_id,
    }))
}
