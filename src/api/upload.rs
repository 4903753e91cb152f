use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::auth::AdminUser;
use super::error::ApiError;
use crate::media::{ImageUpload, UploadedImage};
use crate::AppState;

fn multipart_error(err: MultipartError, max_bytes: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_bytes)
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}

fn too_large(max_bytes: usize) -> ApiError {
    ApiError::payload_too_large(format!(
        "File exceeds the {} MB upload limit",
        max_bytes / (1024 * 1024)
    ))
}

/// Accept a `file` field (and optional `filename` override) and forward it to the image host
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    mut multipart: Multipart,
) -> Result<Json<UploadedImage>, ApiError> {
    let max_bytes = state.config.media.max_upload_bytes;
    let mut file: Option<ImageUpload> = None;
    let mut filename_override: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, max_bytes))?;
                file = Some(ImageUpload {
                    data: data.to_vec(),
                    filename,
                    content_type,
                });
            }
            Some("filename") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, max_bytes))?;
                let value = value.trim();
                if !value.is_empty() {
                    filename_override = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    let mut file = file
        .filter(|f| !f.data.is_empty())
        .ok_or_else(|| ApiError::bad_request("No file provided"))?;
    if file.data.len() > max_bytes {
        return Err(too_large(max_bytes));
    }
    if let Some(name) = filename_override {
        file.filename = name;
    }

    tracing::info!(
        admin_id = %admin.id,
        filename = %file.filename,
        bytes = file.data.len(),
        "Uploading image"
    );

    let uploaded = state.image_host.upload(file).await?;
    Ok(Json(uploaded))
}
