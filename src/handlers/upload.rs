use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;

use super::{ApiResult, AppError};
use crate::middleware::AuthUser;
use crate::models::file::UploadedFile;
use crate::services::AppState;

#[derive(Serialize)]
pub struct UploadResponse {
    pub ok: bool,
    pub files: Vec<String>,
}

/// `POST /api/upload`: multipart form with a `parent` text field and one or
/// more `files` (or `files[]`) parts.
///
/// The whole form is read before anything touches the disk, so the batch is
/// stored all together or not at all.
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut parent: Option<String> = None;
    let mut files = Vec::new();
    let mut bytes_received = 0usize;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "parent" => parent = Some(field.text().await?),
            "files" | "files[]" => {
                let name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::Validation("file part without a file name".to_string()))?;
                let data = field.bytes().await?;
                bytes_received += data.len();
                tracing::debug!(file = %name, bytes = data.len(), "upload part received");
                files.push(UploadedFile { name, data });
            }
            other => {
                return Err(AppError::Validation(format!("unexpected form field '{other}'")));
            }
        }
    }

    let parent = parent.ok_or_else(|| AppError::Validation("parent is required".to_string()))?;
    tracing::debug!(user = %user.username(), files = files.len(), bytes_received, "upload form read");

    let sandbox = state.storage.sandbox_for(user.username()).await?;
    let written = state.storage.upload(&sandbox, &parent, files).await?;

    Ok(Json(UploadResponse {
        ok: true,
        files: written
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
    }))
}
