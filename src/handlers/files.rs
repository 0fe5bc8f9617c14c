use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use super::{ApiJson, ApiQuery, ApiResult, AppError};
use crate::middleware::AuthUser;
use crate::models::file::{FileSystemEntry, StorageUsage};
use crate::services::storage::Download;
use crate::services::AppState;

#[derive(Deserialize)]
pub struct PathQuery {
    pub path: String,
}

impl PathQuery {
    fn required(&self) -> ApiResult<&str> {
        if self.path.trim().is_empty() {
            return Err(AppError::Validation("path must not be empty".to_string()));
        }
        Ok(&self.path)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteFileRequest {
    pub path: String,
    pub content: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateEntryRequest {
    pub parent: String,
    pub name: String,
    #[serde(default)]
    pub is_directory: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RenameRequest {
    pub path: String,
    pub new_name: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveRequest {
    pub path: String,
    pub target: String,
}

#[derive(Serialize)]
pub struct OkResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl OkResponse {
    fn done() -> Json<Self> {
        Json(Self { ok: true, path: None })
    }

    fn at(path: &Path) -> Json<Self> {
        Json(Self {
            ok: true,
            path: Some(path.to_string_lossy().into_owned()),
        })
    }
}

pub async fn tree(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<Vec<FileSystemEntry>>> {
    let sandbox = state.storage.sandbox_for(user.username()).await?;
    let root = state.storage.list_tree(&sandbox).await?;
    Ok(Json(vec![root]))
}

pub async fn usage(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<StorageUsage>> {
    let sandbox = state.storage.sandbox_for(user.username()).await?;
    Ok(Json(state.storage.usage(&sandbox).await?))
}

pub async fn read_file(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<PathQuery>,
) -> ApiResult<Response> {
    let sandbox = state.storage.sandbox_for(user.username()).await?;
    let content = state.storage.read_text(&sandbox, query.required()?).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        content,
    )
        .into_response())
}

pub async fn write_file(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<WriteFileRequest>,
) -> ApiResult<Json<OkResponse>> {
    let sandbox = state.storage.sandbox_for(user.username()).await?;
    state
        .storage
        .write_text(&sandbox, &req.path, &req.content)
        .await?;
    Ok(OkResponse::done())
}

pub async fn create_entry(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateEntryRequest>,
) -> ApiResult<Json<OkResponse>> {
    let sandbox = state.storage.sandbox_for(user.username()).await?;
    let created = state
        .storage
        .create_entry(&sandbox, &req.parent, &req.name, req.is_directory)
        .await?;
    Ok(OkResponse::at(&created))
}

pub async fn rename_entry(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<RenameRequest>,
) -> ApiResult<Json<OkResponse>> {
    let sandbox = state.storage.sandbox_for(user.username()).await?;
    let renamed = state
        .storage
        .rename(&sandbox, &req.path, &req.new_name)
        .await?;
    Ok(OkResponse::at(&renamed))
}

pub async fn delete_entry(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<PathQuery>,
) -> ApiResult<Json<OkResponse>> {
    let sandbox = state.storage.sandbox_for(user.username()).await?;
    state.storage.delete(&sandbox, query.required()?).await?;
    Ok(OkResponse::done())
}

pub async fn move_entry(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<MoveRequest>,
) -> ApiResult<Json<OkResponse>> {
    let sandbox = state.storage.sandbox_for(user.username()).await?;
    let moved = state
        .storage
        .move_entry(&sandbox, &req.path, &req.target)
        .await?;
    Ok(OkResponse::at(&moved))
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<PathQuery>,
) -> ApiResult<Response> {
    let sandbox = state.storage.sandbox_for(user.username()).await?;
    let (file, name, content_type, len) = match state.storage.download(&sandbox, query.required()?).await? {
        Download::File { file, name, len } => (file, name, "application/octet-stream", Some(len)),
        Download::Archive { file, name } => (file, name, "application/zip", None),
    };

    let disposition = HeaderValue::from_str(&content_disposition(&name))
        .map_err(|e| AppError::Internal(format!("invalid download name: {e}")))?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    if let Some(len) = len {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    Ok(response)
}

/// `attachment` disposition with an ASCII fallback name and the exact
/// name as RFC 5987 `filename*`.
pub fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
