pub mod auth;
pub mod files;
pub mod health;
pub mod upload;
pub mod user;

use axum::{
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::repository::StoreError;
use crate::services::auth::AuthError;
use crate::services::storage::StorageError;
use crate::storage::SandboxError;

/// Error returned by every API route, rendered as `{error, kind}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("path is outside of your storage")]
    PathEscape,
    #[error("the storage root cannot be deleted or renamed")]
    RootProtected,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    QuotaExceeded(String),
    #[error("{0}")]
    Validation(String),
    #[error("authentication required")]
    AuthRequired,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Io(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::PathEscape => "path_escape",
            AppError::RootProtected => "root_protected",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::QuotaExceeded(_) => "quota_exceeded",
            AppError::Validation(_) => "validation",
            AppError::AuthRequired => "auth_required",
            AppError::InvalidToken => "invalid_token",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::Forbidden(_) => "forbidden",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::Io(_) => "io",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::PathEscape
            | AppError::RootProtected
            | AppError::QuotaExceeded(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::AuthRequired | AppError::InvalidToken | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Io(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
            match &self {
                AppError::Io(_) => "filesystem operation failed".to_string(),
                _ => "internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        (
            status,
            Json(json!({
                "error": message,
                "kind": self.kind(),
            })),
        )
            .into_response()
    }
}

impl From<SandboxError> for AppError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::PathEscape => AppError::PathEscape,
            SandboxError::RootProtected => AppError::RootProtected,
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Sandbox(e) => e.into(),
            StorageError::NotFound(_) => AppError::NotFound(err.to_string()),
            StorageError::AlreadyExists(_) => AppError::AlreadyExists(err.to_string()),
            StorageError::QuotaExceeded { .. } => AppError::QuotaExceeded(err.to_string()),
            StorageError::Validation(_)
            | StorageError::NotAFile(_)
            | StorageError::NotADirectory(_)
            | StorageError::InvalidEncoding(_) => AppError::Validation(err.to_string()),
            StorageError::Io(_) | StorageError::Archive(_) | StorageError::Task(_) => {
                AppError::Io(err.to_string())
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => AppError::AlreadyExists(err.to_string()),
            StoreError::NotFound(_) => AppError::NotFound(err.to_string()),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::AuthRequired => AppError::AuthRequired,
            AuthError::InvalidToken => AppError::InvalidToken,
            AuthError::RegistrationDisabled => AppError::Forbidden(err.to_string()),
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Conflict(_) => AppError::AlreadyExists(err.to_string()),
            AuthError::NotFound(_) => AppError::NotFound(err.to_string()),
            AuthError::Store(e) => e.into(),
            AuthError::Storage(e) => e.into(),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge(rejection.body_text());
        }
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge(err.body_text());
        }
        AppError::Validation(err.body_text())
    }
}

/// `Json` whose rejections come back as `validation` errors.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `Query` whose rejections come back as `validation` errors.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

pub type ApiResult<T> = Result<T, AppError>;
