use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::{ApiJson, ApiResult};
use crate::middleware::AuthUser;
use crate::services::auth::Session;
use crate::services::AppState;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub token: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

#[derive(Serialize)]
pub struct SessionUser {
    pub username: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub user: SessionUser,
    pub token: String,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            user: SessionUser {
                username: session.username,
            },
            token: session.token,
        }
    }
}

#[derive(Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

const ACK: AckResponse = AckResponse { ok: true };

pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let session = state.auth.login(&req.username, &req.password).await?;
    Ok(Json(session.into()))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let session = state
        .auth
        .register(&req.username, &req.password, req.email)
        .await?;
    // Create the home directory right away so the first tree request finds it.
    state.storage.sandbox_for(&session.username).await?;
    Ok(Json(session.into()))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<AckResponse>> {
    state.auth.logout(&user.0).await?;
    Ok(Json(ACK))
}

pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ForgotPasswordRequest>,
) -> ApiResult<Json<AckResponse>> {
    state.auth.forgot_password(&req.email).await?;
    Ok(Json(ACK))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Json<AckResponse>> {
    state
        .auth
        .reset_password(&req.token, &req.new_password)
        .await?;
    Ok(Json(ACK))
}
