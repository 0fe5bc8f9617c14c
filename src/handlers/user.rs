use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use super::{ApiJson, ApiResult};
use crate::middleware::AuthUser;
use crate::models::user::{ProfileUpdate, UserProfile};
use crate::services::AppState;

#[derive(Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: UserProfile,
    /// Present only when the username changed; the old token no longer works.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<Json<UserProfile>> {
    let account = state.auth.profile(user.username()).await?;
    Ok(Json(account.profile()))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> ApiResult<Json<ProfileResponse>> {
    let (account, token) = state
        .auth
        .update_profile(&user.0, update, &state.storage)
        .await?;
    Ok(Json(ProfileResponse {
        profile: account.profile(),
        token,
    }))
}
