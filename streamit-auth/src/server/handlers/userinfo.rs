use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use chrono::Utc;

use crate::server::{error::ServerError, models::UserInfoResponse, AppState};

pub async fn user_info(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserInfoResponse>, ServerError> {
    let access_token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ServerError::InvalidToken)?;

    if !state.grants.access_token_valid(access_token, Utc::now()) {
        tracing::debug!("Rejected unknown or expired access token");
        return Err(ServerError::InvalidToken);
    }

    Ok(Json(state.issuer.user_info()))
}
