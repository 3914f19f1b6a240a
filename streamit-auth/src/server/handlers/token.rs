use axum::{extract::State, Form, Json};
use chrono::Utc;

use crate::server::{
    error::ServerError,
    models::{TokenForm, TokenResponse},
    AppState,
};
use crate::DEVICE_CODE_GRANT_TYPE;

pub async fn exchange_token(
    State(state): State<AppState>,
    Form(form): Form<TokenForm>,
) -> Result<Json<TokenResponse>, ServerError> {
    match form.grant_type.as_deref() {
        Some(DEVICE_CODE_GRANT_TYPE) => {}
        Some(other) => return Err(ServerError::UnsupportedGrantType(other.to_string())),
        None => return Err(ServerError::InvalidRequest("Missing grant_type".to_string())),
    }

    let client_id = form
        .client_id
        .as_deref()
        .ok_or_else(|| ServerError::InvalidRequest("Missing client_id".to_string()))?;
    let device_code = form
        .device_code
        .as_deref()
        .ok_or_else(|| ServerError::InvalidRequest("Missing device_code".to_string()))?;

    state.issuer.authenticate_client(client_id)?;

    let now = Utc::now();
    let grant = state.grants.redeem(device_code, client_id, now)?;

    // Create span with user_code for the issuance logs
    let span = tracing::info_span!("exchange_token", user_code = %grant.user_code);
    let _enter = span.enter();

    let tokens = state.issuer.issue(&grant, now);
    state
        .grants
        .register_access_token(&tokens.access_token, tokens.expires_at);

    tracing::info!(expires_at = %tokens.expires_at, "Device grant redeemed, tokens issued");

    Ok(Json(TokenResponse::from(tokens)))
}
