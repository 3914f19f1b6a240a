use axum::{extract::State, Form, Json};
use chrono::Utc;

use crate::server::{
    error::ServerError,
    models::{DeviceCodeForm, DeviceCodeResponse},
    AppState,
};

const DEFAULT_SCOPE: &str = "openid profile email";

pub async fn device_authorization(
    State(state): State<AppState>,
    Form(form): Form<DeviceCodeForm>,
) -> Result<Json<DeviceCodeResponse>, ServerError> {
    let client_id = form
        .client_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServerError::InvalidRequest("Missing client_id".to_string()))?;

    // Create span with client_id for all logs in this request
    let span = tracing::info_span!("device_authorization", client_id = %client_id);
    let _enter = span.enter();

    state.issuer.authenticate_client(client_id)?;
    state.issuer.check_audience(form.audience.as_deref())?;

    let scope = form.scope.as_deref().unwrap_or(DEFAULT_SCOPE);
    let now = Utc::now();
    let grant = state.grants.create(client_id, scope, now);

    tracing::info!(
        user_code = %grant.user_code,
        expires_in = grant.expires_in(now),
        "Issued device code"
    );

    Ok(Json(DeviceCodeResponse {
        verification_uri: state.issuer.verification_uri(),
        verification_uri_complete: state.issuer.verification_uri_complete(&grant.user_code),
        expires_in: grant.expires_in(now),
        interval: grant.interval,
        device_code: grant.device_code,
        user_code: grant.user_code,
    }))
}
