mod activate;
mod device_code;
mod token;
mod userinfo;

pub use activate::{activate_page, submit_activation};
pub use device_code::device_authorization;
pub use token::exchange_token;
pub use userinfo::user_info;

use crate::server::{models::HealthResponse, AppState};
use axum::{extract::State, Json};

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_grants: state.grants.grant_count(),
    })
}
