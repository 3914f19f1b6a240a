pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

pub use config::Configuration;
pub use error::ServerError;

use axum::{
    routing::{get, post},
    Router,
};
use services::{GrantStore, TokenIssuer};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// OAuth forms are tiny; anything larger is rejected before parsing.
const MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub grants: Arc<GrantStore>,
    pub issuer: Arc<TokenIssuer>,
}

impl AppState {
    pub fn new(configuration: &Configuration) -> Result<Self, ServerError> {
        Ok(Self {
            grants: Arc::new(GrantStore::new(
                configuration.server.grant_ttl_seconds,
                configuration.server.poll_interval_seconds,
            )),
            issuer: Arc::new(TokenIssuer::new(configuration)?),
        })
    }
}

/// Routes of the development device-authorization provider.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/oauth/device/code", post(handlers::device_authorization))
        .route("/oauth/token", post(handlers::exchange_token))
        .route("/userinfo", get(handlers::user_info))
        .route(
            "/activate",
            get(handlers::activate_page).post(handlers::submit_activation),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}
