use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors rendered as OAuth error bodies: `{"error", "error_description"}`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown client")]
    InvalidClient,

    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("Authorization pending")]
    AuthorizationPending,

    #[error("Polling too fast")]
    SlowDown,

    #[error("Device code expired")]
    ExpiredToken,

    #[error("Access denied")]
    AccessDenied,

    #[error("Invalid access token")]
    InvalidToken,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// OAuth `error` code.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::InvalidClient => "invalid_client",
            ServerError::InvalidGrant(_) => "invalid_grant",
            ServerError::UnsupportedGrantType(_) => "unsupported_grant_type",
            ServerError::AuthorizationPending => "authorization_pending",
            ServerError::SlowDown => "slow_down",
            ServerError::ExpiredToken => "expired_token",
            ServerError::AccessDenied => "access_denied",
            ServerError::InvalidToken => "invalid_token",
            ServerError::NotFound(_) => "not_found",
            ServerError::Configuration(_) | ServerError::Internal(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) | ServerError::UnsupportedGrantType(_) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::InvalidClient | ServerError::InvalidToken => StatusCode::UNAUTHORIZED,
            ServerError::InvalidGrant(_)
            | ServerError::AuthorizationPending
            | ServerError::ExpiredToken
            | ServerError::AccessDenied => StatusCode::FORBIDDEN,
            ServerError::SlowDown => StatusCode::TOO_MANY_REQUESTS,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Configuration(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.code(),
            "error_description": self.to_string(),
        }));

        let mut response = (status, body).into_response();
        if self == ServerError::InvalidToken {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer error=\"invalid_token\""),
            );
        }
        response
    }
}

impl From<config::ConfigError> for ServerError {
    fn from(err: config::ConfigError) -> Self {
        ServerError::Configuration(err.to_string())
    }
}

impl From<url::ParseError> for ServerError {
    fn from(err: url::ParseError) -> Self {
        ServerError::Configuration(format!("Invalid public URL: {}", err))
    }
}
