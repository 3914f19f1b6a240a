use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider returned HTTP {status}: {body}")]
    ProviderHttp { status: u16, body: String },

    #[error("Provider error {code}: {}", description.as_deref().unwrap_or("no description"))]
    Provider {
        code: String,
        description: Option<String>,
    },

    #[error("Device code expired. Please try again.")]
    DeviceCodeExpired,

    #[error("Access denied by user.")]
    UserDeniedAccess,

    #[error("Network error: {0}. Please check your internet connection and provider configuration.")]
    Network(String),

    #[error("Authentication cancelled")]
    Cancelled,

    #[error("Token storage error: {0}")]
    TokenStorage(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl AuthError {
    /// Whether the presenter should offer a fresh attempt for this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::DeviceCodeExpired | AuthError::Network(_))
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Json(err.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        AuthError::Io(err.to_string())
    }
}

impl From<config::ConfigError> for AuthError {
    fn from(err: config::ConfigError) -> Self {
        AuthError::Configuration(err.to_string())
    }
}
