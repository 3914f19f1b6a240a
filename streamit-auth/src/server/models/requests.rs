use serde::{Deserialize, Serialize};

use super::IssuedTokens;

// POST /oauth/device/code
//
// Fields are optional so a missing one is reported as an OAuth
// `invalid_request` instead of a form rejection.
#[derive(Debug, Deserialize)]
pub struct DeviceCodeForm {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_in: u64,
    pub interval: u64,
}

// POST /oauth/token
#[derive(Debug, Deserialize)]
pub struct TokenForm {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub device_code: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub scope: String,
}

impl From<IssuedTokens> for TokenResponse {
    fn from(tokens: IssuedTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            id_token: tokens.id_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            scope: tokens.scope,
        }
    }
}

// GET /userinfo
#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    pub sub: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

// GET /activate
#[derive(Debug, Deserialize)]
pub struct ActivateParams {
    #[serde(default)]
    pub user_code: Option<String>,
}

// POST /activate
#[derive(Debug, Deserialize)]
pub struct ActivateForm {
    pub user_code: String,
    pub action: ActivateAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivateAction {
    Approve,
    Deny,
}

// Health check
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_grants: usize,
}
