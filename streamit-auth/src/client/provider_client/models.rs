use serde::{Deserialize, Serialize};

pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

// POST /oauth/device/code
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCodeRequest {
    pub client_id: String,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub interval: Option<u64>,
}

// POST /oauth/token
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    pub grant_type: &'a str,
    pub device_code: &'a str,
    pub client_id: &'a str,
}

/// Raw token endpoint body; either the token fields or `error` are set.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenEndpointBody {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub access_token: String,
    pub id_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
}

/// Outcome of one token exchange attempt as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenExchange {
    Granted(TokenPayload),
    Rejected {
        error: String,
        error_description: Option<String>,
    },
}

impl TokenExchange {
    pub fn pending() -> Self {
        Self::rejected("authorization_pending")
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self::Rejected {
            error: error.into(),
            error_description: None,
        }
    }

    pub fn granted(access_token: impl Into<String>, id_token: impl Into<String>) -> Self {
        Self::Granted(TokenPayload {
            access_token: access_token.into(),
            id_token: Some(id_token.into()),
            token_type: Some("Bearer".to_string()),
            expires_in: None,
            scope: None,
        })
    }
}

// GET /userinfo
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}
