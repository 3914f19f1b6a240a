mod models;

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::error::AuthError;
pub use models::{
    DeviceCodeRequest, DeviceCodeResponse, TokenExchange, TokenPayload, UserInfo,
    DEVICE_CODE_GRANT_TYPE,
};
use models::{TokenEndpointBody, TokenRequest};

/// Endpoints of an OAuth provider that supports the device authorization grant.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn request_device_code(
        &self,
        request: &DeviceCodeRequest,
    ) -> Result<DeviceCodeResponse, AuthError>;

    async fn exchange_device_code(
        &self,
        device_code: &str,
        client_id: &str,
    ) -> Result<TokenExchange, AuthError>;

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo, AuthError>;
}

pub struct ProviderClient {
    http_client: Client,
    base_url: String,
}

impl ProviderClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AuthProvider for ProviderClient {
    async fn request_device_code(
        &self,
        request: &DeviceCodeRequest,
    ) -> Result<DeviceCodeResponse, AuthError> {
        let url = format!("{}/oauth/device/code", self.base_url);
        tracing::debug!(url = %url, scope = %request.scope, "Requesting device code");

        let resp = self.http_client.post(&url).form(request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "Device code request rejected");
            return Err(AuthError::ProviderHttp {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json::<DeviceCodeResponse>().await?)
    }

    async fn exchange_device_code(
        &self,
        device_code: &str,
        client_id: &str,
    ) -> Result<TokenExchange, AuthError> {
        let url = format!("{}/oauth/token", self.base_url);
        let req = TokenRequest {
            grant_type: DEVICE_CODE_GRANT_TYPE,
            device_code,
            client_id,
        };

        let resp = self.http_client.post(&url).form(&req).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        parse_token_body(status, &body)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo, AuthError> {
        let url = format!("{}/userinfo", self.base_url);

        let resp = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::ProviderHttp {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json::<UserInfo>().await?)
    }
}

/// Classify a token endpoint response by its body.
///
/// Providers answer pending polls with a 4xx status and an OAuth error body,
/// so the status code only matters when the body carries neither a token nor
/// an `error`.
pub(crate) fn parse_token_body(status: u16, body: &str) -> Result<TokenExchange, AuthError> {
    let is_success = (200..300).contains(&status);

    let parsed: TokenEndpointBody = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) if !is_success => {
            return Err(AuthError::ProviderHttp {
                status,
                body: body.to_string(),
            })
        }
        Err(e) => return Err(AuthError::Network(format!("Invalid token response: {}", e))),
    };

    if let Some(error) = parsed.error {
        return Ok(TokenExchange::Rejected {
            error,
            error_description: parsed.error_description,
        });
    }

    match parsed.access_token {
        Some(access_token) => Ok(TokenExchange::Granted(TokenPayload {
            access_token,
            id_token: parsed.id_token,
            token_type: parsed.token_type,
            expires_in: parsed.expires_in,
            scope: parsed.scope,
        })),
        None if !is_success => Err(AuthError::ProviderHttp {
            status,
            body: body.to_string(),
        }),
        None => Err(AuthError::Provider {
            code: "invalid_token_response".to_string(),
            description: Some("token response carried neither access_token nor error".into()),
        }),
    }
}
