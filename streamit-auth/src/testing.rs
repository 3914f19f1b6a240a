use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::client::provider_client::{
    AuthProvider, DeviceCodeRequest, DeviceCodeResponse, TokenExchange, UserInfo,
};
use crate::client::{DeviceFlowClient, MemoryTokenStore, Settings};
use crate::error::AuthError;

/// Provider double that replays scripted responses without any I/O.
///
/// Token exchanges are served in order; once the script runs out every poll
/// answers `authorization_pending`. With an exchange delay each token
/// response arrives that long after the request went out.
pub struct ScriptedProvider {
    device_code: Mutex<Result<DeviceCodeResponse, AuthError>>,
    token_script: Mutex<VecDeque<Result<TokenExchange, AuthError>>>,
    user_info: Mutex<Result<UserInfo, AuthError>>,
    device_code_requests: Mutex<Vec<DeviceCodeRequest>>,
    exchange_delay: Duration,
    token_calls: AtomicUsize,
    user_info_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(device_code: DeviceCodeResponse) -> Self {
        Self {
            device_code: Mutex::new(Ok(device_code)),
            token_script: Mutex::new(VecDeque::new()),
            user_info: Mutex::new(Ok(UserInfo {
                sub: "auth0|viewer".to_string(),
                name: Some("Couch Viewer".to_string()),
                email: Some("viewer@streamit.dev".to_string()),
                picture: None,
            })),
            device_code_requests: Mutex::new(Vec::new()),
            exchange_delay: Duration::ZERO,
            token_calls: AtomicUsize::new(0),
            user_info_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_device_code(error: AuthError) -> Self {
        let provider = Self::new(device_code_response(300, None));
        *lock(&provider.device_code) = Err(error);
        provider
    }

    pub fn with_token_responses(
        self,
        responses: impl IntoIterator<Item = Result<TokenExchange, AuthError>>,
    ) -> Self {
        lock(&self.token_script).extend(responses);
        self
    }

    pub fn with_user_info(self, user_info: Result<UserInfo, AuthError>) -> Self {
        *lock(&self.user_info) = user_info;
        self
    }

    pub fn with_exchange_delay(mut self, delay: Duration) -> Self {
        self.exchange_delay = delay;
        self
    }

    pub fn device_code_calls(&self) -> usize {
        lock(&self.device_code_requests).len()
    }

    pub fn device_code_requests(&self) -> Vec<DeviceCodeRequest> {
        lock(&self.device_code_requests).clone()
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn user_info_calls(&self) -> usize {
        self.user_info_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for ScriptedProvider {
    async fn request_device_code(
        &self,
        request: &DeviceCodeRequest,
    ) -> Result<DeviceCodeResponse, AuthError> {
        lock(&self.device_code_requests).push(request.clone());
        lock(&self.device_code).clone()
    }

    async fn exchange_device_code(
        &self,
        _device_code: &str,
        _client_id: &str,
    ) -> Result<TokenExchange, AuthError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        if !self.exchange_delay.is_zero() {
            tokio::time::sleep(self.exchange_delay).await;
        }
        lock(&self.token_script)
            .pop_front()
            .unwrap_or_else(|| Ok(TokenExchange::pending()))
    }

    async fn fetch_user_info(&self, _access_token: &str) -> Result<UserInfo, AuthError> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.user_info).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Device code response used throughout the tests.
pub fn device_code_response(expires_in: u64, interval: Option<u64>) -> DeviceCodeResponse {
    DeviceCodeResponse {
        device_code: "DC1".to_string(),
        user_code: "ABCD-1234".to_string(),
        verification_uri: "https://example.com/device".to_string(),
        verification_uri_complete: Some("https://example.com/device?code=ABCD-1234".to_string()),
        expires_in,
        interval,
    }
}

/// Client wired to `provider` with in-memory token storage.
pub fn scripted_client(provider: Arc<ScriptedProvider>) -> DeviceFlowClient {
    let settings = Settings::for_provider("my-tenant.example.com", "abc123");
    DeviceFlowClient::with_provider(settings, provider, Arc::new(MemoryTokenStore::new()))
}
