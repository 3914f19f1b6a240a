mod attempt;
mod scheduler;

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

pub use attempt::FlowState;
pub(crate) use attempt::{cancel_active, FlowSlot};

use attempt::FlowAttempt;
use scheduler::PollingScheduler;

use super::config::Settings;
use super::provider_client::{AuthProvider, DeviceCodeRequest, ProviderClient};
use super::session::SessionResolver;
use super::token_storage::{TokenStorage, TokenStore};
use crate::common::{AuthSession, AuthorizationStatus, DeviceAuthorization, UserProfile};
use crate::error::AuthError;

/// Longest device code lifetime honoured. Larger provider values are clamped.
const MAX_CODE_LIFETIME_SECS: u64 = 24 * 60 * 60;

/// Caller's view of one flow attempt.
pub struct FlowHandle {
    authorization: Arc<DeviceAuthorization>,
    state: watch::Receiver<FlowState>,
    remaining: watch::Receiver<u64>,
    outcome: oneshot::Receiver<Result<AuthSession, AuthError>>,
}

impl FlowHandle {
    pub fn authorization(&self) -> &DeviceAuthorization {
        &self.authorization
    }

    pub fn state(&self) -> FlowState {
        self.state.borrow().clone()
    }

    pub fn state_changes(&self) -> watch::Receiver<FlowState> {
        self.state.clone()
    }

    pub fn remaining_secs(&self) -> u64 {
        *self.remaining.borrow()
    }

    /// Seconds left before the device code expires, updated once a second.
    pub fn countdown(&self) -> watch::Receiver<u64> {
        self.remaining.clone()
    }

    /// Resolves once the attempt settles. A cancelled or superseded attempt
    /// resolves to `AuthError::Cancelled`.
    pub async fn wait(self) -> Result<AuthSession, AuthError> {
        self.outcome.await.unwrap_or(Err(AuthError::Cancelled))
    }
}

pub struct DeviceFlowClient {
    settings: Settings,
    provider: Arc<dyn AuthProvider>,
    token_store: Arc<TokenStore>,
    flow: FlowSlot,
    next_attempt: AtomicU64,
    default_poll_interval: Duration,
}

impl DeviceFlowClient {
    pub fn new(settings: Settings, storage: Arc<dyn TokenStorage>) -> Result<Self, AuthError> {
        let provider = ProviderClient::new(settings.provider_url(), settings.request_timeout())?;
        Ok(Self::with_provider(settings, Arc::new(provider), storage))
    }

    pub fn with_provider(
        settings: Settings,
        provider: Arc<dyn AuthProvider>,
        storage: Arc<dyn TokenStorage>,
    ) -> Self {
        let flow = FlowSlot::default();
        let token_store = Arc::new(TokenStore::new(storage, flow.clone()));
        let default_poll_interval = settings.poll_interval();

        Self {
            settings,
            provider,
            token_store,
            flow,
            next_attempt: AtomicU64::new(0),
            default_poll_interval,
        }
    }

    /// Interval used when the provider does not send one.
    pub fn with_default_poll_interval(mut self, interval: Duration) -> Self {
        self.default_poll_interval = interval;
        self
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.token_store
    }

    /// Request a device code and start polling for it. Any previous attempt
    /// is cancelled first.
    pub async fn start(&self) -> Result<FlowHandle, AuthError> {
        self.settings.validate()?;

        let id = self.next_attempt.fetch_add(1, Ordering::Relaxed) + 1;
        let signal = {
            let mut slot = self.lock_flow();
            if let Some(previous) = slot.as_mut() {
                previous.cancel();
            }
            let attempt = FlowAttempt::new(id, FlowState::RequestingCode);
            let signal = attempt.signal.clone();
            *slot = Some(attempt);
            signal
        };

        let request = DeviceCodeRequest {
            client_id: self.settings.client_id.clone(),
            scope: self.settings.scope.clone(),
            audience: self.settings.audience.clone(),
        };

        tracing::info!(
            attempt = id,
            provider = %self.settings.provider_url(),
            "Starting device flow"
        );

        let response = match self.provider.request_device_code(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(attempt = id, error = %e, "Device code request failed");
                return if signal.settle(FlowState::Failed(e.clone())) {
                    Err(e)
                } else {
                    Err(AuthError::Cancelled)
                };
            }
        };

        let expires_in = response.expires_in.min(MAX_CODE_LIFETIME_SECS);
        let Some(deadline) = Instant::now().checked_add(Duration::from_secs(expires_in)) else {
            let e = AuthError::Provider {
                code: "invalid_expires_in".to_string(),
                description: Some(format!("unusable device code lifetime {}", expires_in)),
            };
            return if signal.settle(FlowState::Failed(e.clone())) {
                Err(e)
            } else {
                Err(AuthError::Cancelled)
            };
        };

        let authorization = Arc::new(DeviceAuthorization {
            device_code: response.device_code,
            user_code: response.user_code,
            verification_uri: response.verification_uri,
            verification_uri_complete: response.verification_uri_complete,
            expires_in,
            poll_interval: response
                .interval
                .map(|secs| Duration::from_secs(secs.clamp(1, MAX_CODE_LIFETIME_SECS)))
                .unwrap_or(self.default_poll_interval),
            issued_at: Utc::now(),
        });

        let (remaining_tx, remaining_rx) = watch::channel(authorization.expires_in);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let mut slot = self.lock_flow();
        let attempt = match slot.as_mut() {
            Some(attempt) if attempt.id == id => attempt,
            _ => return Err(AuthError::Cancelled),
        };
        if !signal.advance(
            &FlowState::RequestingCode,
            FlowState::AwaitingAuthorization,
        ) {
            return Err(AuthError::Cancelled);
        }

        let scheduler = PollingScheduler {
            attempt: id,
            provider: self.provider.clone(),
            resolver: SessionResolver::new(self.provider.clone(), self.token_store.clone()),
            client_id: self.settings.client_id.clone(),
            device_code: authorization.device_code.clone(),
            interval: authorization.poll_interval,
            deadline,
            signal: signal.clone(),
            remaining: remaining_tx,
        };

        attempt.authorization = Some(authorization.clone());
        attempt.remaining = Some(remaining_rx.clone());
        attempt.task = Some(tokio::spawn(scheduler.run(outcome_tx)));

        tracing::info!(
            attempt = id,
            user_code = %authorization.user_code,
            verification_uri = %authorization.verification_uri,
            expires_in = authorization.expires_in,
            interval_secs = authorization.poll_interval.as_secs(),
            "Awaiting device authorization"
        );

        Ok(FlowHandle {
            authorization,
            state: signal.subscribe(),
            remaining: remaining_rx,
            outcome: outcome_rx,
        })
    }

    /// Stop the live attempt. Both timers are torn down before this returns
    /// and no result is delivered afterwards.
    pub fn cancel(&self) {
        cancel_active(&self.flow);
    }

    pub fn current_authorization(&self) -> Option<AuthorizationStatus> {
        self.lock_flow().as_ref().and_then(|attempt| attempt.status())
    }

    pub fn state(&self) -> FlowState {
        self.lock_flow()
            .as_ref()
            .map(|attempt| attempt.signal.current())
            .unwrap_or(FlowState::Idle)
    }

    /// Sign in again from stored tokens, if the provider still accepts them.
    pub async fn restore_session(&self) -> Result<Option<AuthSession>, AuthError> {
        let Some(access_token) = self.token_store.access_token()? else {
            return Ok(None);
        };

        match self.provider.fetch_user_info(&access_token).await {
            Ok(info) => {
                let user = UserProfile::from(info);
                self.token_store.set_user(user.clone());
                tracing::info!(subject = %user.subject_id, "Restored stored session");
                Ok(Some(AuthSession {
                    access_token,
                    id_token: self.token_store.id_token()?,
                    expires_at: None,
                    user,
                }))
            }
            Err(AuthError::ProviderHttp {
                status: 401 | 403, ..
            }) => {
                tracing::info!("Stored token rejected by provider, clearing");
                self.token_store.clear()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        self.token_store.clear()
    }

    fn lock_flow(&self) -> MutexGuard<'_, Option<FlowAttempt>> {
        self.flow.lock().unwrap_or_else(|e| e.into_inner())
    }
}
