use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::{interval_at, sleep, Instant};

use super::attempt::{AttemptSignal, FlowState};
use crate::client::provider_client::{AuthProvider, TokenExchange, TokenPayload};
use crate::client::session::SessionResolver;
use crate::common::AuthSession;
use crate::error::AuthError;

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// What a single poll told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    Pending,
    SlowDown,
    Granted(TokenPayload),
}

pub(crate) fn classify(exchange: TokenExchange) -> Result<PollOutcome, AuthError> {
    match exchange {
        TokenExchange::Granted(payload) => Ok(PollOutcome::Granted(payload)),
        TokenExchange::Rejected {
            error,
            error_description,
        } => match error.as_str() {
            "authorization_pending" => Ok(PollOutcome::Pending),
            "slow_down" => Ok(PollOutcome::SlowDown),
            "expired_token" => Err(AuthError::DeviceCodeExpired),
            "access_denied" => Err(AuthError::UserDeniedAccess),
            _ => Err(AuthError::Provider {
                code: error,
                description: error_description,
            }),
        },
    }
}

/// Drives token exchange for one attempt alongside the expiry countdown.
///
/// Both timers live in one task, so aborting the task stops both.
pub(crate) struct PollingScheduler {
    pub(crate) attempt: u64,
    pub(crate) provider: Arc<dyn AuthProvider>,
    pub(crate) resolver: SessionResolver,
    pub(crate) client_id: String,
    pub(crate) device_code: String,
    pub(crate) interval: Duration,
    pub(crate) deadline: Instant,
    pub(crate) signal: AttemptSignal,
    pub(crate) remaining: watch::Sender<u64>,
}

impl PollingScheduler {
    pub(crate) async fn run(self, outcome: oneshot::Sender<Result<AuthSession, AuthError>>) {
        let settled = match self.drive().await {
            Ok(tokens) => {
                let user = self.resolver.fetch_profile(&tokens.access_token).await;
                self.signal.settle_with(|| self.resolver.finalize(tokens, user))
            }
            Err(e) => {
                if self.signal.settle(FlowState::Failed(e.clone())) {
                    Some(Err(e))
                } else {
                    None
                }
            }
        };

        match settled {
            Some(result) => {
                match &result {
                    Ok(session) => tracing::info!(
                        attempt = self.attempt,
                        subject = %session.user.subject_id,
                        "Device flow succeeded"
                    ),
                    Err(e) => tracing::warn!(attempt = self.attempt, error = %e, "Device flow failed"),
                }
                let _ = outcome.send(result);
            }
            None => {
                tracing::debug!(attempt = self.attempt, "Attempt already settled, dropping result");
            }
        }
    }

    async fn drive(&self) -> Result<TokenPayload, AuthError> {
        let mut countdown = interval_at(Instant::now() + COUNTDOWN_TICK, COUNTDOWN_TICK);
        let mut interval = self.interval;
        let mut next_poll = Box::pin(self.poll_after(interval));

        loop {
            tokio::select! {
                biased;

                _ = countdown.tick() => {
                    let remaining = self.remaining_secs();
                    self.remaining.send_replace(remaining);
                    if remaining == 0 {
                        tracing::info!(attempt = self.attempt, "Device code expired locally");
                        return Err(AuthError::DeviceCodeExpired);
                    }
                }

                outcome = &mut next_poll => {
                    match outcome? {
                        PollOutcome::Pending => {
                            tracing::debug!(attempt = self.attempt, "Authorization pending");
                        }
                        PollOutcome::SlowDown => {
                            interval += SLOW_DOWN_STEP;
                            tracing::debug!(
                                attempt = self.attempt,
                                interval_secs = interval.as_secs(),
                                "Provider asked to slow down"
                            );
                        }
                        PollOutcome::Granted(tokens) => {
                            tracing::info!(
                                attempt = self.attempt,
                                has_id_token = tokens.id_token.is_some(),
                                "Token exchange succeeded"
                            );
                            return Ok(tokens);
                        }
                    }
                    next_poll.set(self.poll_after(interval));
                }
            }
        }
    }

    /// Wait one interval, then make exactly one exchange attempt.
    async fn poll_after(&self, delay: Duration) -> Result<PollOutcome, AuthError> {
        sleep(delay).await;
        let exchange = self
            .provider
            .exchange_device_code(&self.device_code, &self.client_id)
            .await?;
        classify(exchange)
    }

    fn remaining_secs(&self) -> u64 {
        let left = self.deadline.saturating_duration_since(Instant::now());
        left.as_secs() + u64::from(left.subsec_nanos() > 0)
    }
}
