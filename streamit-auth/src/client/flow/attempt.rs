use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::common::{AuthorizationStatus, DeviceAuthorization};
use crate::error::AuthError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    RequestingCode,
    AwaitingAuthorization,
    Succeeded,
    Failed(AuthError),
    Cancelled,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowState::Succeeded | FlowState::Failed(_) | FlowState::Cancelled
        )
    }
}

/// Shared, settle-once view of one attempt's state.
///
/// Every terminal transition goes through a compare-and-set on the watch
/// channel, so whichever signal arrives first wins and later ones are dropped.
#[derive(Clone)]
pub(crate) struct AttemptSignal {
    state: Arc<watch::Sender<FlowState>>,
}

impl AttemptSignal {
    pub(crate) fn new(initial: FlowState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            state: Arc::new(tx),
        }
    }

    pub(crate) fn current(&self) -> FlowState {
        self.state.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state.subscribe()
    }

    /// Move from `from` to `to`; fails if the attempt has moved on.
    pub(crate) fn advance(&self, from: &FlowState, to: FlowState) -> bool {
        self.state.send_if_modified(|current| {
            if current != from {
                return false;
            }
            *current = to;
            true
        })
    }

    /// Settle into a terminal state unless already settled.
    pub(crate) fn settle(&self, to: FlowState) -> bool {
        self.state.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = to;
            true
        })
    }

    /// Run `finish` and settle with its result, atomically with respect to
    /// other settle calls. Returns `None` if the attempt was already settled,
    /// in which case `finish` never runs.
    pub(crate) fn settle_with<T>(
        &self,
        finish: impl FnOnce() -> Result<T, AuthError>,
    ) -> Option<Result<T, AuthError>> {
        let mut outcome = None;
        self.state.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            let result = finish();
            *current = match &result {
                Ok(_) => FlowState::Succeeded,
                Err(e) => FlowState::Failed(e.clone()),
            };
            outcome = Some(result);
            true
        });
        outcome
    }
}

/// One flow attempt: its state, its authorization and its scheduler task.
/// Dropping the attempt aborts the task, which tears down both timers.
pub(crate) struct FlowAttempt {
    pub(crate) id: u64,
    pub(crate) signal: AttemptSignal,
    pub(crate) authorization: Option<Arc<DeviceAuthorization>>,
    pub(crate) remaining: Option<watch::Receiver<u64>>,
    pub(crate) task: Option<JoinHandle<()>>,
}

impl FlowAttempt {
    pub(crate) fn new(id: u64, initial: FlowState) -> Self {
        Self {
            id,
            signal: AttemptSignal::new(initial),
            authorization: None,
            remaining: None,
            task: None,
        }
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.signal.settle(FlowState::Cancelled) {
            tracing::info!(attempt = self.id, "Device flow cancelled");
        }
    }

    pub(crate) fn status(&self) -> Option<AuthorizationStatus> {
        if self.signal.current() != FlowState::AwaitingAuthorization {
            return None;
        }
        let authorization = self.authorization.as_ref()?;
        let remaining_secs = self
            .remaining
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(authorization.expires_in);

        Some(AuthorizationStatus {
            user_code: authorization.user_code.clone(),
            verification_uri: authorization.verification_uri.clone(),
            verification_uri_complete: authorization.verification_uri_complete.clone(),
            expires_in: authorization.expires_in,
            remaining_secs,
        })
    }
}

impl Drop for FlowAttempt {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Holder of the single live attempt, shared by the client and the token store.
pub(crate) type FlowSlot = Arc<Mutex<Option<FlowAttempt>>>;

pub(crate) fn cancel_active(slot: &FlowSlot) {
    let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(attempt) = guard.as_mut() {
        attempt.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_terminal_signal_wins() {
        let signal = AttemptSignal::new(FlowState::AwaitingAuthorization);

        assert!(signal.settle(FlowState::Failed(AuthError::DeviceCodeExpired)));
        assert!(!signal.settle(FlowState::Succeeded));
        assert!(!signal.settle(FlowState::Cancelled));
        assert_eq!(
            signal.current(),
            FlowState::Failed(AuthError::DeviceCodeExpired)
        );
    }

    #[test]
    fn settle_with_skips_work_once_settled() {
        let signal = AttemptSignal::new(FlowState::AwaitingAuthorization);
        signal.settle(FlowState::Cancelled);

        let mut ran = false;
        let outcome = signal.settle_with(|| {
            ran = true;
            Ok::<_, AuthError>(())
        });

        assert!(outcome.is_none());
        assert!(!ran);
        assert_eq!(signal.current(), FlowState::Cancelled);
    }

    #[test]
    fn settle_with_records_failure() {
        let signal = AttemptSignal::new(FlowState::AwaitingAuthorization);
        let outcome =
            signal.settle_with(|| Err::<(), _>(AuthError::TokenStorage("disk full".into())));

        assert_eq!(
            outcome,
            Some(Err(AuthError::TokenStorage("disk full".into())))
        );
        assert!(matches!(signal.current(), FlowState::Failed(_)));
    }

    #[test]
    fn advance_requires_expected_state() {
        let signal = AttemptSignal::new(FlowState::RequestingCode);
        signal.settle(FlowState::Cancelled);

        assert!(!signal.advance(
            &FlowState::RequestingCode,
            FlowState::AwaitingAuthorization
        ));
        assert_eq!(signal.current(), FlowState::Cancelled);
    }

    #[test]
    fn cancel_active_marks_attempt_cancelled() {
        let slot = FlowSlot::default();
        let signal = {
            let attempt = FlowAttempt::new(1, FlowState::AwaitingAuthorization);
            let signal = attempt.signal.clone();
            *slot.lock().unwrap() = Some(attempt);
            signal
        };

        cancel_active(&slot);
        assert_eq!(signal.current(), FlowState::Cancelled);
    }
}
