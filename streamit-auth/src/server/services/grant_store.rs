use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::token_issuer::generate_user_code;
use crate::server::error::ServerError;
use crate::server::models::{DeviceGrant, GrantStatus};

/// Added to the interval after every `slow_down`.
const SLOW_DOWN_STEP_SECS: u64 = 5;

/// Polls this much earlier than the interval still count as on time.
const POLL_GRACE_MS: i64 = 500;

/// Expired grants are kept this long so late polls see `expired_token`.
const EXPIRED_RETENTION_SECS: i64 = 60;

const CLEANUP_PERIOD: Duration = Duration::from_secs(60);

pub struct GrantStore {
    grants: DashMap<String, DeviceGrant>,
    user_codes: DashMap<String, String>,
    access_tokens: DashMap<String, DateTime<Utc>>,
    ttl: chrono::Duration,
    interval: u64,
}

impl GrantStore {
    pub fn new(ttl_seconds: u64, interval_seconds: u64) -> Self {
        tracing::info!(
            "Grant store initialized with TTL of {} seconds, poll interval {} seconds",
            ttl_seconds,
            interval_seconds
        );

        Self {
            grants: DashMap::new(),
            user_codes: DashMap::new(),
            access_tokens: DashMap::new(),
            ttl: chrono::Duration::seconds(ttl_seconds as i64),
            interval: interval_seconds.max(1),
        }
    }

    /// Periodically drop expired grants and tokens. The task ends once the
    /// store is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(cleanup_expired_grants(store))
    }

    /// Open a new pending grant with a unique user code.
    pub fn create(&self, client_id: &str, scope: &str, now: DateTime<Utc>) -> DeviceGrant {
        let device_code = Uuid::new_v4().to_string();

        let user_code = loop {
            let candidate = generate_user_code();
            match self.user_codes.entry(candidate.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    slot.insert(device_code.clone());
                    break candidate;
                }
            }
        };

        let grant = DeviceGrant {
            device_code: device_code.clone(),
            user_code,
            client_id: client_id.to_string(),
            scope: scope.to_string(),
            status: GrantStatus::Pending,
            created_at: now,
            expires_at: now + self.ttl,
            interval: self.interval,
            last_polled_at: None,
        };
        self.grants.insert(device_code, grant.clone());

        tracing::debug!(user_code = %grant.user_code, "Created device grant");
        grant
    }

    pub fn find_by_user_code(&self, user_code: &str) -> Option<DeviceGrant> {
        let device_code = self.user_codes.get(user_code)?.value().clone();
        self.grants.get(&device_code).map(|g| g.clone())
    }

    pub fn approve(&self, user_code: &str, now: DateTime<Utc>) -> Result<DeviceGrant, ServerError> {
        self.decide(user_code, now, GrantStatus::Approved)
    }

    pub fn deny(&self, user_code: &str, now: DateTime<Utc>) -> Result<DeviceGrant, ServerError> {
        self.decide(user_code, now, GrantStatus::Denied)
    }

    fn decide(
        &self,
        user_code: &str,
        now: DateTime<Utc>,
        decision: GrantStatus,
    ) -> Result<DeviceGrant, ServerError> {
        let device_code = self
            .user_codes
            .get(user_code)
            .map(|d| d.value().clone())
            .ok_or_else(|| ServerError::NotFound("Unknown user code".to_string()))?;

        let mut grant = self
            .grants
            .get_mut(&device_code)
            .ok_or_else(|| ServerError::NotFound("Unknown user code".to_string()))?;

        if grant.is_expired(now) {
            return Err(ServerError::ExpiredToken);
        }
        if grant.status != GrantStatus::Pending {
            return Err(ServerError::InvalidRequest(
                "This code has already been used".to_string(),
            ));
        }

        grant.status = decision;
        tracing::info!(user_code = %user_code, status = ?decision, "Device grant decided");
        Ok(grant.clone())
    }

    /// One token-endpoint poll. Returns the grant once it is approved and
    /// marks it redeemed; every other outcome is the OAuth error to send.
    pub fn redeem(
        &self,
        device_code: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DeviceGrant, ServerError> {
        let mut grant = self
            .grants
            .get_mut(device_code)
            .ok_or_else(|| ServerError::InvalidGrant("Unknown device code".to_string()))?;

        if grant.client_id != client_id {
            return Err(ServerError::InvalidGrant(
                "Device code was issued to another client".to_string(),
            ));
        }

        let last_polled_at = grant.last_polled_at.replace(now);

        let status = grant.status;
        match status {
            GrantStatus::Redeemed => {
                return Err(ServerError::InvalidGrant(
                    "Device code already redeemed".to_string(),
                ))
            }
            GrantStatus::Denied => return Err(ServerError::AccessDenied),
            _ if grant.is_expired(now) => return Err(ServerError::ExpiredToken),
            GrantStatus::Approved => {
                grant.status = GrantStatus::Redeemed;
                return Ok(grant.clone());
            }
            GrantStatus::Pending => {}
        }

        let interval = chrono::Duration::seconds(grant.interval as i64);
        let grace = chrono::Duration::milliseconds(POLL_GRACE_MS);
        let too_fast =
            last_polled_at.is_some_and(|last| now.signed_duration_since(last) + grace < interval);
        if too_fast {
            grant.interval += SLOW_DOWN_STEP_SECS;
            tracing::debug!(
                user_code = %grant.user_code,
                interval = grant.interval,
                "Client polling too fast"
            );
            return Err(ServerError::SlowDown);
        }

        Err(ServerError::AuthorizationPending)
    }

    pub fn register_access_token(&self, access_token: &str, expires_at: DateTime<Utc>) {
        self.access_tokens
            .insert(access_token.to_string(), expires_at);
    }

    pub fn access_token_valid(&self, access_token: &str, now: DateTime<Utc>) -> bool {
        self.access_tokens
            .get(access_token)
            .map(|expires_at| now < *expires_at)
            .unwrap_or(false)
    }

    /// Drop grants past their retention and expired access tokens.
    /// Returns the number of grants removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let initial_count = self.grants.len();
        let retention = chrono::Duration::seconds(EXPIRED_RETENTION_SECS);

        self.grants.retain(|_, grant| {
            let keep = now < grant.expires_at + retention;
            if !keep {
                tracing::debug!(user_code = %grant.user_code, "Cleaning up expired grant");
            }
            keep
        });
        self.user_codes
            .retain(|_, device_code| self.grants.contains_key(device_code));
        self.access_tokens.retain(|_, expires_at| now < *expires_at);

        initial_count.saturating_sub(self.grants.len())
    }

    /// Grant count (for monitoring)
    pub fn grant_count(&self) -> usize {
        self.grants.len()
    }
}

/// Background task that periodically cleans up expired grants
async fn cleanup_expired_grants(store: Weak<GrantStore>) {
    let mut interval = tokio::time::interval(CLEANUP_PERIOD);
    loop {
        interval.tick().await;
        let Some(store) = store.upgrade() else {
            break;
        };

        let cleaned = store.purge_expired(Utc::now());
        if cleaned > 0 {
            tracing::info!(
                "Cleaned up {} expired grants, {} remaining",
                cleaned,
                store.grant_count()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn store() -> GrantStore {
        GrantStore::new(600, 5)
    }

    #[test]
    fn test_create_indexes_user_code() {
        let store = store();
        let now = Utc::now();
        let grant = store.create("streamit-tv", "openid", now);

        assert_eq!(grant.status, GrantStatus::Pending);
        assert_eq!(grant.interval, 5);
        assert_eq!(grant.expires_in(now), 600);
        let found = store.find_by_user_code(&grant.user_code).unwrap();
        assert_eq!(found.device_code, grant.device_code);
        assert_eq!(store.grant_count(), 1);
    }

    #[test]
    fn test_pending_then_approved_then_redeemed() {
        let store = store();
        let t0 = Utc::now();
        let grant = store.create("streamit-tv", "openid", t0);

        let pending = store.redeem(&grant.device_code, "streamit-tv", t0 + ChronoDuration::seconds(5));
        assert_eq!(pending.unwrap_err(), ServerError::AuthorizationPending);

        store.approve(&grant.user_code, t0 + ChronoDuration::seconds(7)).unwrap();

        let redeemed = store
            .redeem(&grant.device_code, "streamit-tv", t0 + ChronoDuration::seconds(10))
            .unwrap();
        assert_eq!(redeemed.status, GrantStatus::Redeemed);

        let again = store.redeem(&grant.device_code, "streamit-tv", t0 + ChronoDuration::seconds(15));
        assert!(matches!(again, Err(ServerError::InvalidGrant(_))));
    }

    #[test]
    fn test_fast_polling_gets_slow_down_and_wider_interval() {
        let store = store();
        let t0 = Utc::now();
        let grant = store.create("streamit-tv", "openid", t0);

        let _ = store.redeem(&grant.device_code, "streamit-tv", t0 + ChronoDuration::seconds(5));
        let fast = store.redeem(&grant.device_code, "streamit-tv", t0 + ChronoDuration::seconds(6));
        assert_eq!(fast.unwrap_err(), ServerError::SlowDown);
        assert_eq!(store.find_by_user_code(&grant.user_code).unwrap().interval, 10);

        // Waiting the widened interval is on time again
        let on_time = store.redeem(&grant.device_code, "streamit-tv", t0 + ChronoDuration::seconds(16));
        assert_eq!(on_time.unwrap_err(), ServerError::AuthorizationPending);
    }

    #[test]
    fn test_denied_grant_reports_access_denied() {
        let store = store();
        let t0 = Utc::now();
        let grant = store.create("streamit-tv", "openid", t0);

        store.deny(&grant.user_code, t0).unwrap();

        let result = store.redeem(&grant.device_code, "streamit-tv", t0 + ChronoDuration::seconds(5));
        assert_eq!(result.unwrap_err(), ServerError::AccessDenied);
        assert!(store.approve(&grant.user_code, t0).is_err());
    }

    #[test]
    fn test_expired_grant() {
        let store = GrantStore::new(30, 5);
        let t0 = Utc::now();
        let grant = store.create("streamit-tv", "openid", t0);
        let later = t0 + ChronoDuration::seconds(31);

        assert_eq!(
            store.approve(&grant.user_code, later).unwrap_err(),
            ServerError::ExpiredToken
        );
        assert_eq!(
            store.redeem(&grant.device_code, "streamit-tv", later).unwrap_err(),
            ServerError::ExpiredToken
        );
    }

    #[test]
    fn test_unknown_codes_and_wrong_client() {
        let store = store();
        let t0 = Utc::now();
        let grant = store.create("streamit-tv", "openid", t0);

        assert!(matches!(
            store.redeem("nope", "streamit-tv", t0),
            Err(ServerError::InvalidGrant(_))
        ));
        assert!(matches!(
            store.redeem(&grant.device_code, "other-client", t0),
            Err(ServerError::InvalidGrant(_))
        ));
        assert!(matches!(
            store.approve("BCDF-GHJK-X", t0),
            Err(ServerError::NotFound(_))
        ));
    }

    #[test]
    fn test_purge_expired_removes_grants_and_tokens() {
        let store = GrantStore::new(30, 5);
        let t0 = Utc::now();
        let old = store.create("streamit-tv", "openid", t0);
        store.register_access_token("old-token", t0 + ChronoDuration::seconds(10));

        let t1 = t0 + ChronoDuration::seconds(100);
        let fresh = store.create("streamit-tv", "openid", t1);
        store.register_access_token("fresh-token", t1 + ChronoDuration::seconds(10));

        assert_eq!(store.purge_expired(t1), 1);
        assert!(store.find_by_user_code(&old.user_code).is_none());
        assert!(store.find_by_user_code(&fresh.user_code).is_some());
        assert!(!store.access_token_valid("old-token", t1));
        assert!(store.access_token_valid("fresh-token", t1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_stops_with_store() {
        let store = Arc::new(store());
        let task = store.spawn_cleanup();
        drop(store);

        tokio::time::timeout(Duration::from_secs(120), task)
            .await
            .unwrap()
            .unwrap();
    }
}
