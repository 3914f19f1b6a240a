use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One device authorization as tracked by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceGrant {
    pub device_code: String,
    pub user_code: String,
    pub client_id: String,
    pub scope: String,
    pub status: GrantStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Minimum seconds between polls; grows on every `slow_down`.
    pub interval: u64,
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl DeviceGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn expires_in(&self, now: DateTime<Utc>) -> u64 {
        self.expires_at
            .signed_duration_since(now)
            .num_seconds()
            .max(0) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    Pending,
    Approved,
    Denied,
    /// Tokens were handed out; the device code cannot be exchanged again.
    Redeemed,
}

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub id_token: String,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
    pub scope: String,
}
