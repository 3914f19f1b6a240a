use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Device authorization issued by the provider for one flow attempt.
///
/// `device_code` is only ever sent back to the token endpoint and is redacted
/// from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    pub poll_interval: Duration,
    pub issued_at: DateTime<Utc>,
}

impl DeviceAuthorization {
    /// Saturates at the latest representable time.
    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.expires_in)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|lifetime| self.issued_at.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// URI to encode into a QR image.
    pub fn qr_payload(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .unwrap_or(&self.verification_uri)
    }
}

impl fmt::Debug for DeviceAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAuthorization")
            .field("device_code", &"<redacted>")
            .field("user_code", &self.user_code)
            .field("verification_uri", &self.verification_uri)
            .field("verification_uri_complete", &self.verification_uri_complete)
            .field("expires_in", &self.expires_in)
            .field("poll_interval", &self.poll_interval)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Snapshot of the live authorization for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationStatus {
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    pub remaining_secs: u64,
}

impl AuthorizationStatus {
    /// Share of the code lifetime already elapsed, in percent.
    pub fn progress_percent(&self) -> u8 {
        if self.expires_in == 0 {
            return 100;
        }
        let elapsed = self.expires_in.saturating_sub(self.remaining_secs);
        (u128::from(elapsed) * 100 / u128::from(self.expires_in)).min(100) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub subject_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub picture_url: Option<String>,
}

impl UserProfile {
    /// Placeholder profile used when the userinfo endpoint cannot be reached.
    pub fn fallback() -> Self {
        Self {
            subject_id: "demo-user".to_string(),
            display_name: "Demo User".to_string(),
            email: Some("demo@streamit.com".to_string()),
            picture_url: None,
        }
    }
}

/// Completed authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub id_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: UserProfile,
}

/// Token slots persisted between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    #[serde(rename = "streamit_access_token")]
    pub access_token: String,
    #[serde(rename = "streamit_id_token", default)]
    pub id_token: Option<String>,
    pub saved_at: DateTime<Utc>,
}

/// Format seconds as `m:ss`.
pub fn format_remaining(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
