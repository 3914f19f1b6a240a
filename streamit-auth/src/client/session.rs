use chrono::{Duration, Utc};
use std::sync::Arc;

use super::provider_client::{AuthProvider, TokenPayload, UserInfo};
use super::token_storage::TokenStore;
use crate::common::{AuthSession, UserProfile};
use crate::error::AuthError;

impl From<UserInfo> for UserProfile {
    fn from(info: UserInfo) -> Self {
        let display_name = info
            .name
            .clone()
            .or_else(|| info.email.clone())
            .unwrap_or_else(|| info.sub.clone());

        Self {
            subject_id: info.sub,
            display_name,
            email: info.email,
            picture_url: info.picture,
        }
    }
}

/// Turns a granted token payload into a persisted session.
#[derive(Clone)]
pub(crate) struct SessionResolver {
    provider: Arc<dyn AuthProvider>,
    token_store: Arc<TokenStore>,
}

impl SessionResolver {
    pub(crate) fn new(provider: Arc<dyn AuthProvider>, token_store: Arc<TokenStore>) -> Self {
        Self {
            provider,
            token_store,
        }
    }

    /// Never fails: a broken userinfo endpoint yields the placeholder profile.
    pub(crate) async fn fetch_profile(&self, access_token: &str) -> UserProfile {
        match self.provider.fetch_user_info(access_token).await {
            Ok(info) => UserProfile::from(info),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch user info, using fallback profile");
                UserProfile::fallback()
            }
        }
    }

    pub(crate) fn finalize(
        &self,
        tokens: TokenPayload,
        user: UserProfile,
    ) -> Result<AuthSession, AuthError> {
        self.token_store
            .save(&tokens.access_token, tokens.id_token.as_deref())?;
        self.token_store.set_user(user.clone());

        // Lifetimes chrono cannot represent leave the expiry unknown.
        let expires_at = tokens
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));

        Ok(AuthSession {
            access_token: tokens.access_token,
            id_token: tokens.id_token,
            expires_at,
            user,
        })
    }
}
