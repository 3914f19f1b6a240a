use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde_json::json;
use url::Url;

use crate::server::config::{Configuration, DemoUserConfiguration};
use crate::server::error::ServerError;
use crate::server::models::{DeviceGrant, IssuedTokens, UserInfoResponse};

/// Consonants only, so codes never spell words and avoid look-alike vowels.
const USER_CODE_ALPHABET: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ";
const USER_CODE_HALF: usize = 4;

const ACCESS_TOKEN_TTL_SECS: u64 = 86_400;

pub struct TokenIssuer {
    client_id: String,
    audience: Option<String>,
    public_url: Url,
    demo_user: DemoUserConfiguration,
}

impl TokenIssuer {
    pub fn new(configuration: &Configuration) -> Result<Self, ServerError> {
        let mut public_url = Url::parse(&configuration.server.public_url)?;
        if !public_url.path().ends_with('/') {
            let path = format!("{}/", public_url.path());
            public_url.set_path(&path);
        }

        if configuration.oauth.client_id.trim().is_empty() {
            return Err(ServerError::Configuration(
                "oauth.client_id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client_id: configuration.oauth.client_id.clone(),
            audience: configuration.oauth.audience.clone(),
            public_url,
            demo_user: configuration.demo_user.clone(),
        })
    }

    /// Reject requests from any client other than the configured one.
    pub fn authenticate_client(&self, client_id: &str) -> Result<(), ServerError> {
        if client_id == self.client_id {
            Ok(())
        } else {
            tracing::warn!(client_id = %client_id, "Unknown client");
            Err(ServerError::InvalidClient)
        }
    }

    pub fn check_audience(&self, audience: Option<&str>) -> Result<(), ServerError> {
        match (audience, self.audience.as_deref()) {
            (Some(requested), Some(configured)) if requested != configured => Err(
                ServerError::InvalidRequest(format!("Unknown audience {}", requested)),
            ),
            _ => Ok(()),
        }
    }

    pub fn verification_uri(&self) -> String {
        self.activate_url().to_string()
    }

    pub fn verification_uri_complete(&self, user_code: &str) -> String {
        let mut url = self.activate_url();
        url.query_pairs_mut().append_pair("user_code", user_code);
        url.to_string()
    }

    fn activate_url(&self) -> Url {
        let mut url = self.public_url.clone();
        let path = format!("{}activate", url.path());
        url.set_path(&path);
        url
    }

    /// Mint an opaque access token and an unsigned ID token for `grant`.
    pub fn issue(&self, grant: &DeviceGrant, now: DateTime<Utc>) -> IssuedTokens {
        let expires_at = now + Duration::seconds(ACCESS_TOKEN_TTL_SECS as i64);

        IssuedTokens {
            access_token: generate_opaque_token(),
            id_token: self.id_token(now, expires_at),
            expires_in: ACCESS_TOKEN_TTL_SECS,
            expires_at,
            scope: grant.scope.clone(),
        }
    }

    fn id_token(&self, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> String {
        let header = json!({ "alg": "none", "typ": "JWT" });
        let claims = json!({
            "iss": self.public_url.as_str(),
            "sub": self.demo_user.subject,
            "aud": self.client_id,
            "iat": now.timestamp(),
            "exp": expires_at.timestamp(),
            "name": self.demo_user.name,
            "email": self.demo_user.email,
        });

        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    pub fn user_info(&self) -> UserInfoResponse {
        UserInfoResponse {
            sub: self.demo_user.subject.clone(),
            name: self.demo_user.name.clone(),
            email: self.demo_user.email.clone(),
            picture: self.demo_user.picture.clone(),
        }
    }
}

/// `XXXX-XXXX` drawn from the user code alphabet.
pub fn generate_user_code() -> String {
    let mut rng = rand::rng();
    let mut pick = || USER_CODE_ALPHABET[rng.random_range(0..USER_CODE_ALPHABET.len())] as char;

    let first: String = (0..USER_CODE_HALF).map(|_| pick()).collect();
    let second: String = (0..USER_CODE_HALF).map(|_| pick()).collect();
    format!("{}-{}", first, second)
}

/// Canonical form of a code typed by a person: case and separators are
/// ignored. Returns `None` if the input cannot be a user code.
pub fn normalize_user_code(input: &str) -> Option<String> {
    let letters: String = input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if letters.len() != USER_CODE_HALF * 2
        || !letters.bytes().all(|b| USER_CODE_ALPHABET.contains(&b))
    {
        return None;
    }

    let (first, second) = letters.split_at(USER_CODE_HALF);
    Some(format!("{}-{}", first, second))
}

fn generate_opaque_token() -> String {
    let mut rng = rand::rng();
    let random_bytes: Vec<u8> = (0..32).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&random_bytes)
}
