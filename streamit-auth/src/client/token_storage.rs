use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use super::flow::{cancel_active, FlowSlot};
use crate::common::{StoredTokens, UserProfile};
use crate::error::AuthError;

const TOKEN_FILE: &str = "tokens.json";

/// Persistence backend for the access and identity token slots.
pub trait TokenStorage: Send + Sync {
    fn save(&self, tokens: &StoredTokens) -> Result<(), AuthError>;
    fn load(&self) -> Result<Option<StoredTokens>, AuthError>;
    fn clear(&self) -> Result<(), AuthError>;
}

pub struct FileTokenStore {
    token_path: PathBuf,
}

impl FileTokenStore {
    pub fn new() -> Result<Self, AuthError> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| AuthError::Configuration("Could not find cache directory".to_string()))?
            .join("streamit");
        Self::in_dir(cache_dir)
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Result<Self, AuthError> {
        let dir = dir.as_ref();

        // Create cache directory if it doesn't exist
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| {
                AuthError::TokenStorage(format!("Failed to create token directory: {}", e))
            })?;
        }

        Ok(Self {
            token_path: dir.join(TOKEN_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.token_path
    }
}

impl TokenStorage for FileTokenStore {
    fn save(&self, tokens: &StoredTokens) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(tokens)?;

        fs::write(&self.token_path, json)
            .map_err(|e| AuthError::TokenStorage(format!("Failed to save tokens: {}", e)))?;

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.token_path, fs::Permissions::from_mode(0o600)).map_err(
                |e| AuthError::TokenStorage(format!("Failed to set file permissions: {}", e)),
            )?;
        }

        Ok(())
    }

    fn load(&self) -> Result<Option<StoredTokens>, AuthError> {
        let json = match fs::read_to_string(&self.token_path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AuthError::TokenStorage(format!(
                    "Failed to read tokens: {}",
                    e
                )))
            }
        };

        let tokens: StoredTokens = serde_json::from_str(&json)?;
        Ok(Some(tokens))
    }

    fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.token_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::TokenStorage(format!(
                "Failed to delete tokens: {}",
                e
            ))),
        }
    }
}

/// Process-local storage; nothing survives a restart.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Option<StoredTokens>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryTokenStore {
    fn save(&self, tokens: &StoredTokens) -> Result<(), AuthError> {
        *self.tokens.lock().unwrap_or_else(|e| e.into_inner()) = Some(tokens.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredTokens>, AuthError> {
        Ok(self.tokens.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self.tokens.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// Credentials plus the profile loaded in this process.
pub struct TokenStore {
    storage: Arc<dyn TokenStorage>,
    user: RwLock<Option<UserProfile>>,
    flow: FlowSlot,
}

impl TokenStore {
    pub(crate) fn new(storage: Arc<dyn TokenStorage>, flow: FlowSlot) -> Self {
        Self {
            storage,
            user: RwLock::new(None),
            flow,
        }
    }

    pub fn save(&self, access_token: &str, id_token: Option<&str>) -> Result<(), AuthError> {
        self.storage.save(&StoredTokens {
            access_token: access_token.to_string(),
            id_token: id_token.map(str::to_string),
            saved_at: Utc::now(),
        })
    }

    /// Forget the stored tokens and profile. Any live polling is stopped
    /// first so a late grant cannot repopulate the slots.
    pub fn clear(&self) -> Result<(), AuthError> {
        cancel_active(&self.flow);
        *self.user.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.storage.clear()?;
        tracing::info!("Cleared stored tokens");
        Ok(())
    }

    pub fn access_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self.storage.load()?.map(|t| t.access_token))
    }

    pub fn id_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self.storage.load()?.and_then(|t| t.id_token))
    }

    pub fn is_authenticated(&self) -> bool {
        let has_token = matches!(self.access_token(), Ok(Some(_)));
        has_token && self.user().is_some()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.user.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_user(&self, user: UserProfile) {
        *self.user.write().unwrap_or_else(|e| e.into_inner()) = Some(user);
    }
}
