mod models;

pub use models::{
    format_remaining, AuthSession, AuthorizationStatus, DeviceAuthorization, StoredTokens,
    UserProfile,
};
