// Common types shared between client and server
pub mod common;

// Client library (public API for streamit)
mod client;
mod error;

pub use client::provider_client::{
    DeviceCodeRequest, DeviceCodeResponse, TokenExchange, TokenPayload, UserInfo,
    DEVICE_CODE_GRANT_TYPE,
};
pub use client::{
    authenticate, current_session, logout, AuthProvider, DeviceFlowClient, FileTokenStore,
    FlowHandle, FlowState, MemoryTokenStore, ProviderClient, Settings, TokenStorage, TokenStore,
};
pub use common::{
    format_remaining, AuthSession, AuthorizationStatus, DeviceAuthorization, StoredTokens,
    UserProfile,
};
pub use error::AuthError;

// Scripted provider for tests (integration tests need it)
pub mod testing;

// Server modules (public for binary, internal for library)
#[cfg(feature = "server")]
pub mod server;
