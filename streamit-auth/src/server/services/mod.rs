pub mod grant_store;
pub mod token_issuer;

pub use grant_store::GrantStore;
pub use token_issuer::{generate_user_code, normalize_user_code, TokenIssuer};
