// Credential handling: deterministic principal derivation plus a
// process-local cache of valid API keys with single-flight refresh.
pub mod cache;
pub mod principal;

pub use cache::{ApiKeyCache, AuthCacheConfig, CredentialSource, KeyPage, RefreshError};
pub use principal::derive_principal_id;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("credential source error: {0}")]
    Source(String),
}
