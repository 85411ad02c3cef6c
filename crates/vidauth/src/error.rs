//! Error types for the identity flow.

use crate::state::StateError;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, OAuthError>;

/// Errors that can occur while logging in against a vehicle provider.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// The OIDC provider could not be discovered or returned unusable metadata.
    #[error("failed to initialize OIDC provider: {0}")]
    Discovery(String),

    /// The round-tripped `state` parameter did not validate.
    #[error("failed state validation: {0}")]
    StateValidation(#[from] StateError),

    /// Exchanging the authorization code for a token failed.
    #[error("token error: {0}")]
    CodeExchange(String),

    /// Refreshing the cached token failed; the token has been discarded.
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    /// No token is cached. A login is required.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The provider answered with an OAuth error response.
    #[error("provider error: {0}")]
    Provider(String),

    /// Network/HTTP error.
    #[error("network error: {0}")]
    Network(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Credential storage error.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for OAuthError {
    fn from(e: reqwest::Error) -> Self {
        OAuthError::Network(e.to_string())
    }
}
