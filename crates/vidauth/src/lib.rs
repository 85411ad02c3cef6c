//! OAuth 2.0 / OIDC login for vehicle telemetry providers.
//!
//! Binds a provider's identity service to a local callback server: issues the
//! login URL, checks the returned `state`, exchanges the code, caches the token
//! and tells subscribers when the identity logs in or out.
//!
//! # Components
//!
//! - [`state`] — self-certifying CSRF `state` tokens keyed by a session secret
//! - [`provider`] — OIDC discovery, authorization URL, code exchange/refresh
//! - [`token_source`] — cached token with lazy refresh and invalidation callback
//! - [`notify`] — non-blocking login/logout events
//! - [`store`] — persistence of the session secret and token
//! - [`identity`] — the login state machine
//! - [`routes`] — axum handlers for login, callback and logout

pub mod error;
pub mod identity;
pub mod notify;
pub mod provider;
pub mod routes;
pub mod state;
pub mod store;
pub mod token;
pub mod token_source;

pub use error::{OAuthError, Result};
pub use identity::{CallbackError, IdentityBuilder, IdentityConfig, IdentityManager};
pub use notify::AuthNotifier;
pub use provider::{OAuthClient, ProviderMetadata};
pub use routes::router;
pub use state::{SessionSecret, StateError};
pub use store::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, SharedCredentialStore,
    StoredCredentials,
};
pub use token::OAuthToken;
pub use token_source::{ReuseTokenSource, TokenRefresher};
