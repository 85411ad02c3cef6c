//! Cached token source with lazy refresh.
//!
//! [`ReuseTokenSource`] hands out the cached token while it is valid and
//! refreshes it through a [`TokenRefresher`] otherwise. When a refresh fails
//! the cached token is dropped and the invalidation callback runs once for
//! that transition into the logged-out state.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{OAuthError, Result};
use crate::store::SharedCredentialStore;
use crate::token::OAuthToken;

/// Obtains a new token from a refresh token.
#[async_trait]
pub trait TokenRefresher: Send + Sync + std::fmt::Debug {
    async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken>;
}

/// Shared refresher for use across async contexts.
pub type SharedTokenRefresher = Arc<dyn TokenRefresher>;

/// Invoked when the cached token is lost because a refresh failed.
///
/// Runs while the token lock is held and must not block.
pub type InvalidationCallback = Arc<dyn Fn() + Send + Sync>;

/// Token source that reuses the cached token until it expires.
pub struct ReuseTokenSource {
    refresher: SharedTokenRefresher,
    cached: Mutex<Option<OAuthToken>>,
    on_invalid: Option<InvalidationCallback>,
    store: Option<SharedCredentialStore>,
}

impl std::fmt::Debug for ReuseTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReuseTokenSource")
            .field("refresher", &self.refresher)
            .field("has_callback", &self.on_invalid.is_some())
            .field("has_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl ReuseTokenSource {
    /// Create an empty token source.
    pub fn new(refresher: SharedTokenRefresher) -> Self {
        Self {
            refresher,
            cached: Mutex::new(None),
            on_invalid: None,
            store: None,
        }
    }

    /// Seed the cache without persisting.
    pub fn with_token(mut self, token: Option<OAuthToken>) -> Self {
        self.cached = Mutex::new(token);
        self
    }

    pub fn with_invalidation_callback(mut self, callback: InvalidationCallback) -> Self {
        self.on_invalid = Some(callback);
        self
    }

    /// Persist applied and refreshed tokens to `store`.
    pub fn with_store(mut self, store: SharedCredentialStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the cached token. `None` logs out.
    ///
    /// The store is written before the lock is released, so a concurrent
    /// refresh failure cannot overwrite the applied token.
    pub async fn apply(&self, token: Option<OAuthToken>) {
        let mut cached = self.cached.lock().await;
        self.persist(token.as_ref()).await;
        *cached = token;
    }

    /// Snapshot of the cached token, without refreshing.
    pub async fn current(&self) -> Option<OAuthToken> {
        self.cached.lock().await.clone()
    }

    /// Whether a token is cached that is still valid or can be refreshed.
    pub async fn is_logged_in(&self) -> bool {
        self.cached
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| t.is_valid() || t.refresh_token.is_some())
    }

    /// Return a valid token, refreshing the cached one if needed.
    pub async fn token(&self) -> Result<OAuthToken> {
        let mut cached = self.cached.lock().await;

        let current = match cached.as_ref() {
            Some(token) if token.is_valid() => return Ok(token.clone()),
            Some(token) => token.clone(),
            None => return Err(OAuthError::NotAuthenticated),
        };

        let refreshed = match current.refresh_token.as_deref() {
            Some(refresh_token) => {
                tracing::info!("Token expired, refreshing...");
                self.refresher.refresh(refresh_token).await
            }
            None => Err(OAuthError::TokenRefresh(
                "token expired and no refresh token is available".to_string(),
            )),
        };

        match refreshed {
            Ok(mut token) => {
                if token.refresh_token.is_none() {
                    token.refresh_token = current.refresh_token;
                }
                self.persist(Some(&token)).await;
                *cached = Some(token.clone());
                tracing::info!("Token refreshed successfully");
                Ok(token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed, discarding cached token");
                self.persist(None).await;
                *cached = None;
                // Still under the lock: a login applied after this point is
                // ordered after the logout notification.
                if let Some(callback) = &self.on_invalid {
                    callback();
                }
                drop(cached);

                Err(match e {
                    OAuthError::TokenRefresh(_) => e,
                    other => OAuthError::TokenRefresh(other.to_string()),
                })
            }
        }
    }

    async fn persist(&self, token: Option<&OAuthToken>) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save_token(token).await {
            tracing::warn!(error = %e, "Failed to persist token");
        }
    }
}
