//! Login orchestration for one vehicle provider identity.
//!
//! [`IdentityManager`] drives the authorization-code flow: it mints the
//! `state` for the login URL, validates the callback, exchanges the code and
//! publishes login/logout transitions through an [`AuthNotifier`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{OAuthError, Result};
use crate::notify::AuthNotifier;
use crate::provider::{
    MERCEDES_ISSUER, OAuthClient, SCOPE_EV_STATUS, SCOPE_OFFLINE_ACCESS, discover,
};
use crate::state::{self, SessionSecret};
use crate::store::SharedCredentialStore;
use crate::token::OAuthToken;
use crate::token_source::{InvalidationCallback, ReuseTokenSource};

/// Default lifetime of a login attempt's state.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Default bound on provider requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider and callback settings for an identity.
#[derive(Clone)]
pub struct IdentityConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// OAuth redirect URI the provider calls back to.
    pub redirect_uri: String,
    /// Where the browser is sent after a successful login.
    pub base_uri: String,
    pub scopes: Vec<String>,
    pub state_ttl: Duration,
    pub http_timeout: Duration,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("issuer_url", &self.issuer_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("redirect_uri", &self.redirect_uri)
            .field("base_uri", &self.base_uri)
            .field("scopes", &self.scopes)
            .field("state_ttl", &self.state_ttl)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl IdentityConfig {
    /// Config for the Mercedes-Benz identity provider with EV status access.
    pub fn mercedes(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            issuer_url: MERCEDES_ISSUER.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: String::new(),
            base_uri: "/".to_string(),
            scopes: vec![
                SCOPE_OFFLINE_ACCESS.to_string(),
                SCOPE_EV_STATUS.to_string(),
            ],
            state_ttl: DEFAULT_STATE_TTL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    pub fn with_issuer(mut self, issuer_url: impl Into<String>) -> Self {
        self.issuer_url = issuer_url.into();
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = base_uri.into();
        self
    }

    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(OAuthError::Config("missing client id".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(OAuthError::Config("missing client secret".to_string()));
        }
        if self.redirect_uri.is_empty() {
            return Err(OAuthError::Config("missing redirect uri".to_string()));
        }
        Ok(())
    }
}

/// Why a provider callback did not complete a login.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// The provider reported an error instead of a code.
    #[error("error: {error}: {description}")]
    Provider { error: String, description: String },

    /// `state` was missing or repeated.
    #[error("invalid state response: {0}")]
    InvalidState(String),

    /// `code` was missing or repeated.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    OAuth(#[from] OAuthError),
}

/// Builder for [`IdentityManager`].
pub struct IdentityBuilder {
    config: IdentityConfig,
    token: Option<OAuthToken>,
    secret: Option<SessionSecret>,
    store: Option<SharedCredentialStore>,
    notifier: Option<AuthNotifier>,
    http: Option<reqwest::Client>,
}

impl IdentityBuilder {
    /// Warm-start with a previously obtained token.
    pub fn token(mut self, token: OAuthToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn session_secret(mut self, secret: SessionSecret) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Load and persist the session secret and token through `store`.
    pub fn store(mut self, store: SharedCredentialStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Publish login updates on a caller-owned notifier.
    pub fn notifier(mut self, notifier: AuthNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Discover the provider and assemble the identity.
    ///
    /// Fails with [`OAuthError::Discovery`] if the provider is unreachable.
    pub async fn build(self) -> Result<IdentityManager> {
        let config = self.config;
        config.validate()?;

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .timeout(config.http_timeout)
                .build()?,
        };

        let endpoints = discover(&http, &config.issuer_url).await?;
        let client = OAuthClient::new(
            http,
            endpoints,
            config.client_id.clone(),
            config.client_secret.clone(),
            config.redirect_uri.clone(),
            config.scopes.clone(),
        );

        let stored = match &self.store {
            Some(store) => store.load().await?,
            None => Default::default(),
        };

        let secret = self
            .secret
            .or_else(|| stored.session_secret.clone())
            .unwrap_or_else(SessionSecret::generate);
        if let Some(store) = &self.store
            && stored.session_secret.as_ref() != Some(&secret)
        {
            store.save_secret(&secret).await?;
        }

        let notifier = self.notifier.unwrap_or_default();
        let invalidated = notifier.clone();
        let on_invalid: InvalidationCallback = Arc::new(move || {
            tracing::info!("Token invalidated, logged out");
            invalidated.logged_out();
        });

        let mut tokens = ReuseTokenSource::new(Arc::new(client.clone()))
            .with_token(stored.token)
            .with_invalidation_callback(on_invalid);
        if let Some(store) = self.store {
            tokens = tokens.with_store(store);
        }
        if let Some(token) = self.token {
            tokens.apply(Some(token)).await;
        }

        tracing::info!(
            issuer = %config.issuer_url,
            token_endpoint = %client.endpoints().token_endpoint,
            client_id = %config.client_id,
            "Identity initialized"
        );

        Ok(IdentityManager {
            config,
            client,
            secret,
            tokens: Arc::new(tokens),
            notifier,
        })
    }
}

/// Owns the login lifecycle of one provider identity.
pub struct IdentityManager {
    config: IdentityConfig,
    client: OAuthClient,
    secret: SessionSecret,
    tokens: Arc<ReuseTokenSource>,
    notifier: AuthNotifier,
}

impl std::fmt::Debug for IdentityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityManager")
            .field("config", &self.config)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl IdentityManager {
    pub fn builder(config: IdentityConfig) -> IdentityBuilder {
        IdentityBuilder {
            config,
            token: None,
            secret: None,
            store: None,
            notifier: None,
            http: None,
        }
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Receive `true` on login and `false` on logout.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<bool> {
        self.notifier.subscribe()
    }

    /// Token source shared with the vehicle API client.
    pub fn token_source(&self) -> Arc<ReuseTokenSource> {
        self.tokens.clone()
    }

    /// A currently valid token, refreshed if needed.
    pub async fn token(&self) -> Result<OAuthToken> {
        self.tokens.token().await
    }

    pub async fn is_logged_in(&self) -> bool {
        self.tokens.is_logged_in().await
    }

    /// Provider URL that starts a login attempt.
    pub fn login_uri(&self) -> Result<String> {
        let state = state::mint(&self.secret);
        self.client.auth_code_url(
            &state,
            &[("access_type", "offline"), ("prompt", "login consent")],
        )
    }

    /// Complete a login from the provider's callback query string.
    ///
    /// Returns the URI to redirect the browser to.
    pub async fn handle_callback(&self, query: &str) -> std::result::Result<String, CallbackError> {
        tracing::debug!("callback request retrieved");

        let mut params: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }

        if let Some(errors) = params.get("error") {
            let description = params
                .get("error_description")
                .map(|d| d.join(", "))
                .unwrap_or_default();
            return Err(CallbackError::Provider {
                error: errors.join(", "),
                description,
            });
        }

        let state = match params.get("state").map(Vec::as_slice) {
            Some([state]) => state,
            _ => return Err(CallbackError::InvalidState(query.to_string())),
        };
        state::validate_fresh(state, &self.secret, self.config.state_ttl)
            .map_err(OAuthError::from)?;

        let code = match params.get("code").map(Vec::as_slice) {
            Some([code]) => code,
            _ => return Err(CallbackError::InvalidResponse(query.to_string())),
        };

        let token = self.client.exchange(code).await?;
        if !token.is_valid() {
            return Err(OAuthError::CodeExchange(
                "provider returned an invalid token".to_string(),
            )
            .into());
        }

        tracing::debug!("sending login update...");
        self.tokens.apply(Some(token)).await;
        self.notifier.logged_in();
        tracing::info!(client_id = %self.config.client_id, "Logged in");

        Ok(self.config.base_uri.clone())
    }

    /// Drop the cached token and announce the logout.
    pub async fn logout(&self) {
        self.tokens.apply(None).await;
        self.notifier.logged_out();
        tracing::info!(client_id = %self.config.client_id, "Logged out");
    }

    #[cfg(test)]
    pub(crate) fn secret(&self) -> &SessionSecret {
        &self.secret
    }
}
