//! OIDC provider discovery and the OAuth 2.0 client for the code flow.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::error::{OAuthError, Result};
use crate::token::OAuthToken;
use crate::token_source::TokenRefresher;

/// Issuer of the Mercedes-Benz identity provider.
pub const MERCEDES_ISSUER: &str = "https://id.mercedes-benz.com";

/// Scope requesting a refresh token.
pub const SCOPE_OFFLINE_ACCESS: &str = "offline_access";

/// Scope for electric vehicle status telemetry.
pub const SCOPE_EV_STATUS: &str = "mb:vehicle:mbdata:evstatus";

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Endpoints published in the provider's discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

/// Fetch and check the provider's OpenID configuration.
pub async fn discover(http: &reqwest::Client, issuer: &str) -> Result<ProviderMetadata> {
    let issuer = issuer.trim_end_matches('/');
    let url = format!("{}{}", issuer, DISCOVERY_PATH);

    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|e| OAuthError::Discovery(format!("request to {} failed: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(OAuthError::Discovery(format!(
            "{} returned {}",
            url,
            response.status()
        )));
    }

    let metadata: ProviderMetadata = response
        .json()
        .await
        .map_err(|e| OAuthError::Discovery(format!("invalid discovery document: {}", e)))?;

    if metadata.issuer.trim_end_matches('/') != issuer {
        return Err(OAuthError::Discovery(format!(
            "issuer did not match the issuer returned by provider, expected {:?} got {:?}",
            issuer, metadata.issuer
        )));
    }

    tracing::debug!(issuer = %metadata.issuer, "Discovered OIDC provider");
    Ok(metadata)
}

/// OAuth client configured for one provider and redirect URI.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    endpoints: ProviderMetadata,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("endpoints", &self.endpoints)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl OAuthClient {
    pub fn new(
        http: reqwest::Client,
        endpoints: ProviderMetadata,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            http,
            endpoints,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes,
        }
    }

    pub fn endpoints(&self) -> &ProviderMetadata {
        &self.endpoints
    }

    /// Build the authorization URL carrying `state` and any extra parameters.
    pub fn auth_code_url(&self, state: &str, extra: &[(&str, &str)]) -> Result<String> {
        let mut url = Url::parse(&self.endpoints.authorization_endpoint).map_err(|e| {
            OAuthError::Config(format!(
                "invalid authorization endpoint {:?}: {}",
                self.endpoints.authorization_endpoint, e
            ))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id);
            if !self.redirect_uri.is_empty() {
                query.append_pair("redirect_uri", &self.redirect_uri);
            }
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            query.append_pair("state", state);
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }

        Ok(url.into())
    }

    /// Exchange an authorization code for a token.
    pub async fn exchange(&self, code: &str) -> Result<OAuthToken> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        self.request_token(&form)
            .await
            .map_err(|e| OAuthError::CodeExchange(e.to_string()))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<OAuthToken> {
        let response = self
            .http
            .post(&self.endpoints.token_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                },
                Err(_) => format!("{}: {}", status, body.trim()),
            };
            return Err(OAuthError::Provider(message));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            OAuthError::Serialization(format!("Failed to parse token response: {}", e))
        })?;

        let mut token = OAuthToken::bearer(parsed.access_token);
        if let Some(token_type) = parsed.token_type
            && !token_type.is_empty()
        {
            token.token_type = token_type;
        }
        token.refresh_token = parsed.refresh_token.filter(|t| !t.is_empty());
        token.id_token = parsed.id_token;
        if let Some(expires_in) = parsed.expires_in
            && expires_in > 0
        {
            token = token.expiring_in(expires_in);
        }

        Ok(token)
    }
}

#[async_trait]
impl TokenRefresher for OAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.request_token(&form)
            .await
            .map_err(|e| OAuthError::TokenRefresh(e.to_string()))
    }
}
