//! Configuration types.
//!
//! Every field is optional in the file so layers can be merged; [`VidauthConfig::resolve`]
//! applies defaults and checks required values.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Environment variable that overrides `provider.client_secret`.
pub const CLIENT_SECRET_ENV: &str = "VIDAUTH_CLIENT_SECRET";

/// Default issuer of the vehicle provider's identity service.
pub const DEFAULT_ISSUER: &str = "https://id.mercedes-benz.com";

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:7070";

/// Path the login handlers are mounted under.
pub const AUTH_PATH: &str = "/auth";

const DEFAULT_SCOPES: &[&str] = &["offline_access", "mb:vehicle:mbdata:evstatus"];
const DEFAULT_STATE_TTL_SECS: u64 = 600;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Root configuration as read from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VidauthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSection>,
}

/// `[server]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    /// Address to listen on.
    pub bind: Option<String>,
    /// Externally reachable URL of this server, used for the OAuth redirect.
    pub external_url: Option<String>,
    /// Where the browser lands after login. Defaults to `external_url`.
    pub base_uri: Option<String>,
}

/// `[provider]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSection {
    pub issuer: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub state_ttl_secs: Option<u64>,
    pub http_timeout_secs: Option<u64>,
}

/// `[storage]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSection {
    /// Directory holding persisted credentials.
    pub data_dir: Option<PathBuf>,
}

/// Fully resolved settings with defaults applied.
#[derive(Clone)]
pub struct ResolvedConfig {
    pub bind: SocketAddr,
    pub external_url: String,
    pub base_uri: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub state_ttl: Duration,
    pub http_timeout: Duration,
}

impl std::fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("bind", &self.bind)
            .field("external_url", &self.external_url)
            .field("base_uri", &self.base_uri)
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("scopes", &self.scopes)
            .field("state_ttl", &self.state_ttl)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl ResolvedConfig {
    /// OAuth redirect URI for the callback handler.
    pub fn redirect_uri(&self) -> String {
        format!("{}{}/callback", self.external_url, AUTH_PATH)
    }
}

impl VidauthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority per field).
    pub fn merge(&mut self, other: VidauthConfig) {
        if let Some(server) = other.server {
            let base = self.server.get_or_insert_with(Default::default);
            overlay(&mut base.bind, server.bind);
            overlay(&mut base.external_url, server.external_url);
            overlay(&mut base.base_uri, server.base_uri);
        }

        if let Some(provider) = other.provider {
            let base = self.provider.get_or_insert_with(Default::default);
            overlay(&mut base.issuer, provider.issuer);
            overlay(&mut base.client_id, provider.client_id);
            overlay(&mut base.client_secret, provider.client_secret);
            overlay(&mut base.scopes, provider.scopes);
            overlay(&mut base.state_ttl_secs, provider.state_ttl_secs);
            overlay(&mut base.http_timeout_secs, provider.http_timeout_secs);
        }

        if let Some(storage) = other.storage {
            let base = self.storage.get_or_insert_with(Default::default);
            overlay(&mut base.data_dir, storage.data_dir);
        }
    }

    /// Whether the file itself carries the client secret.
    pub fn has_plaintext_secret(&self) -> bool {
        self.provider
            .as_ref()
            .and_then(|p| p.client_secret.as_ref())
            .is_some_and(|s| !s.is_empty())
    }

    /// Apply defaults and the secret env override, and check required fields.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.resolve_with_secret(std::env::var(CLIENT_SECRET_ENV).ok())
    }

    /// Like [`VidauthConfig::resolve`] with an explicit secret override.
    pub fn resolve_with_secret(&self, secret_override: Option<String>) -> Result<ResolvedConfig> {
        let server = self.server.clone().unwrap_or_default();
        let provider = self.provider.clone().unwrap_or_default();

        let bind_str = server.bind.unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_str.parse().map_err(|e| ConfigError::InvalidValue {
            field: "server.bind".to_string(),
            reason: format!("{} ({})", e, bind_str),
        })?;

        let external_url = server
            .external_url
            .unwrap_or_else(|| format!("http://{}", bind))
            .trim_end_matches('/')
            .to_string();
        let base_uri = server
            .base_uri
            .unwrap_or_else(|| format!("{}/", external_url));

        let client_id = required(provider.client_id, "client_id", "[provider]")?;
        let client_secret = required(
            secret_override.filter(|s| !s.is_empty()).or(provider.client_secret),
            "client_secret",
            "[provider]",
        )?;

        let scopes = provider
            .scopes
            .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect());

        Ok(ResolvedConfig {
            bind,
            external_url,
            base_uri,
            issuer: provider.issuer.unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
            client_id,
            client_secret,
            scopes,
            state_ttl: Duration::from_secs(
                provider.state_ttl_secs.unwrap_or(DEFAULT_STATE_TTL_SECS),
            ),
            http_timeout: Duration::from_secs(
                provider
                    .http_timeout_secs
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
        })
    }
}

fn overlay<T>(base: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *base = other;
    }
}

fn required(value: Option<String>, field: &str, context: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingField {
            field: field.to_string(),
            context: context.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[server]
bind = "0.0.0.0:8080"
external_url = "https://car.example.com/"

[provider]
client_id = "abc"
client_secret = "shh"

[storage]
data_dir = "/var/lib/vidauth"
"#;

    #[test]
    fn test_parse_and_resolve() {
        let config = VidauthConfig::from_toml(SAMPLE).unwrap();
        let resolved = config.resolve_with_secret(None).unwrap();

        assert_eq!(resolved.bind.port(), 8080);
        assert_eq!(resolved.external_url, "https://car.example.com");
        assert_eq!(resolved.base_uri, "https://car.example.com/");
        assert_eq!(
            resolved.redirect_uri(),
            "https://car.example.com/auth/callback"
        );
        assert_eq!(resolved.issuer, DEFAULT_ISSUER);
        assert_eq!(resolved.scopes.len(), 2);
        assert_eq!(resolved.state_ttl, Duration::from_secs(600));
        assert_eq!(
            config.storage.as_ref().unwrap().data_dir,
            Some(PathBuf::from("/var/lib/vidauth"))
        );
        assert!(config.has_plaintext_secret());
    }

    #[test]
    fn test_secret_override_wins() {
        let config = VidauthConfig::from_toml(SAMPLE).unwrap();
        let resolved = config
            .resolve_with_secret(Some("from-env".to_string()))
            .unwrap();
        assert_eq!(resolved.client_secret, "from-env");
        assert!(!format!("{:?}", resolved).contains("from-env"));
    }

    #[test]
    fn test_missing_client_id() {
        let config = VidauthConfig::from_toml("[provider]\nclient_secret = \"x\"\n").unwrap();
        let err = config.resolve_with_secret(None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "client_id"));
    }

    #[test]
    fn test_invalid_bind() {
        let config = VidauthConfig::from_toml(
            "[server]\nbind = \"nowhere\"\n[provider]\nclient_id = \"a\"\nclient_secret = \"b\"\n",
        )
        .unwrap();
        assert!(matches!(
            config.resolve_with_secret(None),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_merge_overrides_per_field() {
        let mut base = VidauthConfig::from_toml(SAMPLE).unwrap();
        let local = VidauthConfig::from_toml("[provider]\nclient_id = \"local\"\n").unwrap();
        base.merge(local);

        let provider = base.provider.as_ref().unwrap();
        assert_eq!(provider.client_id.as_deref(), Some("local"));
        assert_eq!(provider.client_secret.as_deref(), Some("shh"));
        assert_eq!(
            base.server.as_ref().unwrap().bind.as_deref(),
            Some("0.0.0.0:8080")
        );
    }

    #[test]
    fn test_toml_roundtrip_skips_empty_sections() {
        let config = VidauthConfig::from_toml("[provider]\nclient_id = \"a\"\n").unwrap();
        let toml = config.to_toml().unwrap();
        assert!(!toml.contains("[server]"));
        assert_eq!(VidauthConfig::from_toml(&toml).unwrap(), config);
    }
}
