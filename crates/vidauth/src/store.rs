//! Credential persistence.
//!
//! Stores the session secret alongside the cached token so that login URLs
//! issued before a restart still validate afterwards, and so a login survives
//! restarts without going through the provider again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{OAuthError, Result};
use crate::state::SessionSecret;
use crate::token::OAuthToken;

/// Default credentials file name within the data directory.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Everything persisted for one identity.
#[derive(Debug, Clone, Default)]
pub struct StoredCredentials {
    pub session_secret: Option<SessionSecret>,
    pub token: Option<OAuthToken>,
}

/// On-disk representation; the secret is kept base64url encoded.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_secret: Option<String>,
    #[serde(default)]
    token: Option<OAuthToken>,
}

// ============================================================================
// CredentialStore Trait
// ============================================================================

/// Durable storage for the session secret and token.
#[async_trait]
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    /// Load whatever is stored. Missing storage yields empty credentials.
    async fn load(&self) -> Result<StoredCredentials>;

    /// Store the session secret, keeping the token.
    async fn save_secret(&self, secret: &SessionSecret) -> Result<()>;

    /// Store the token (`None` removes it), keeping the secret.
    async fn save_token(&self, token: Option<&OAuthToken>) -> Result<()>;

    /// Remove all stored credentials.
    async fn clear(&self) -> Result<()>;
}

/// Shared credential store for use across async contexts.
pub type SharedCredentialStore = Arc<dyn CredentialStore>;

// ============================================================================
// FileCredentialStore
// ============================================================================

/// JSON file backed credential store.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileCredentialStore {
    /// Store credentials in `data_dir`/[`CREDENTIALS_FILE`].
    pub fn new(data_dir: &Path) -> Self {
        Self::with_path(data_dir.join(CREDENTIALS_FILE))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<CredentialsFile> {
        if !self.path.exists() {
            return Ok(CredentialsFile::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| OAuthError::Storage(format!("Failed to read credentials file: {}", e)))?;

        serde_json::from_str(&content).map_err(|e| {
            OAuthError::Serialization(format!("Failed to parse credentials file: {}", e))
        })
    }

    fn write_file(&self, file: &CredentialsFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OAuthError::Storage(format!("Failed to create credentials directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(file).map_err(|e| {
            OAuthError::Serialization(format!("Failed to serialize credentials: {}", e))
        })?;

        std::fs::write(&self.path, json)
            .map_err(|e| OAuthError::Storage(format!("Failed to write credentials file: {}", e)))?;
        restrict_permissions(&self.path);
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to restrict credentials file permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<StoredCredentials> {
        let _guard = self.lock.read().await;
        let file = self.read_file()?;

        let session_secret = match file.session_secret {
            Some(encoded) => Some(SessionSecret::decode(&encoded).ok_or_else(|| {
                OAuthError::Storage("Stored session secret is corrupt".to_string())
            })?),
            None => None,
        };

        Ok(StoredCredentials {
            session_secret,
            token: file.token,
        })
    }

    async fn save_secret(&self, secret: &SessionSecret) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut file = self.read_file()?;
        file.session_secret = Some(secret.encode());
        self.write_file(&file)?;
        tracing::debug!("Session secret saved to {}", self.path.display());
        Ok(())
    }

    async fn save_token(&self, token: Option<&OAuthToken>) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut file = self.read_file()?;
        file.token = token.cloned();
        self.write_file(&file)?;
        tracing::debug!("Token saved to {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.write().await;
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                OAuthError::Storage(format!("Failed to delete credentials file: {}", e))
            })?;
        }
        Ok(())
    }
}

// ============================================================================
// MemoryCredentialStore (for testing)
// ============================================================================

/// In-memory credential store for testing.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<StoredCredentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: StoredCredentials) -> Self {
        Self {
            inner: RwLock::new(credentials),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<StoredCredentials> {
        Ok(self.inner.read().await.clone())
    }

    async fn save_secret(&self, secret: &SessionSecret) -> Result<()> {
        self.inner.write().await.session_secret = Some(secret.clone());
        Ok(())
    }

    async fn save_token(&self, token: Option<&OAuthToken>) -> Result<()> {
        self.inner.write().await.token = token.cloned();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.inner.write().await = StoredCredentials::default();
        Ok(())
    }
}
