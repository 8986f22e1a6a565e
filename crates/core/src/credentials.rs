// Keyed credential store for OAuth access tokens

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Default margin before `expires_at` at which a token is treated as expired.
pub const DEFAULT_EXPIRY_SKEW_SECS: i64 = 30;

/// An access token and when it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCredential {
    pub access_token: String,
    /// `None` means the issuer gave no lifetime; such a token never expires locally.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedCredential {
    pub fn new(access_token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Build from an OAuth `expires_in` value (seconds from now).
    pub fn expiring_in(access_token: impl Into<String>, expires_in_secs: Option<i64>) -> Self {
        Self::new(
            access_token,
            expires_in_secs.map(|secs| Utc::now() + Duration::seconds(secs)),
        )
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now + skew >= expires_at,
            None => false,
        }
    }
}

/// Storage for credentials shared by tools, keyed by provider name.
///
/// `set` replaces whatever was stored under the key.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<CachedCredential>;

    async fn set(&self, key: &str, credential: CachedCredential);

    /// True when nothing is stored under `key` or the stored token has expired.
    async fn is_expired(&self, key: &str) -> bool;

    async fn clear(&self, key: &str);

    /// The stored token, if it is still usable.
    async fn valid(&self, key: &str) -> Option<CachedCredential> {
        if self.is_expired(key).await {
            None
        } else {
            self.get(key).await
        }
    }
}

/// Process-local credential store.
pub struct InMemoryCredentialStore {
    credentials: RwLock<HashMap<String, CachedCredential>>,
    skew: Duration,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::with_skew(Duration::seconds(DEFAULT_EXPIRY_SKEW_SECS))
    }

    pub fn with_skew(skew: Duration) -> Self {
        Self {
            credentials: RwLock::new(HashMap::new()),
            skew,
        }
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, key: &str) -> Option<CachedCredential> {
        self.credentials.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, credential: CachedCredential) {
        self.credentials
            .write()
            .await
            .insert(key.to_string(), credential);
        tracing::debug!(key, "Stored credential");
    }

    async fn is_expired(&self, key: &str) -> bool {
        match self.credentials.read().await.get(key) {
            Some(credential) => credential.is_expired_at(Utc::now(), self.skew),
            None => true,
        }
    }

    async fn clear(&self, key: &str) {
        if self.credentials.write().await.remove(key).is_some() {
            tracing::debug!(key, "Cleared credential");
        }
    }
}
