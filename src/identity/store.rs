//! Identity persistence.
//!
//! [`LocalIdentityCache`] is the same-origin cache: one JSON file per account.
//! [`SsoIdentityStore`] fronts the cross-origin SSO service and writes through
//! to the local cache, so a later restore can skip the network round trip.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use url::Url;

use super::AuthIdentity;
use super::authenticator::normalize_wallet_address;
use crate::config::SsoConfig;
use crate::error::IdentityError;

/// Cross-origin identity store keyed by lowercase account.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fetch the identity from the remote store.
    async fn get_identity(&self, account: &str) -> Result<Option<AuthIdentity>, IdentityError>;

    /// Read the same-origin cache without touching the network.
    fn local_get_identity(&self, account: &str) -> Option<AuthIdentity>;

    async fn store_identity(
        &self,
        account: &str,
        identity: &AuthIdentity,
    ) -> Result<(), IdentityError>;

    async fn clear_identity(&self, account: &str) -> Result<(), IdentityError>;
}

/// File-backed same-origin identity cache.
///
/// Reads through [`LocalIdentityCache::get`] are synchronous so the restore
/// path can consult the cache without a suspension point; writes are async.
#[derive(Debug, Clone)]
pub struct LocalIdentityCache {
    dir: PathBuf,
}

impl LocalIdentityCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, account: &str) -> Result<PathBuf, IdentityError> {
        let account = normalize_wallet_address(account).ok_or_else(|| IdentityError::Store {
            reason: format!("invalid account '{account}'"),
        })?;
        Ok(self.dir.join(format!("single-sign-on-{account}.json")))
    }

    /// Cached identity for `account`. Expired or invalid entries are evicted.
    pub fn get(&self, account: &str) -> Option<AuthIdentity> {
        let path = self.entry_path(account).ok()?;
        match decode_entry(&path, std::fs::read(&path)) {
            Entry::Usable(identity) => Some(identity),
            Entry::Missing => None,
            Entry::Evict => {
                let _ = std::fs::remove_file(&path);
                None
            }
        }
    }

    /// Async variant of [`LocalIdentityCache::get`].
    pub async fn load(&self, account: &str) -> Option<AuthIdentity> {
        let path = self.entry_path(account).ok()?;
        match decode_entry(&path, tokio::fs::read(&path).await) {
            Entry::Usable(identity) => Some(identity),
            Entry::Missing => None,
            Entry::Evict => {
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }

    pub async fn put(&self, account: &str, identity: &AuthIdentity) -> Result<(), IdentityError> {
        let path = self.entry_path(account)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let serialized = serde_json::to_vec_pretty(identity)?;

        // The entry holds the ephemeral private key: create it owner-only
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&path).await?;
        file.write_all(&serialized).await?;
        file.flush().await?;

        // An entry left by an older write may predate the restrictive mode
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tracing::debug!("Cached identity at {}", path.display());
        Ok(())
    }

    pub async fn remove(&self, account: &str) -> Result<(), IdentityError> {
        let path = self.entry_path(account)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

enum Entry {
    Usable(AuthIdentity),
    Missing,
    Evict,
}

fn decode_entry(path: &Path, read: std::io::Result<Vec<u8>>) -> Entry {
    let data = match read {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Entry::Missing,
        Err(e) => {
            tracing::warn!("Failed to read identity cache {}: {}", path.display(), e);
            return Entry::Missing;
        }
    };

    match serde_json::from_slice::<AuthIdentity>(&data) {
        Ok(identity) if super::is_valid(Some(&identity)) => Entry::Usable(identity),
        Ok(_) => {
            tracing::debug!("Evicting unusable cached identity {}", path.display());
            Entry::Evict
        }
        Err(e) => {
            tracing::warn!("Evicting malformed identity cache {}: {}", path.display(), e);
            Entry::Evict
        }
    }
}

#[async_trait]
impl IdentityStore for LocalIdentityCache {
    async fn get_identity(&self, account: &str) -> Result<Option<AuthIdentity>, IdentityError> {
        Ok(self.load(account).await)
    }

    fn local_get_identity(&self, account: &str) -> Option<AuthIdentity> {
        self.get(account)
    }

    async fn store_identity(
        &self,
        account: &str,
        identity: &AuthIdentity,
    ) -> Result<(), IdentityError> {
        self.put(account, identity).await
    }

    async fn clear_identity(&self, account: &str) -> Result<(), IdentityError> {
        self.remove(account).await
    }
}

/// SSO identity service client with a write-through local cache.
///
/// Without a configured URL it behaves as the local cache alone.
#[derive(Debug, Clone)]
pub struct SsoIdentityStore {
    cache: LocalIdentityCache,
    remote: Option<SsoRemote>,
}

#[derive(Debug, Clone)]
struct SsoRemote {
    client: Client,
    base_url: Url,
}

impl SsoIdentityStore {
    pub fn new(
        cache: LocalIdentityCache,
        base_url: Option<Url>,
        timeout: Duration,
    ) -> Result<Self, IdentityError> {
        let remote = match base_url {
            Some(base_url) => {
                let client = Client::builder()
                    .timeout(timeout)
                    .build()
                    .map_err(|e| IdentityError::Store {
                        reason: format!("failed to build SSO client: {e}"),
                    })?;
                Some(SsoRemote { client, base_url })
            }
            None => None,
        };
        Ok(Self { cache, remote })
    }

    pub fn from_config(config: &SsoConfig) -> Result<Self, IdentityError> {
        Self::new(
            LocalIdentityCache::new(config.cache_dir.clone()),
            config.url.clone(),
            config.timeout,
        )
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }
}

impl SsoRemote {
    /// `{base_url}/identities/{account}`, keeping any path on the base URL.
    fn identity_url(&self, account: &str) -> Result<Url, IdentityError> {
        let account = normalize_wallet_address(account).ok_or_else(|| IdentityError::Store {
            reason: format!("invalid account '{account}'"),
        })?;
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| IdentityError::Store {
                reason: format!("SSO URL '{}' cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .push("identities")
            .push(&account);
        Ok(url)
    }

    async fn get(&self, account: &str) -> Result<Option<AuthIdentity>, IdentityError> {
        let url = self.identity_url(account)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(store_request_failed)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status().map_err(store_request_failed)?;
        let identity = response
            .json::<Option<AuthIdentity>>()
            .await
            .map_err(store_request_failed)?;
        Ok(identity)
    }

    async fn put(&self, account: &str, identity: &AuthIdentity) -> Result<(), IdentityError> {
        let url = self.identity_url(account)?;
        self.client
            .put(url)
            .json(identity)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(store_request_failed)?;
        Ok(())
    }

    async fn delete(&self, account: &str) -> Result<(), IdentityError> {
        let url = self.identity_url(account)?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(store_request_failed)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        response.error_for_status().map_err(store_request_failed)?;
        Ok(())
    }
}

fn store_request_failed(e: reqwest::Error) -> IdentityError {
    IdentityError::Store {
        reason: e.to_string(),
    }
}

#[async_trait]
impl IdentityStore for SsoIdentityStore {
    async fn get_identity(&self, account: &str) -> Result<Option<AuthIdentity>, IdentityError> {
        let Some(remote) = &self.remote else {
            return Ok(self.cache.load(account).await);
        };

        let identity = remote.get(account).await?;
        if let Some(identity) = &identity
            && super::is_valid(Some(identity))
            && let Err(e) = self.cache.put(account, identity).await
        {
            tracing::warn!("Failed to cache identity for {}: {}", account, e);
        }
        Ok(identity)
    }

    fn local_get_identity(&self, account: &str) -> Option<AuthIdentity> {
        self.cache.get(account)
    }

    async fn store_identity(
        &self,
        account: &str,
        identity: &AuthIdentity,
    ) -> Result<(), IdentityError> {
        self.cache.put(account, identity).await?;
        if let Some(remote) = &self.remote {
            remote.put(account, identity).await?;
        }
        Ok(())
    }

    async fn clear_identity(&self, account: &str) -> Result<(), IdentityError> {
        self.cache.remove(account).await?;
        if let Some(remote) = &self.remote {
            remote.delete(account).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tests::{ACCOUNT, identity_for, valid_identity};
    use chrono::{Duration as ChronoDuration, Utc};
    use tempfile::tempdir;

    fn entry(dir: &Path) -> PathBuf {
        dir.join(format!("single-sign-on-{ACCOUNT}.json"))
    }

    #[tokio::test]
    async fn cache_round_trip_is_keyed_by_lowercase_account() {
        let dir = tempdir().unwrap();
        let cache = LocalIdentityCache::new(dir.path());
        let identity = valid_identity(ACCOUNT);

        cache
            .put(&ACCOUNT.to_ascii_uppercase().replace("0X", "0x"), &identity)
            .await
            .unwrap();
        let loaded = cache.get(ACCOUNT).expect("cached identity");
        assert_eq!(loaded, identity);
        assert_eq!(cache.load(ACCOUNT).await, Some(identity));
        assert!(entry(dir.path()).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cache_entries_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let cache = LocalIdentityCache::new(dir.path());
        cache.put(ACCOUNT, &valid_identity(ACCOUNT)).await.unwrap();

        let mode = std::fs::metadata(entry(dir.path()))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn rewriting_a_loose_entry_tightens_it() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = entry(dir.path());
        std::fs::write(&path, b"{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let cache = LocalIdentityCache::new(dir.path());
        cache.put(ACCOUNT, &valid_identity(ACCOUNT)).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(cache.get(ACCOUNT).is_some());
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_on_read() {
        let dir = tempdir().unwrap();
        let cache = LocalIdentityCache::new(dir.path());
        let expired = identity_for(ACCOUNT, Utc::now() - ChronoDuration::minutes(5));

        cache.put(ACCOUNT, &expired).await.unwrap();
        assert!(cache.get(ACCOUNT).is_none());
        assert!(!entry(dir.path()).exists());

        cache.put(ACCOUNT, &expired).await.unwrap();
        assert!(cache.load(ACCOUNT).await.is_none());
        assert!(!entry(dir.path()).exists());
    }

    #[tokio::test]
    async fn malformed_accounts_are_rejected() {
        let dir = tempdir().unwrap();
        let cache = LocalIdentityCache::new(dir.path());
        assert!(
            cache
                .put("../escape", &valid_identity(ACCOUNT))
                .await
                .is_err()
        );
        assert!(cache.get("../escape").is_none());
    }

    #[tokio::test]
    async fn local_only_store_clears_cache() {
        let dir = tempdir().unwrap();
        let store = SsoIdentityStore::new(
            LocalIdentityCache::new(dir.path()),
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(!store.is_remote());

        store
            .store_identity(ACCOUNT, &valid_identity(ACCOUNT))
            .await
            .unwrap();
        assert!(store.local_get_identity(ACCOUNT).is_some());
        assert!(store.get_identity(ACCOUNT).await.unwrap().is_some());

        store.clear_identity(ACCOUNT).await.unwrap();
        assert!(store.local_get_identity(ACCOUNT).is_none());
        store.clear_identity(ACCOUNT).await.unwrap();
    }

    fn remote_for(base: &str) -> SsoIdentityStore {
        SsoIdentityStore::new(
            LocalIdentityCache::new("/tmp/unused"),
            Some(Url::parse(base).unwrap()),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn remote_urls_are_built_per_account() {
        let store = remote_for("https://id.example.org/api/");
        let remote = store.remote.as_ref().unwrap();
        assert_eq!(
            remote.identity_url(ACCOUNT).unwrap().as_str(),
            format!("https://id.example.org/api/identities/{ACCOUNT}")
        );
        assert!(remote.identity_url("not-an-account").is_err());
    }

    #[test]
    fn remote_urls_keep_base_path_without_trailing_slash() {
        let expected = format!("https://id.example.org/api/identities/{ACCOUNT}");
        for base in ["https://id.example.org/api", "https://id.example.org/api/"] {
            let store = remote_for(base);
            let url = store.remote.as_ref().unwrap().identity_url(ACCOUNT).unwrap();
            assert_eq!(url.as_str(), expected, "base {base}");
        }

        let store = remote_for("https://id.example.org");
        let url = store.remote.as_ref().unwrap().identity_url(ACCOUNT).unwrap();
        assert_eq!(
            url.as_str(),
            format!("https://id.example.org/identities/{ACCOUNT}")
        );
    }

    #[test]
    fn store_from_config_carries_remote_when_url_is_set() {
        let dir = tempdir().unwrap();
        let mut config = SsoConfig {
            url: Some(Url::parse("https://id.example.org").unwrap()),
            timeout: Duration::from_millis(250),
            cache_dir: dir.path().to_path_buf(),
        };
        assert!(SsoIdentityStore::from_config(&config).unwrap().is_remote());

        config.url = None;
        assert!(!SsoIdentityStore::from_config(&config).unwrap().is_remote());
    }

    #[tokio::test]
    async fn unreachable_remote_surfaces_store_error() {
        let dir = tempdir().unwrap();
        let store = SsoIdentityStore::new(
            LocalIdentityCache::new(dir.path()),
            Some(Url::parse("http://127.0.0.1:9").unwrap()),
            Duration::from_millis(250),
        )
        .unwrap();

        let err = store.get_identity(ACCOUNT).await.unwrap_err();
        assert!(matches!(err, IdentityError::Store { .. }), "{err:?}");
    }
}
