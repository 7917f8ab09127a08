//! Durable per-environment token cache.
//!
//! One JSON file per environment (`token_cache_{env}.json`) holding the
//! token and its absolute expiry. Writes go to a temp file first and are
//! renamed into place so a crash never leaves a half-written cache.

use crate::error::{AuthError, AuthResult};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use kis_core::{AccessToken, BoxFuture, Environment};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk token record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    #[serde(deserialize_with = "deserialize_expires_at")]
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn from_token(token: &AccessToken) -> Self {
        Self {
            access_token: token.value().to_string(),
            expires_at: token.expires_at(),
        }
    }

    pub fn into_token(self, environment: Environment) -> AccessToken {
        AccessToken::new(self.access_token, self.expires_at, environment)
    }
}

/// Accept RFC 3339 timestamps, and naive local timestamps written by
/// older tooling (`2024-05-01T09:00:00.123456`).
fn deserialize_expires_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_expires_at(&raw).map_err(serde::de::Error::custom)
}

fn parse_expires_at(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| format!("invalid expires_at {raw:?}: {e}"))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("expires_at {raw:?} does not exist in local time"))
}

/// Persistence seam for tokens.
pub trait TokenStore: Send + Sync {
    /// Load the cached token for `environment`. `Ok(None)` when absent.
    fn load(&self, environment: Environment) -> BoxFuture<'_, AuthResult<Option<CachedToken>>>;

    /// Replace the cached token for `environment`.
    fn save<'a>(
        &'a self,
        environment: Environment,
        token: &'a CachedToken,
    ) -> BoxFuture<'a, AuthResult<()>>;
}

/// File-backed store.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file path for an environment.
    pub fn path_for(&self, environment: Environment) -> PathBuf {
        self.dir
            .join(format!("token_cache_{}.json", environment.as_str()))
    }

    async fn load_file(&self, environment: Environment) -> AuthResult<Option<CachedToken>> {
        let path = self.path_for(environment);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let token: CachedToken = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::Cache(format!("{}: {e}", path.display())))?;
        debug!(%environment, path = %path.display(), "Loaded cached token");
        Ok(Some(token))
    }

    async fn save_file(&self, environment: Environment, token: &CachedToken) -> AuthResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(environment);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(token)?;

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(%environment, path = %path.display(), "Saved token cache");
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, environment: Environment) -> BoxFuture<'_, AuthResult<Option<CachedToken>>> {
        Box::pin(self.load_file(environment))
    }

    fn save<'a>(
        &'a self,
        environment: Environment,
        token: &'a CachedToken,
    ) -> BoxFuture<'a, AuthResult<()>> {
        Box::pin(self.save_file(environment, token))
    }
}

/// In-memory store, for tests and deployments without a writable disk.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<Environment, CachedToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, environment: Environment) -> BoxFuture<'_, AuthResult<Option<CachedToken>>> {
        let token = self.tokens.lock().get(&environment).cloned();
        Box::pin(async move { Ok(token) })
    }

    fn save<'a>(
        &'a self,
        environment: Environment,
        token: &'a CachedToken,
    ) -> BoxFuture<'a, AuthResult<()>> {
        self.tokens.lock().insert(environment, token.clone());
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_parse_rfc3339_expiry() {
        let dt = parse_expires_at("2030-01-01T00:00:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2030-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_naive_local_expiry() {
        let dt = parse_expires_at("2030-01-01T09:00:00.123456").unwrap();
        let expected = Local
            .with_ymd_and_hms(2030, 1, 1, 9, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(dt.timestamp(), expected.timestamp());
    }

    #[test]
    fn test_parse_garbage_expiry() {
        assert!(parse_expires_at("tomorrow").is_err());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip_per_environment() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path());
        assert_eq!(store.dir(), dir.path());

        assert!(store.load(Environment::Mock).await.unwrap().is_none());

        let token = CachedToken {
            access_token: "mock-token".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        store.save(Environment::Mock, &token).await.unwrap();

        assert!(dir.path().join("token_cache_mock.json").exists());
        assert!(!dir.path().join("token_cache_mock.json.tmp").exists());
        assert_eq!(store.load(Environment::Mock).await.unwrap(), Some(token));
        assert!(store.load(Environment::Live).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("token_cache_live.json"), b"{not json").unwrap();

        let store = FileTokenStore::new(dir.path());
        let err = store.load(Environment::Live).await.unwrap_err();
        assert!(matches!(err, AuthError::Cache(_)));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryTokenStore::new();
        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: Utc::now(),
        };
        store.save(Environment::Live, &token).await.unwrap();
        assert_eq!(store.load(Environment::Live).await.unwrap(), Some(token));
        assert!(store.load(Environment::Mock).await.unwrap().is_none());
    }
}
