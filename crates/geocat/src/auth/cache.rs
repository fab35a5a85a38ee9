//! On-disk token cache for the interactive flow.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{CacheError, Error};

use super::tokens::Token;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Persisted token record.
///
/// Exactly `access_token`, `refresh_token` (nullable) and `expires_at`
/// (epoch seconds).
#[derive(Debug, Serialize, Deserialize)]
struct CachedToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: serde_json::Number,
}

/// A JSON file holding one [`Token`].
///
/// Writes go to a uniquely named sibling temp file that is renamed into
/// place, so a concurrent reader sees either the old record or a complete
/// new one, even when several processes save at once.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    /// Create a cache backed by `path`. Nothing is touched until used.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached token.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Option<Token>, Error> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No token cache file");
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let cached: CachedToken =
            serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        let secs = cached.expires_at.as_f64().unwrap_or(0.0);
        let expires_at = DateTime::from_timestamp(secs.trunc() as i64, 0).unwrap_or_default();

        Ok(Some(Token::new(
            cached.access_token,
            cached.refresh_token,
            expires_at,
        )))
    }

    /// Persist `token`, replacing any previous record.
    #[instrument(skip(self, token), fields(path = %self.path.display()))]
    pub async fn save(&self, token: &Token) -> Result<(), Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let record = CachedToken {
            access_token: token.access_token().as_str().to_string(),
            refresh_token: token.refresh_token().map(|t| t.as_str().to_string()),
            expires_at: token.expires_at().timestamp().into(),
        };
        let json = serde_json::to_vec_pretty(&record).map_err(|source| CacheError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_private(&path, &json))
            .await
            .map_err(|e| self.io_error(std::io::Error::other(e)))?
            .map_err(|e| self.io_error(e))?;

        debug!("Token cache written");
        Ok(())
    }

    /// Remove the cache file if present.
    pub async fn clear(&self) -> Result<(), Error> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> Error {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
        .into()
    }
}

/// Write `contents` to a fresh temp file next to `path`, then rename it over
/// `path`.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    tmp.as_file()
        .set_permissions(std::fs::Permissions::from_mode(0o600))?;

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn at(secs: i64) -> chrono::DateTime<chrono::Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path().join("token.json"));
        assert!(cache.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_creates_parent_directories_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path().join("nested/deeper/token.json"));
        let token = Token::new("access", Some("refresh".into()), at(1_700_000_000));

        cache.save(&token).await.unwrap();
        let loaded = cache.load().await.unwrap().unwrap();

        assert_eq!(loaded.access_token(), token.access_token());
        assert_eq!(loaded.refresh_token(), token.refresh_token());
        assert_eq!(loaded.expires_at(), at(1_700_000_000));
        let entries = std::fs::read_dir(dir.path().join("nested/deeper")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn record_has_exactly_three_fields() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path().join("token.json"));
        cache
            .save(&Token::new("access", None, at(1_700_000_000)))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(cache.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 3);
        assert_eq!(object["access_token"], "access");
        assert!(object["refresh_token"].is_null());
        assert_eq!(object["expires_at"], 1_700_000_000);
    }

    #[tokio::test]
    async fn fractional_expiry_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(
            &path,
            r#"{"access_token":"a","refresh_token":null,"expires_at":1700000000.75}"#,
        )
        .unwrap();

        let token = TokenCache::new(&path).load().await.unwrap().unwrap();
        assert_eq!(token.expires_at(), at(1_700_000_000));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();

        let err = TokenCache::new(&path).load().await.unwrap_err();
        assert!(matches!(err, Error::Cache(CacheError::Corrupt { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_leave_one_complete_record() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path().join("token.json"));

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let token = Token::new(format!("access-{i}"), None, at(1_700_000_000 + i));
                    cache.save(&token).await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let token = cache.load().await.unwrap().unwrap();
        let suffix = token.access_token().as_str().trim_start_matches("access-");
        let i: i64 = suffix.parse().unwrap();
        assert_eq!(token.expires_at(), at(1_700_000_000 + i));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path().join("token.json"));
        cache.save(&Token::new("a", None, at(1))).await.unwrap();

        cache.clear().await.unwrap();
        cache.clear().await.unwrap();
        assert!(!cache.path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cache_file_is_private() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path().join("token.json"));
        cache.save(&Token::new("a", None, at(1))).await.unwrap();

        let mode = std::fs::metadata(cache.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
