/// Token revocation cache
///
/// Records the jti of every revoked token for as long as the token itself
/// could still be presented. Entries expire on their own; nothing here
/// needs a cleanup job.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::error::{AppError, CacheError};

#[async_trait]
pub trait RevocationCache: Send + Sync {
    /// Marks `jti` as revoked for `ttl`. Revoking twice is not an error.
    async fn revoke(&self, jti: &str, ttl: Duration) -> Result<(), AppError>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, AppError>;
}

// ============================================================================
// Redis
// ============================================================================

#[derive(Clone)]
pub struct RedisBlocklist {
    connection: ConnectionManager,
}

impl RedisBlocklist {
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(url)
            .map_err(|e| AppError::Cache(CacheError::Unavailable(e.to_string())))?;
        let connection = ConnectionManager::new(client).await?;

        tracing::info!("Connected to revocation cache");
        Ok(Self { connection })
    }
}

#[async_trait]
impl RevocationCache for RedisBlocklist {
    async fn revoke(&self, jti: &str, ttl: Duration) -> Result<(), AppError> {
        // EX only takes whole seconds and rejects 0
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.connection.clone();

        redis::cmd("SET")
            .arg(jti)
            .arg("")
            .arg("EX")
            .arg(seconds)
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, AppError> {
        let mut conn = self.connection.clone();
        let exists: bool = redis::cmd("EXISTS").arg(jti).query_async(&mut conn).await?;
        Ok(exists)
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
pub struct InMemoryBlocklist {
    entries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryBlocklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Instant>>, AppError> {
        self.entries
            .lock()
            .map_err(|_| AppError::Cache(CacheError::Unavailable("blocklist lock poisoned".to_string())))
    }
}

#[async_trait]
impl RevocationCache for InMemoryBlocklist {
    async fn revoke(&self, jti: &str, ttl: Duration) -> Result<(), AppError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        entries.retain(|_, expires_at| *expires_at > now);
        entries.insert(jti.to_string(), now + ttl);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, AppError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        match entries.get(jti) {
            Some(expires_at) if *expires_at > now => Ok(true),
            Some(_) => {
                entries.remove(jti);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_revoked_jti_is_reported() {
        let blocklist = InMemoryBlocklist::new();
        blocklist.revoke("abc123", Duration::from_secs(60)).await.unwrap();

        assert!(blocklist.is_revoked("abc123").await.unwrap());
        assert!(!blocklist.is_revoked("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let blocklist = InMemoryBlocklist::new();
        blocklist.revoke("abc123", Duration::from_millis(50)).await.unwrap();
        assert!(blocklist.is_revoked("abc123").await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(!blocklist.is_revoked("abc123").await.unwrap());
        assert!(blocklist.is_empty());
    }

    #[tokio::test]
    async fn test_revoking_twice_is_idempotent() {
        let blocklist = InMemoryBlocklist::new();
        blocklist.revoke("abc123", Duration::from_secs(60)).await.unwrap();
        blocklist.revoke("abc123", Duration::from_secs(60)).await.unwrap();

        assert_eq!(blocklist.len(), 1);
        assert!(blocklist.is_revoked("abc123").await.unwrap());
    }
}
