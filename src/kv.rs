//! String key-value persistence behind the scan cache.
//!
//! [`SqliteKv`] is the on-disk medium (one row per key in `kv_entries`);
//! [`MemoryKv`] backs tests and `--ephemeral` runs.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Async string-keyed storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// Wrap a pool whose schema has been created by
    /// [`crate::migrate::run_migrations`].
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl KeyValueStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryKv {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_kv_roundtrip() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("a").await.unwrap(), None);
        kv.set("a", "1").await.unwrap();
        kv.set("a", "2").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("2"));
        kv.remove("a").await.unwrap();
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn sqlite_kv_upserts_and_removes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = crate::db::connect(&tmp.path().join("nested/cache.sqlite"))
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        // Idempotent.
        crate::migrate::run_migrations(&pool).await.unwrap();

        let kv = SqliteKv::new(pool);
        kv.set("scan", "{}").await.unwrap();
        kv.set("scan", "{\"v\":1}").await.unwrap();
        assert_eq!(kv.get("scan").await.unwrap().as_deref(), Some("{\"v\":1}"));
        kv.remove("scan").await.unwrap();
        assert_eq!(kv.get("scan").await.unwrap(), None);
    }
}
