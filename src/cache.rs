//! Scan cache.
//!
//! Persists the result of one successful scan so later runs can skip the
//! crawl. There is a single record slot (key `cache.key`); the record
//! names the repository it belongs to.
//!
//! A record is **stale**, and is deleted when read, if any of:
//! - `now - last_scan_time > ttl_days`
//! - `cache_version` differs from the configured version
//! - `repository_id` differs from the requested fingerprint
//!
//! Records are wrapped in an envelope carrying a SHA-256 of the payload.
//! A record that fails to parse or verify is treated as absent and deleted.
//!
//! # Size limits
//!
//! Before writing, scoring hints are pruned (depth, key count, string
//! length). If the record is still larger than `cache.max_bytes`, hints are
//! dropped and entry content truncated; then the snapshot itself is cut
//! down proportionally for up to three passes before giving up with
//! [`CacheError::TooLarge`].

use std::collections::BTreeMap;
use std::sync::Arc;

use repo_scout_core::models::{KnowledgeEntry, ScanDiagnostics};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::kv::KeyValueStore;

const MAX_HINT_DEPTH: usize = 4;
const MAX_HINT_KEYS: usize = 32;
const MAX_HINT_STRING: usize = 1024;
const FALLBACK_CONTENT_CHARS: usize = 2000;
const SHRINK_PASSES: usize = 3;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache persistence failed: {0}")]
    Persistence(String),
    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("scan record too large to cache ({bytes} bytes, limit {limit})")]
    TooLarge { bytes: usize, limit: usize },
}

/// A persisted scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanCacheRecord {
    pub repository_id: String,
    pub knowledge_snapshot: Vec<KnowledgeEntry>,
    pub diagnostics: ScanDiagnostics,
    pub fetch_confirmed: bool,
    /// Epoch milliseconds.
    pub last_scan_time: i64,
    pub cache_version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    checksum: String,
    payload: String,
}

/// Why a record was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Expired,
    VersionMismatch,
    FingerprintMismatch,
}

pub struct ScanCache {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    ttl_ms: i64,
    version: u32,
    max_bytes: usize,
}

impl ScanCache {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: &CacheConfig) -> Self {
        Self {
            kv,
            key: config.key.clone(),
            ttl_ms: i64::from(config.ttl_days) * MS_PER_DAY,
            version: config.version,
            max_bytes: config.max_bytes,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Build a record stamped with the current time and cache version.
    pub fn new_record(
        &self,
        repository_id: &str,
        knowledge_snapshot: Vec<KnowledgeEntry>,
        diagnostics: ScanDiagnostics,
        fetch_confirmed: bool,
    ) -> ScanCacheRecord {
        ScanCacheRecord {
            repository_id: repository_id.to_string(),
            knowledge_snapshot,
            diagnostics,
            fetch_confirmed,
            last_scan_time: now_ms(),
            cache_version: self.version,
        }
    }

    /// The valid record for `id`, deleting whatever is stored if it is
    /// corrupt or stale.
    pub async fn get(&self, id: &str) -> Option<ScanCacheRecord> {
        let record = self.load().await?;
        match self.staleness(&record, id, now_ms()) {
            None => Some(record),
            Some(reason) => {
                info!(
                    stored = %record.repository_id,
                    requested = id,
                    ?reason,
                    "cached scan is stale, removing"
                );
                self.remove_logged().await;
                None
            }
        }
    }

    /// Whether `id` has no usable record. Deletes stale records.
    pub async fn is_stale(&self, id: &str) -> bool {
        self.get(id).await.is_none()
    }

    /// Write `record` as the cached scan for `id`.
    pub async fn put(&self, id: &str, mut record: ScanCacheRecord) -> Result<usize, CacheError> {
        record.repository_id = id.to_string();
        let envelope = self.encode(record)?;
        let bytes = envelope.len();
        self.kv
            .set(&self.key, &envelope)
            .await
            .map_err(|e| CacheError::Persistence(format!("{:#}", e)))?;
        debug!(id, bytes, "scan cached");
        Ok(bytes)
    }

    /// Remove the stored record if it belongs to `id`. Unreadable records
    /// are removed too.
    pub async fn invalidate(&self, id: &str) -> Result<(), CacheError> {
        match self.peek().await {
            Ok(Some(record)) if record.repository_id != id => {
                debug!(
                    id,
                    stored = %record.repository_id,
                    "cached scan belongs to another repository"
                );
                Ok(())
            }
            Ok(None) => Ok(()),
            _ => {
                debug!(id, "invalidating scan cache");
                self.clear().await
            }
        }
    }

    /// Remove whatever record is stored.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.kv
            .remove(&self.key)
            .await
            .map_err(|e| CacheError::Persistence(format!("{:#}", e)))
    }

    /// The stored record regardless of staleness, without deleting anything.
    pub async fn peek(&self) -> Result<Option<ScanCacheRecord>, CacheError> {
        let raw = self
            .kv
            .get(&self.key)
            .await
            .map_err(|e| CacheError::Persistence(format!("{:#}", e)))?;
        match raw {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Size in bytes of the stored envelope.
    pub async fn stored_size(&self) -> Result<Option<usize>, CacheError> {
        self.kv
            .get(&self.key)
            .await
            .map(|raw| raw.map(|r| r.len()))
            .map_err(|e| CacheError::Persistence(format!("{:#}", e)))
    }

    pub fn staleness(&self, record: &ScanCacheRecord, id: &str, now_ms: i64) -> Option<Staleness> {
        if now_ms - record.last_scan_time > self.ttl_ms {
            Some(Staleness::Expired)
        } else if record.cache_version != self.version {
            Some(Staleness::VersionMismatch)
        } else if record.repository_id != id {
            Some(Staleness::FingerprintMismatch)
        } else {
            None
        }
    }

    async fn load(&self) -> Option<ScanCacheRecord> {
        let raw = match self.kv.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to read scan cache");
                return None;
            }
        };
        match decode(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "corrupt scan cache record, removing");
                self.remove_logged().await;
                None
            }
        }
    }

    async fn remove_logged(&self) {
        if let Err(e) = self.kv.remove(&self.key).await {
            warn!(error = %e, "failed to remove scan cache record");
        }
    }

    fn encode(&self, mut record: ScanCacheRecord) -> Result<String, CacheError> {
        for entry in &mut record.knowledge_snapshot {
            prune_hints(&mut entry.metadata.hints);
        }
        let mut payload = serde_json::to_string(&record)?;

        if payload.len() > self.max_bytes {
            debug!(bytes = payload.len(), "dropping hints and trimming content");
            for entry in &mut record.knowledge_snapshot {
                entry.metadata.hints.clear();
                truncate_chars(&mut entry.content, FALLBACK_CONTENT_CHARS);
            }
            payload = serde_json::to_string(&record)?;
        }

        let mut pass = 0;
        while payload.len() > self.max_bytes && pass < SHRINK_PASSES {
            let keep = (record.knowledge_snapshot.len() as f64 * self.max_bytes as f64
                / payload.len() as f64
                * 0.9) as usize;
            warn!(
                bytes = payload.len(),
                limit = self.max_bytes,
                keep,
                "truncating cached snapshot"
            );
            if keep == 0 {
                break;
            }
            record.knowledge_snapshot.truncate(keep);
            payload = serde_json::to_string(&record)?;
            pass += 1;
        }

        if payload.len() > self.max_bytes {
            return Err(CacheError::TooLarge {
                bytes: payload.len(),
                limit: self.max_bytes,
            });
        }

        let envelope = Envelope {
            checksum: checksum(&payload),
            payload,
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

fn decode(raw: &str) -> Result<ScanCacheRecord, CacheError> {
    let envelope: Envelope = serde_json::from_str(raw)?;
    if checksum(&envelope.payload) != envelope.checksum {
        return Err(CacheError::Persistence("checksum mismatch".to_string()));
    }
    Ok(serde_json::from_str(&envelope.payload)?)
}

fn checksum(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn truncate_chars(s: &mut String, max_chars: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max_chars) {
        s.truncate(idx);
    }
}

fn prune_hints(hints: &mut BTreeMap<String, Value>) {
    while hints.len() > MAX_HINT_KEYS {
        if hints.pop_last().is_none() {
            break;
        }
    }
    for value in hints.values_mut() {
        prune_value(value, 1);
    }
}

fn prune_value(value: &mut Value, depth: usize) {
    match value {
        Value::String(s) => truncate_chars(s, MAX_HINT_STRING),
        Value::Array(_) | Value::Object(_) if depth >= MAX_HINT_DEPTH => *value = Value::Null,
        Value::Array(items) => {
            items.truncate(MAX_HINT_KEYS);
            for item in items {
                prune_value(item, depth + 1);
            }
        }
        Value::Object(map) => {
            let overflow: Vec<String> = map.keys().skip(MAX_HINT_KEYS).cloned().collect();
            for key in overflow {
                map.remove(&key);
            }
            for item in map.values_mut() {
                prune_value(item, depth + 1);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use repo_scout_core::synthetic::synthetic_entries;
    use serde_json::json;

    fn cache_with(kv: Arc<MemoryKv>, max_bytes: usize) -> ScanCache {
        let config = CacheConfig {
            max_bytes,
            ..CacheConfig::default()
        };
        ScanCache::new(kv, &config)
    }

    fn record(cache: &ScanCache, id: &str) -> ScanCacheRecord {
        let mut diagnostics = ScanDiagnostics::new(id);
        diagnostics.processed_files.push("README.md".to_string());
        cache.new_record(id, synthetic_entries(), diagnostics, true)
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let kv = Arc::new(MemoryKv::new());
        let cache = cache_with(kv, 4_000_000);
        let rec = record(&cache, "o/r");
        cache.put("o/r", rec.clone()).await.unwrap();
        assert!(!cache.is_stale("o/r").await);
        assert_eq!(cache.get("o/r").await, Some(rec));
    }

    #[tokio::test]
    async fn expired_record_is_deleted() {
        let kv = Arc::new(MemoryKv::new());
        let cache = cache_with(kv.clone(), 4_000_000);
        let mut rec = record(&cache, "o/r");
        rec.last_scan_time = now_ms() - 15 * MS_PER_DAY;
        cache.put("o/r", rec).await.unwrap();
        assert!(cache.get("o/r").await.is_none());
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn version_and_fingerprint_mismatch_delete() {
        let kv = Arc::new(MemoryKv::new());
        let cache = cache_with(kv.clone(), 4_000_000);
        let mut rec = record(&cache, "o/r");
        rec.cache_version = cache.version() + 1;
        cache.put("o/r", rec).await.unwrap();
        assert!(cache.is_stale("o/r").await);
        assert!(kv.is_empty());

        let rec = record(&cache, "o/r");
        cache.put("o/r", rec).await.unwrap();
        assert!(cache.get("other/repo").await.is_none());
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn corrupt_record_is_treated_as_absent() {
        let kv = Arc::new(MemoryKv::new());
        kv.set("scan-cache", "{not json").await.unwrap();
        let cache = cache_with(kv.clone(), 4_000_000);
        assert!(cache.get("o/r").await.is_none());
        assert!(kv.is_empty());

        let rec = record(&cache, "o/r");
        cache.put("o/r", rec).await.unwrap();
        let raw = kv.get("scan-cache").await.unwrap().unwrap();
        kv.set("scan-cache", &raw.replace("README.md", "README.mx"))
            .await
            .unwrap();
        assert!(cache.get("o/r").await.is_none());
    }

    #[test]
    fn hints_are_pruned() {
        let mut hints = BTreeMap::new();
        for i in 0..40 {
            hints.insert(format!("k{:02}", i), json!("x".repeat(2000)));
        }
        hints.insert(
            "deep".to_string(),
            json!({"a": {"b": {"c": {"d": {"e": 1}}}}}),
        );
        prune_hints(&mut hints);
        assert_eq!(hints.len(), MAX_HINT_KEYS);
        assert_eq!(hints["k00"].as_str().unwrap().len(), MAX_HINT_STRING);
        assert_eq!(hints["deep"], json!({"a": {"b": {"c": null}}}));
    }

    #[tokio::test]
    async fn snapshot_is_never_shrunk_to_nothing() {
        let kv = Arc::new(MemoryKv::new());
        let probe = cache_with(kv.clone(), 4_000_000);
        let mut empty = record(&probe, "o/r");
        empty.knowledge_snapshot.clear();
        let base = serde_json::to_string(&empty).unwrap().len();

        // Room for the record shell but not for a single entry.
        let cache = cache_with(kv.clone(), base + 20);
        let rec = record(&cache, "o/r");
        assert!(matches!(
            cache.put("o/r", rec).await,
            Err(CacheError::TooLarge { .. })
        ));
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn invalidate_only_removes_the_named_repository() {
        let kv = Arc::new(MemoryKv::new());
        let cache = cache_with(kv.clone(), 4_000_000);
        cache.put("o/r", record(&cache, "o/r")).await.unwrap();

        cache.invalidate("other/repo").await.unwrap();
        assert!(cache.peek().await.unwrap().is_some());

        cache.invalidate("o/r").await.unwrap();
        assert!(kv.is_empty());

        kv.set("scan-cache", "{not json").await.unwrap();
        cache.invalidate("o/r").await.unwrap();
        assert!(kv.is_empty());

        cache.put("o/r", record(&cache, "o/r")).await.unwrap();
        cache.clear().await.unwrap();
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn oversized_snapshot_is_shrunk_or_rejected() {
        let kv = Arc::new(MemoryKv::new());
        let cache = cache_with(kv.clone(), 3_000);
        let mut rec = record(&cache, "o/r");
        for entry in &mut rec.knowledge_snapshot {
            entry.content = "y".repeat(1500);
        }
        cache.put("o/r", rec).await.unwrap();
        let stored = cache.get("o/r").await.unwrap();
        assert!(stored.knowledge_snapshot.len() < 8);

        let tiny = cache_with(kv, 10);
        let rec = record(&tiny, "o/r");
        assert!(matches!(
            tiny.put("o/r", rec).await,
            Err(CacheError::TooLarge { .. })
        ));
    }
}
