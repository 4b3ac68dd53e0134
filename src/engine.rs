//! Scan orchestration.
//!
//! [`Engine`] owns the knowledge store, the scan cache and the
//! initialization state for one process, and decides where the served
//! data comes from:
//!
//! ```text
//! initialize(force)
//!   ├─ already in progress ───────────────▶ no-op (Skipped)
//!   ├─ no repository ─────────────────────▶ synthetic dataset (mock)
//!   ├─ !force && cache valid ─────────────▶ cached snapshot
//!   └─ crawl ─┬─ classified real ─────────▶ store + cache (real)
//!             └─ insufficient ─┬─ cached ─▶ cached snapshot (real)
//!                              └─ else ───▶ crawl ∪ synthetic (mock)
//! ```
//!
//! A change of repository fingerprint since the previous call forces a
//! crawl regardless of `force`. Synthetic data is never reported as real,
//! and a failed crawl never discards a valid cached scan.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use chrono::{DateTime, Utc};
use repo_scout_core::models::{KnowledgeEntry, KnowledgeStats, ScanDiagnostics};
use repo_scout_core::search::{self, ScoredEntry, SearchParams};
use repo_scout_core::store::KnowledgeStore;
use repo_scout_core::synthetic::{synthetic_entries, synthetic_overlap};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, ScanCache, ScanCacheRecord};
use crate::config::{ClassificationConfig, Config, ExplorerConfig, RepositoryConfig};
use crate::connector_github::{GitHubGateway, GitHubHistory};
use crate::explorer::{CancellationFlag, PathExplorer};
use crate::kv::{KeyValueStore, MemoryKv, SqliteKv};
use crate::progress::ScanProgressReporter;
use crate::traits::{ContentGateway, VersionHistoryProvider};
use crate::{db, migrate};

/// Process-wide record of what the engine last did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InitializationState {
    pub in_progress: bool,
    pub last_init_time: Option<DateTime<Utc>>,
    pub using_mock_data: bool,
    pub initialized: bool,
    pub fetch_confirmed: bool,
    pub error: Option<String>,
    pub last_repository_fingerprint: Option<String>,
}

/// Where the data served after an `initialize` call came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// No repository configured.
    Synthetic,
    Cache,
    Crawl,
    /// Crawl was insufficient; crawl results merged with synthetic data.
    Fallback,
    /// Another initialization was running; nothing changed.
    Skipped,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataSource::Synthetic => "synthetic",
            DataSource::Cache => "cache",
            DataSource::Crawl => "crawl",
            DataSource::Fallback => "fallback",
            DataSource::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome of one `initialize` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitReport {
    pub source: DataSource,
    pub using_mock_data: bool,
    pub entries: usize,
    pub files_processed: usize,
    pub failures: usize,
    /// Successful gateway round-trips during this call.
    pub round_trips: u64,
}

/// A repository plus the collaborators that read it.
#[derive(Clone)]
pub struct RepositorySource {
    pub repository: RepositoryConfig,
    pub gateway: Arc<dyn ContentGateway>,
    pub history: Option<Arc<dyn VersionHistoryProvider>>,
}

impl RepositorySource {
    pub fn new(repository: RepositoryConfig, gateway: Arc<dyn ContentGateway>) -> Self {
        Self {
            repository,
            gateway,
            history: None,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn VersionHistoryProvider>) -> Self {
        self.history = Some(history);
        self
    }

    /// GitHub gateway and history provider for `config.repository`.
    pub fn github(config: &Config) -> Result<Option<Self>> {
        let Some(repository) = config.repository.clone() else {
            return Ok(None);
        };
        let gateway = Arc::new(GitHubGateway::new(&repository, &config.gateway)?);
        let history = Arc::new(GitHubHistory::new(gateway.clone()));
        Ok(Some(Self::new(repository, gateway).with_history(history)))
    }
}

/// Clears `in_progress` when an initialization ends, however it ends.
struct InProgressGuard<'a>(&'a Mutex<InitializationState>);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        lock(self.0).in_progress = false;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Engine {
    source: Option<RepositorySource>,
    explorer: ExplorerConfig,
    classification: ClassificationConfig,
    search_params: SearchParams,
    cache: ScanCache,
    store: KnowledgeStore,
    state: Mutex<InitializationState>,
    diagnostics: Mutex<ScanDiagnostics>,
    history_memo: Mutex<HashMap<String, Option<DateTime<Utc>>>>,
    progress: Option<Arc<dyn ScanProgressReporter>>,
    cancel: CancellationFlag,
}

impl Engine {
    pub fn new(config: &Config, source: Option<RepositorySource>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            source,
            explorer: config.explorer.clone(),
            classification: config.classification.clone(),
            search_params: config.retrieval.to_search_params(),
            cache: ScanCache::new(kv, &config.cache),
            store: KnowledgeStore::new(),
            state: Mutex::new(InitializationState::default()),
            diagnostics: Mutex::new(ScanDiagnostics::default()),
            history_memo: Mutex::new(HashMap::new()),
            progress: None,
            cancel: CancellationFlag::new(),
        }
    }

    /// Engine over GitHub and the SQLite cache (or an in-memory one when
    /// `ephemeral`).
    pub async fn from_config(config: &Config, ephemeral: bool) -> Result<Self> {
        let kv: Arc<dyn KeyValueStore> = if ephemeral {
            Arc::new(MemoryKv::new())
        } else {
            let pool = db::connect(&config.cache.path).await?;
            migrate::run_migrations(&pool).await?;
            Arc::new(SqliteKv::new(pool))
        };
        Ok(Self::new(config, RepositorySource::github(config)?, kv))
    }

    pub fn with_progress(mut self, progress: Arc<dyn ScanProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Switch repositories. The next `initialize` crawls unless the cache
    /// holds a valid scan for the new fingerprint and this engine never
    /// served another one.
    pub fn set_repository(&mut self, source: Option<RepositorySource>) {
        self.source = source;
        lock(&self.history_memo).clear();
    }

    pub fn repository(&self) -> Option<&RepositoryConfig> {
        self.source.as_ref().map(|s| &s.repository)
    }

    /// Flag checked by the crawler between candidate paths.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn cache(&self) -> &ScanCache {
        &self.cache
    }

    /// Make the store usable, crawling if needed. Never fails: on any
    /// problem the store holds cached or synthetic data and
    /// [`Engine::is_using_mock_data`] says which.
    pub async fn initialize(&self, force_refresh: bool) -> InitReport {
        let busy = {
            let mut state = lock(&self.state);
            std::mem::replace(&mut state.in_progress, true)
        };
        if busy {
            debug!("initialization already in progress");
            return self.report(DataSource::Skipped, 0);
        }
        let _guard = InProgressGuard(&self.state);

        let Some(source) = self.source.clone() else {
            info!("no repository configured, serving synthetic data");
            self.store.replace(synthetic_entries());
            *lock(&self.diagnostics) = ScanDiagnostics::default();
            self.finish(|state| {
                state.using_mock_data = true;
                state.fetch_confirmed = false;
                state.error = Some("no repository configured".to_string());
                state.last_repository_fingerprint = None;
            });
            return self.report(DataSource::Synthetic, 0);
        };

        let fingerprint = source.repository.fingerprint();
        let previous = lock(&self.state).last_repository_fingerprint.clone();
        let switched = previous.as_deref().is_some_and(|p| p != fingerprint);
        if switched {
            info!(from = ?previous, to = %fingerprint, "repository changed, forcing refresh");
            lock(&self.history_memo).clear();
        }

        if !(force_refresh || switched) {
            if let Some(record) = self.cache.get(&fingerprint).await {
                info!(repository = %fingerprint, entries = record.knowledge_snapshot.len(), "using cached scan");
                self.load_record(record, &fingerprint);
                return self.report(DataSource::Cache, 0);
            }
        }

        self.crawl(&source, &fingerprint).await
    }

    async fn crawl(&self, source: &RepositorySource, fingerprint: &str) -> InitReport {
        let previous_paths = self.previous_successful_paths(fingerprint).await;
        let before = source.gateway.confirmed_round_trips();
        let scratch = KnowledgeStore::new();

        let diagnostics = match PathExplorer::new(
            source.gateway.clone(),
            Some(source.repository.clone()),
            &self.explorer,
        ) {
            Ok(explorer) => {
                let mut explorer = explorer
                    .with_previous_paths(previous_paths)
                    .with_cancellation(self.cancel.clone());
                if let Some(progress) = &self.progress {
                    explorer = explorer.with_progress(progress.clone());
                }
                explorer.explore(&scratch).await;
                explorer.into_diagnostics()
            }
            Err(e) => {
                warn!(error = %e, "could not start explorer");
                ScanDiagnostics::new(fingerprint)
            }
        };

        let round_trips = source
            .gateway
            .confirmed_round_trips()
            .saturating_sub(before);
        let entries = scratch.snapshot();

        match classify(&diagnostics, round_trips, &entries, &self.classification) {
            Ok(()) => {
                info!(
                    repository = %fingerprint,
                    entries = entries.len(),
                    files = diagnostics.unique_processed_files().len(),
                    round_trips,
                    "scan classified as real data"
                );
                let record = self
                    .cache
                    .new_record(fingerprint, entries.clone(), diagnostics.clone(), true);
                if let Err(e) = self.cache.put(fingerprint, record).await {
                    warn!(error = %e, "failed to cache scan");
                }
                self.store.replace(entries);
                *lock(&self.diagnostics) = diagnostics;
                self.finish(|state| {
                    state.using_mock_data = false;
                    state.fetch_confirmed = true;
                    state.error = None;
                    state.last_repository_fingerprint = Some(fingerprint.to_string());
                });
                self.report(DataSource::Crawl, round_trips)
            }
            Err(reason) => {
                warn!(repository = %fingerprint, %reason, "scan insufficient");
                if let Some(record) = self.cache.get(fingerprint).await {
                    info!("keeping previously cached scan");
                    self.load_record(record, fingerprint);
                    lock(&self.state).error = Some(reason);
                    return self.report(DataSource::Cache, round_trips);
                }

                let mut merged = entries;
                merged.extend(synthetic_entries());
                self.store.replace(merged);
                *lock(&self.diagnostics) = diagnostics;
                self.finish(|state| {
                    state.using_mock_data = true;
                    state.fetch_confirmed = round_trips > 0;
                    state.error = Some(reason);
                    state.last_repository_fingerprint = Some(fingerprint.to_string());
                });
                self.report(DataSource::Fallback, round_trips)
            }
        }
    }

    /// Paths that worked last time for this repository.
    async fn previous_successful_paths(&self, fingerprint: &str) -> Vec<String> {
        {
            let diagnostics = lock(&self.diagnostics);
            if diagnostics.repository == fingerprint && !diagnostics.successful_paths.is_empty() {
                return diagnostics.successful_paths.clone();
            }
        }
        match self.cache.peek().await {
            Ok(Some(record)) if record.repository_id == fingerprint => {
                record.diagnostics.successful_paths
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                debug!(error = %e, "no previous paths from cache");
                Vec::new()
            }
        }
    }

    fn load_record(&self, record: ScanCacheRecord, fingerprint: &str) {
        let confirmed = record.fetch_confirmed;
        self.store.replace(record.knowledge_snapshot);
        *lock(&self.diagnostics) = record.diagnostics;
        self.finish(|state| {
            state.using_mock_data = false;
            state.fetch_confirmed = confirmed;
            state.error = None;
            state.last_repository_fingerprint = Some(fingerprint.to_string());
        });
    }

    fn finish(&self, update: impl FnOnce(&mut InitializationState)) {
        let mut state = lock(&self.state);
        state.initialized = true;
        state.last_init_time = Some(Utc::now());
        update(&mut state);
    }

    fn report(&self, source: DataSource, round_trips: u64) -> InitReport {
        let diagnostics = lock(&self.diagnostics);
        InitReport {
            source,
            using_mock_data: lock(&self.state).using_mock_data,
            entries: self.store.len(),
            files_processed: diagnostics.unique_processed_files().len(),
            failures: diagnostics.failures.len(),
            round_trips,
        }
    }

    /// Rank stored entries for `query` with the configured parameters.
    pub fn search(&self, query: &str) -> Vec<ScoredEntry> {
        search::search(&self.store, query, &self.search_params, false)
    }

    /// Like [`Engine::search`] with an optional limit override and score
    /// explanations.
    pub fn search_with(&self, query: &str, limit: Option<usize>, explain: bool) -> Vec<ScoredEntry> {
        let mut params = self.search_params.clone();
        if let Some(limit) = limit {
            params.limit = limit;
        }
        search::search(&self.store, query, &params, explain)
    }

    /// Fill `last_updated` from version history. Lookups are memoised per
    /// path; failures leave the field empty.
    pub async fn annotate_history(&self, results: &mut [ScoredEntry]) {
        let Some(history) = self.source.as_ref().and_then(|s| s.history.clone()) else {
            return;
        };
        for result in results.iter_mut() {
            let path = result.entry.file_path.clone();
            let cached = lock(&self.history_memo).get(&path).copied();
            let timestamp = match cached {
                Some(ts) => ts,
                None => match history.latest_change(&path).await {
                    Ok(change) => {
                        let ts = change.map(|c| c.timestamp);
                        lock(&self.history_memo).insert(path, ts);
                        ts
                    }
                    Err(e) => {
                        debug!(path = %result.entry.file_path, error = %e, "history lookup failed");
                        None
                    }
                },
            };
            result.entry.last_updated = timestamp;
        }
    }

    pub fn stats(&self) -> KnowledgeStats {
        self.store.stats()
    }

    pub fn diagnostics(&self) -> ScanDiagnostics {
        lock(&self.diagnostics).clone()
    }

    pub fn is_using_mock_data(&self) -> bool {
        lock(&self.state).using_mock_data
    }

    pub fn state(&self) -> InitializationState {
        lock(&self.state).clone()
    }

    pub fn entries(&self) -> Vec<KnowledgeEntry> {
        self.store.snapshot()
    }

    /// Empty the store and forget the last scan. The cache is untouched.
    pub fn clear(&self) {
        self.store.clear();
        *lock(&self.diagnostics) = ScanDiagnostics::default();
        lock(&self.history_memo).clear();
        let mut state = lock(&self.state);
        state.initialized = false;
        state.using_mock_data = false;
        state.fetch_confirmed = false;
        state.error = None;
    }

    /// Drop the cached scan, whichever repository it belongs to.
    pub async fn clear_cache(&self) -> Result<(), CacheError> {
        self.cache.clear().await
    }
}

/// Decide whether a crawl produced real repository data.
pub fn classify(
    diagnostics: &ScanDiagnostics,
    round_trips: u64,
    entries: &[KnowledgeEntry],
    thresholds: &ClassificationConfig,
) -> Result<(), String> {
    let files = diagnostics.unique_processed_files().len();
    if files < thresholds.min_processed_files.max(1) {
        return Err(format!("{} files processed", files));
    }
    if round_trips < thresholds.min_round_trips.max(1) {
        return Err(format!("{} confirmed round-trips", round_trips));
    }
    let overlap = synthetic_overlap(entries);
    if overlap > thresholds.max_synthetic_overlap {
        return Err(format!("{:.0}% of entries match the synthetic dataset", overlap * 100.0));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostics_with(files: &[&str]) -> ScanDiagnostics {
        let mut d = ScanDiagnostics::new("o/r");
        d.processed_files = files.iter().map(|f| f.to_string()).collect();
        d
    }

    fn real_entries() -> Vec<KnowledgeEntry> {
        let content = "function charge() {}";
        let knowledge = repo_scout_core::extract::extract(content, "src/pay.js");
        repo_scout_core::extract::to_entries(&knowledge, "src/pay.js", content)
    }

    #[test]
    fn classification_thresholds() {
        let t = ClassificationConfig::default();
        let real = real_entries();
        assert!(classify(&diagnostics_with(&["src/pay.js"]), 3, &real, &t).is_ok());
        assert!(classify(&diagnostics_with(&[]), 3, &real, &t).is_err());
        assert!(classify(&diagnostics_with(&["src/pay.js"]), 0, &real, &t).is_err());
        assert!(classify(&diagnostics_with(&["src/pay.js"]), 3, &synthetic_entries(), &t).is_err());
    }

    #[tokio::test]
    async fn no_repository_serves_synthetic_data() {
        let engine = Engine::new(&Config::minimal(), None, Arc::new(MemoryKv::new()));
        let report = engine.initialize(false).await;
        assert_eq!(report.source, DataSource::Synthetic);
        assert!(report.using_mock_data);
        assert!(engine.is_using_mock_data());
        assert_eq!(engine.stats().total_entries, synthetic_entries().len());
        let state = engine.state();
        assert!(state.initialized);
        assert!(!state.in_progress);
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let engine = Engine::new(&Config::minimal(), None, Arc::new(MemoryKv::new()));
        engine.initialize(false).await;
        engine.clear();
        assert_eq!(engine.stats().total_entries, 0);
        assert!(!engine.state().initialized);
    }
}
