use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use repo_scout::config::{Config, RepositoryConfig};
use repo_scout::engine::{DataSource, Engine, RepositorySource};
use repo_scout::kv::{KeyValueStore, MemoryKv};
use repo_scout::repo_scout_core::synthetic::synthetic_entries;
use repo_scout::traits::{
    ChangeInfo, ContentGateway, ContentItem, FetchError, VersionHistoryProvider,
};

/// In-memory repository that counts every call.
#[derive(Default)]
struct SpyGateway {
    dirs: HashMap<String, Vec<ContentItem>>,
    files: HashMap<String, String>,
    calls: AtomicUsize,
    successes: AtomicU64,
    failing: AtomicBool,
}

impl SpyGateway {
    fn with_files(files: &[(&str, &str)]) -> Self {
        let mut spy = SpyGateway::default();
        spy.dirs.insert(String::new(), Vec::new());
        for (path, content) in files {
            spy.add_file(path, content);
        }
        spy
    }

    fn add_file(&mut self, path: &str, content: &str) {
        let (parent, name) = split(path);
        self.add_dir(&parent);
        self.dirs
            .entry(parent)
            .or_default()
            .push(ContentItem::file(name, path, content.len() as u64));
        self.files.insert(path.to_string(), content.to_string());
    }

    fn add_dir(&mut self, path: &str) {
        if self.dirs.contains_key(path) {
            return;
        }
        self.dirs.insert(path.to_string(), Vec::new());
        if path.is_empty() {
            return;
        }
        let (parent, name) = split(path);
        self.add_dir(&parent);
        self.dirs
            .entry(parent)
            .or_default()
            .push(ContentItem::dir(name, path));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail_everything(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn answer<T: Clone>(&self, found: Option<&T>, path: &str) -> Result<T, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Network("connection reset".to_string()));
        }
        match found {
            Some(value) => {
                self.successes.fetch_add(1, Ordering::SeqCst);
                Ok(value.clone())
            }
            None => Err(FetchError::NotFound(path.to_string())),
        }
    }
}

fn split(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent.to_string(), name.to_string()),
        None => (String::new(), path.to_string()),
    }
}

#[async_trait]
impl ContentGateway for SpyGateway {
    async fn list(&self, path: &str) -> Result<Vec<ContentItem>, FetchError> {
        tokio::task::yield_now().await;
        self.answer(self.dirs.get(path), path)
    }

    async fn read(&self, path: &str) -> Result<String, FetchError> {
        self.answer(self.files.get(path), path)
    }

    fn confirmed_round_trips(&self) -> u64 {
        self.successes.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct FakeHistory {
    calls: AtomicUsize,
}

#[async_trait]
impl VersionHistoryProvider for FakeHistory {
    async fn latest_change(&self, path: &str) -> Result<Option<ChangeInfo>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if path.ends_with(".js") {
            Ok(Some(ChangeInfo {
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                author: Some("Ada".to_string()),
                author_email: None,
            }))
        } else {
            Err(FetchError::Forbidden(path.to_string()))
        }
    }
}

const PAYMENT_JS: &str = r#"/**
 * Processes subscription payments through Stripe.
 */
async function chargeSubscription(member, plan) {
  const invoice = await stripe.invoices.create({ customer: member.stripeId, plan });
  return invoice;
}

module.exports = { chargeSubscription };
"#;

const ROUTES_JS: &str = r#"const router = require('express').Router();

router.get('/api/members', listMembers);
router.post('/api/members/:id/notes', addNote);
"#;

fn shop_repo() -> SpyGateway {
    SpyGateway::with_files(&[
        ("README.md", "# Shop\n\nA small storefront used for integration tests.\n"),
        ("members/payment.js", PAYMENT_JS),
        ("src/api/routes.js", ROUTES_JS),
        ("assets/logo.png", "binary"),
    ])
}

fn blog_repo() -> SpyGateway {
    SpyGateway::with_files(&[(
        "src/posts.js",
        "/**\n * Publishes scheduled blog posts at the configured time.\n */\nfunction publishScheduled(posts) {\n  return posts.filter(isDue);\n}\n",
    )])
}

fn config_for(repo: &RepositoryConfig) -> Config {
    let mut config = Config::minimal();
    config.repository = Some(repo.clone());
    config
}

fn engine_with(spy: Arc<SpyGateway>, kv: Arc<MemoryKv>) -> Engine {
    let repo = RepositoryConfig::new("acme", "shop");
    let config = config_for(&repo);
    Engine::new(&config, Some(RepositorySource::new(repo, spy)), kv)
}

#[tokio::test]
async fn crawl_produces_real_data_and_caches_it() {
    let spy = Arc::new(shop_repo());
    let kv = Arc::new(MemoryKv::new());
    let engine = engine_with(spy.clone(), kv.clone());

    let report = engine.initialize(false).await;
    assert_eq!(report.source, DataSource::Crawl);
    assert!(!report.using_mock_data);
    assert!(!engine.is_using_mock_data());
    assert!(report.files_processed >= 3);
    assert!(report.round_trips > 0);
    assert!(kv.get("scan-cache").await.unwrap().is_some());

    let diagnostics = engine.diagnostics();
    assert_eq!(diagnostics.repository, "acme/shop");
    assert!(diagnostics
        .unique_processed_files()
        .contains(&"members/payment.js"));

    let state = engine.state();
    assert!(state.initialized);
    assert!(state.fetch_confirmed);
    assert_eq!(state.last_repository_fingerprint.as_deref(), Some("acme/shop"));
}

#[tokio::test]
async fn warm_cache_does_not_touch_the_gateway() {
    let spy = Arc::new(shop_repo());
    let kv = Arc::new(MemoryKv::new());
    let engine = engine_with(spy.clone(), kv.clone());

    engine.initialize(false).await;
    let calls = spy.calls();
    assert!(calls > 0);

    let report = engine.initialize(false).await;
    assert_eq!(report.source, DataSource::Cache);
    assert!(!report.using_mock_data);
    assert_eq!(spy.calls(), calls);

    // A fresh process sharing the cache also skips the crawl.
    let again = engine_with(spy.clone(), kv);
    let report = again.initialize(false).await;
    assert_eq!(report.source, DataSource::Cache);
    assert_eq!(spy.calls(), calls);
    assert_eq!(again.stats().total_entries, engine.stats().total_entries);
}

#[tokio::test]
async fn force_refresh_crawls_even_with_a_warm_cache() {
    let spy = Arc::new(shop_repo());
    let engine = engine_with(spy.clone(), Arc::new(MemoryKv::new()));
    engine.initialize(false).await;
    let calls = spy.calls();

    let report = engine.initialize(true).await;
    assert_eq!(report.source, DataSource::Crawl);
    assert!(spy.calls() > calls);
}

#[tokio::test]
async fn switching_repository_forces_a_fresh_crawl() {
    let kv = Arc::new(MemoryKv::new());
    let shop = Arc::new(shop_repo());
    let mut engine = engine_with(shop.clone(), kv.clone());
    engine.initialize(false).await;

    let blog = Arc::new(blog_repo());
    engine.set_repository(Some(RepositorySource::new(
        RepositoryConfig::new("acme", "blog"),
        blog.clone(),
    )));
    let report = engine.initialize(false).await;

    assert_eq!(report.source, DataSource::Crawl);
    assert!(blog.calls() > 0);
    let entries = engine.entries();
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|e| e.file_path == "src/posts.js"));
    assert_eq!(engine.diagnostics().repository, "acme/blog");
}

#[tokio::test]
async fn all_not_found_falls_back_to_synthetic_data() {
    let spy = Arc::new(SpyGateway::default());
    let engine = engine_with(spy.clone(), Arc::new(MemoryKv::new()));

    let report = engine.initialize(false).await;
    assert_eq!(report.source, DataSource::Fallback);
    assert!(report.using_mock_data);
    assert_eq!(report.files_processed, 0);
    assert!(engine.is_using_mock_data());
    assert!(spy.calls() > 0);
    assert_eq!(engine.stats().total_entries, synthetic_entries().len());
}

#[tokio::test]
async fn empty_repository_is_not_real_data() {
    let spy = Arc::new(SpyGateway::with_files(&[]));
    let kv = Arc::new(MemoryKv::new());
    let engine = engine_with(spy, kv.clone());

    let report = engine.initialize(false).await;
    assert!(report.using_mock_data);
    assert!(engine.diagnostics().processed_files.is_empty());
    assert!(engine.diagnostics().successful_paths.is_empty());
    assert!(kv.is_empty());
}

#[tokio::test]
async fn failed_refresh_keeps_cached_real_data() {
    let spy = Arc::new(shop_repo());
    let engine = engine_with(spy.clone(), Arc::new(MemoryKv::new()));
    engine.initialize(false).await;
    let before = engine.entries();

    spy.fail_everything();
    let report = engine.initialize(true).await;
    assert_eq!(report.source, DataSource::Cache);
    assert!(!engine.is_using_mock_data());
    assert_eq!(engine.entries(), before);
    assert!(engine.state().error.is_some());
}

/// Reads fine, refuses every write.
#[derive(Default)]
struct ReadOnlyKv {
    writes: AtomicUsize,
}

#[async_trait]
impl KeyValueStore for ReadOnlyKv {
    async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("quota exceeded")
    }

    async fn remove(&self, _key: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn cache_write_failure_keeps_crawled_data() {
    let spy = Arc::new(shop_repo());
    let kv = Arc::new(ReadOnlyKv::default());
    let repo = RepositoryConfig::new("acme", "shop");
    let engine = Engine::new(
        &config_for(&repo),
        Some(RepositorySource::new(repo, spy)),
        kv.clone(),
    );

    let report = engine.initialize(false).await;
    assert_eq!(kv.writes.load(Ordering::SeqCst), 1);
    assert_eq!(report.source, DataSource::Crawl);
    assert!(!report.using_mock_data);
    assert!(!engine.is_using_mock_data());
    assert!(engine.stats().total_entries > 0);
    assert!(engine
        .diagnostics()
        .unique_processed_files()
        .contains(&"members/payment.js"));
}

#[tokio::test]
async fn concurrent_initialize_runs_one_crawl() {
    let spy = Arc::new(shop_repo());
    let engine = engine_with(spy, Arc::new(MemoryKv::new()));

    let (a, b) = tokio::join!(engine.initialize(false), engine.initialize(false));
    let skipped = [a.source, b.source]
        .iter()
        .filter(|s| **s == DataSource::Skipped)
        .count();
    assert_eq!(skipped, 1);
    assert!(!engine.state().in_progress);
}

#[tokio::test]
async fn payment_question_ranks_payment_code_first() {
    let engine = engine_with(Arc::new(shop_repo()), Arc::new(MemoryKv::new()));
    engine.initialize(false).await;

    let results = engine.search("How does subscription payment work?");
    assert!(!results.is_empty());
    assert_eq!(results[0].entry.file_path, "members/payment.js");
    assert!(results[0].score > 0.0);

    let again = engine.search("How does subscription payment work?");
    let ids: Vec<&str> = results.iter().map(|r| r.entry.id.as_str()).collect();
    let ids_again: Vec<&str> = again.iter().map(|r| r.entry.id.as_str()).collect();
    assert_eq!(ids, ids_again);

    assert!(engine.search("the and of").is_empty());
    assert!(engine.search("kubernetes helm chart").is_empty());
}

#[tokio::test]
async fn history_annotation_is_memoised() {
    let repo = RepositoryConfig::new("acme", "shop");
    let history = Arc::new(FakeHistory::default());
    let source = RepositorySource::new(repo.clone(), Arc::new(shop_repo()))
        .with_history(history.clone());
    let engine = Engine::new(&config_for(&repo), Some(source), Arc::new(MemoryKv::new()));
    engine.initialize(false).await;

    let mut results = engine.search("subscription stripe members");
    assert!(!results.is_empty());
    engine.annotate_history(&mut results).await;
    let first_calls = history.calls.load(Ordering::SeqCst);

    for r in &results {
        if r.entry.file_path.ends_with(".js") {
            assert!(r.entry.last_updated.is_some());
        } else {
            assert!(r.entry.last_updated.is_none());
        }
    }

    let distinct_js: std::collections::BTreeSet<String> = results
        .iter()
        .map(|r| r.entry.file_path.clone())
        .filter(|p| p.ends_with(".js"))
        .collect();
    engine.annotate_history(&mut results).await;
    let second_calls = history.calls.load(Ordering::SeqCst) - first_calls;
    // Successful lookups are memoised; failures are retried.
    assert_eq!(
        second_calls,
        results
            .iter()
            .map(|r| r.entry.file_path.as_str())
            .filter(|p| !p.ends_with(".js"))
            .count()
    );
    assert!(first_calls >= distinct_js.len());
}

#[tokio::test]
async fn no_repository_serves_synthetic_data() {
    let engine = Engine::new(&Config::minimal(), None, Arc::new(MemoryKv::new()));
    let report = engine.initialize(false).await;
    assert_eq!(report.source, DataSource::Synthetic);
    assert!(engine.is_using_mock_data());
    assert!(!engine.search("stripe subscription payment").is_empty());
}
