//! TOML configuration.
//!
//! Every section is optional; a file containing only `[repository]` is a
//! complete config. Without `[repository]` the engine serves the synthetic
//! dataset.

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use repo_scout_core::search::{
    SearchParams, SearchWeights, MAX_PRIORITY_BOOST, MIN_PRIORITY_BOOST,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub repository: Option<RepositoryConfig>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub explorer: ExplorerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// All defaults, no repository.
    pub fn minimal() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RepositoryConfig {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub branch: Option<String>,
}

impl RepositoryConfig {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            branch: None,
        }
    }

    /// Cache identity: `"{owner}/{name}"`.
    pub fn fingerprint(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_token_env")]
    pub token_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            max_pages: default_max_pages(),
            per_page: default_per_page(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> Option<String> {
    Some("GITHUB_TOKEN".to_string())
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_max_retries() -> u32 {
    2
}
fn default_max_pages() -> u32 {
    10
}
fn default_per_page() -> u32 {
    100
}
fn default_user_agent() -> String {
    format!("repo-scout/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExplorerConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_min_extractions")]
    pub min_extractions: usize,
    #[serde(default = "default_max_files_per_directory")]
    pub max_files_per_directory: usize,
    #[serde(default = "default_max_total_files")]
    pub max_total_files: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_large_repositories")]
    pub large_repositories: Vec<String>,
    #[serde(default)]
    pub extra_paths: Vec<String>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub budgets: BudgetConfig,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            min_extractions: default_min_extractions(),
            max_files_per_directory: default_max_files_per_directory(),
            max_total_files: default_max_total_files(),
            max_file_bytes: default_max_file_bytes(),
            large_repositories: default_large_repositories(),
            extra_paths: Vec::new(),
            include_globs: default_include_globs(),
            exclude_globs: default_exclude_globs(),
            budgets: BudgetConfig::default(),
        }
    }
}

fn default_max_depth() -> usize {
    3
}
fn default_min_extractions() -> usize {
    5
}
fn default_max_files_per_directory() -> usize {
    25
}
fn default_max_total_files() -> usize {
    400
}
fn default_max_file_bytes() -> u64 {
    200_000
}
fn default_large_repositories() -> Vec<String> {
    vec!["TryGhost/Ghost".to_string()]
}

fn default_include_globs() -> Vec<String> {
    [
        "*.js", "*.jsx", "*.mjs", "*.cjs", "*.ts", "*.tsx", "*.vue", "*.svelte", "*.astro",
        "*.py", "*.rb", "*.go", "*.rs", "*.java", "*.kt", "*.php", "*.cs", "*.swift",
        "*.md", "*.mdx", "*.rst", "*.txt", "*.html", "*.hbs", "*.handlebars", "*.ejs",
        "*.json", "*.yml", "*.yaml", "*.toml", "*.ini", ".env.example", "Dockerfile",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_exclude_globs() -> Vec<String> {
    [
        "package-lock.json",
        "yarn.lock",
        "pnpm-lock.yaml",
        "*.lock",
        "*.min.js",
        "*.min.css",
        "*.map",
        "*.snap",
        "*.bundle.js",
        "*.chunk.js",
        "*.d.ts",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Path-attempt budgets per repository scale.
#[derive(Debug, Deserialize, Clone)]
pub struct BudgetConfig {
    #[serde(default = "default_budget_small")]
    pub small: usize,
    #[serde(default = "default_budget_medium")]
    pub medium: usize,
    #[serde(default = "default_budget_large")]
    pub large: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            small: default_budget_small(),
            medium: default_budget_medium(),
            large: default_budget_large(),
        }
    }
}

fn default_budget_small() -> usize {
    40
}
fn default_budget_medium() -> usize {
    80
}
fn default_budget_large() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_priority_boost")]
    pub priority_boost: f64,
    #[serde(default)]
    pub weights: WeightsConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            min_score: default_min_score(),
            priority_boost: default_priority_boost(),
            weights: WeightsConfig::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn to_search_params(&self) -> SearchParams {
        SearchParams {
            weights: SearchWeights {
                keyword: self.weights.keyword,
                content: self.weights.content,
                word_boundary: self.weights.word_boundary,
                path: self.weights.path,
                metadata: self.weights.metadata,
            },
            limit: self.limit,
            min_score: self.min_score,
            priority_boost: self.priority_boost,
        }
    }
}

fn default_limit() -> usize {
    20
}
fn default_min_score() -> f64 {
    0.5
}
fn default_priority_boost() -> f64 {
    1.25
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeightsConfig {
    #[serde(default = "default_w_keyword")]
    pub keyword: f64,
    #[serde(default = "default_w_content")]
    pub content: f64,
    #[serde(default = "default_w_word_boundary")]
    pub word_boundary: f64,
    #[serde(default = "default_w_path")]
    pub path: f64,
    #[serde(default = "default_w_metadata")]
    pub metadata: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            keyword: default_w_keyword(),
            content: default_w_content(),
            word_boundary: default_w_word_boundary(),
            path: default_w_path(),
            metadata: default_w_metadata(),
        }
    }
}

fn default_w_keyword() -> f64 {
    10.0
}
fn default_w_content() -> f64 {
    3.0
}
fn default_w_word_boundary() -> f64 {
    2.0
}
fn default_w_path() -> f64 {
    2.0
}
fn default_w_metadata() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default = "default_cache_key")]
    pub key: String,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
    #[serde(default = "default_cache_version")]
    pub version: u32,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            key: default_cache_key(),
            ttl_days: default_ttl_days(),
            version: default_cache_version(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./data/scout.sqlite")
}
fn default_cache_key() -> String {
    "scan-cache".to_string()
}
fn default_ttl_days() -> u32 {
    14
}
fn default_cache_version() -> u32 {
    3
}
fn default_max_bytes() -> usize {
    4_000_000
}

/// Thresholds deciding whether a crawl produced real data.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassificationConfig {
    #[serde(default = "default_min_processed_files")]
    pub min_processed_files: usize,
    #[serde(default = "default_min_round_trips")]
    pub min_round_trips: u64,
    #[serde(default = "default_max_synthetic_overlap")]
    pub max_synthetic_overlap: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            min_processed_files: default_min_processed_files(),
            min_round_trips: default_min_round_trips(),
            max_synthetic_overlap: default_max_synthetic_overlap(),
        }
    }
}

fn default_min_processed_files() -> usize {
    1
}
fn default_min_round_trips() -> u64 {
    1
}
fn default_max_synthetic_overlap() -> f64 {
    0.9
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Compile case-insensitive globs matched against file names.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if let Some(repo) = &config.repository {
        for (field, value) in [("owner", &repo.owner), ("name", &repo.name)] {
            if value.trim().is_empty() || value.contains('/') {
                bail!("repository.{} must be non-empty and must not contain '/'", field);
            }
        }
    }

    // Validate explorer
    let explorer = &config.explorer;
    if !(1..=3).contains(&explorer.max_depth) {
        bail!("explorer.max_depth must be between 1 and 3");
    }
    let budgets = &explorer.budgets;
    if budgets.small == 0 || budgets.medium == 0 || budgets.large == 0 {
        bail!("explorer.budgets must all be > 0");
    }
    if explorer.max_files_per_directory == 0 || explorer.max_total_files == 0 {
        bail!("explorer.max_files_per_directory and explorer.max_total_files must be > 0");
    }
    build_globset(&explorer.include_globs).context("explorer.include_globs")?;
    build_globset(&explorer.exclude_globs).context("explorer.exclude_globs")?;

    // Validate retrieval
    if config.retrieval.limit < 1 {
        bail!("retrieval.limit must be >= 1");
    }
    if !(config.retrieval.min_score >= 0.0) {
        bail!("retrieval.min_score must be >= 0");
    }
    let w = &config.retrieval.weights;
    for (field, value) in [
        ("keyword", w.keyword),
        ("content", w.content),
        ("word_boundary", w.word_boundary),
        ("path", w.path),
        ("metadata", w.metadata),
    ] {
        if !value.is_finite() || value < 0.0 {
            bail!("retrieval.weights.{} must be a finite number >= 0", field);
        }
    }
    if !(MIN_PRIORITY_BOOST..=MAX_PRIORITY_BOOST).contains(&config.retrieval.priority_boost) {
        bail!(
            "retrieval.priority_boost must be between {} and {}",
            MIN_PRIORITY_BOOST,
            MAX_PRIORITY_BOOST
        );
    }

    // Validate cache
    if config.cache.ttl_days < 1 {
        bail!("cache.ttl_days must be >= 1");
    }
    if config.cache.key.trim().is_empty() {
        bail!("cache.key must not be empty");
    }

    if !(0.0..=1.0).contains(&config.classification.max_synthetic_overlap) {
        bail!("classification.max_synthetic_overlap must be in [0.0, 1.0]");
    }

    Ok(())
}
