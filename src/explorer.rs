//! Budgeted repository crawler.
//!
//! [`PathExplorer`] walks a remote repository through a [`ContentGateway`]
//! and feeds every accepted file through the knowledge extractors into a
//! [`KnowledgeStore`].
//!
//! # Traversal
//!
//! The crawl is a breadth-first work queue of `(path, depth)` items:
//!
//! 1. The root listing is probed. Its files are processed directly and its
//!    directories become candidates.
//! 2. Candidates are, in order: paths that succeeded in an earlier scan,
//!    top-level directories found by the probe, then conventional layout
//!    paths (an extended list for repositories configured as large).
//!    Conventional paths whose first segment is absent from a successful
//!    root probe are skipped. Duplicates are dropped.
//! 3. Subdirectories are queued (up to `max_depth`) when their name looks
//!    like source, or unconditionally while fewer than `min_extractions`
//!    files have produced entries.
//!
//! # Budgets
//!
//! - path attempts (one per `list` call), tiered by [`RepositoryScale`]
//! - processed files per directory and in total
//! - maximum file size, when the gateway reports it
//!
//! Every fetch failure is recorded in [`ScanDiagnostics::failures`] and the
//! crawl moves on. The only fatal condition is a missing repository.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use globset::GlobSet;
use repo_scout_core::extract::{self, Extractor};
use repo_scout_core::models::{PathFailure, RepositoryScale, ScanDiagnostics};
use repo_scout_core::store::KnowledgeStore;
use tracing::{debug, info, warn};

use crate::config::{build_globset, ExplorerConfig, RepositoryConfig};
use crate::progress::{ScanProgressEvent, ScanProgressReporter};
use crate::traits::{ContentGateway, ContentItem, FetchError, ItemKind};

/// Root directory count at which an unrecognised repository counts as medium.
const MEDIUM_ROOT_DIRS: usize = 8;

const CONVENTIONAL_PATHS: &[&str] = &[
    "src",
    "lib",
    "app",
    "api",
    "server",
    "core",
    "docs",
    "packages",
    "src/api",
    "src/routes",
    "src/services",
    "src/models",
    "src/controllers",
    "src/components",
    "lib/api",
    "app/api",
    "config",
];

const LARGE_REPOSITORY_PATHS: &[&str] = &[
    "ghost/core/core/server/api",
    "ghost/core/core/server/services",
    "ghost/core/core/server/models",
    "ghost/core/core/server/web",
    "ghost/core/core/frontend",
    "ghost/admin/app",
    "ghost/members-api/lib",
    "apps",
    "packages",
];

const SOURCE_DIRS: &[&str] = &[
    "src", "lib", "app", "apps", "api", "server", "core", "services", "service", "models",
    "controllers", "routes", "router", "components", "pages", "views", "handlers", "middleware",
    "utils", "helpers", "packages", "docs", "doc", "config", "frontend", "backend", "web", "cmd",
    "internal", "pkg", "modules", "features", "hooks", "members", "admin", "ghost",
];

const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    "coverage",
    "vendor",
    "target",
    "__pycache__",
    "fixtures",
    "__snapshots__",
    "tmp",
    "out",
];

/// Lifecycle of one explorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorerState {
    Idle,
    Exploring,
    Complete,
    /// No repository configured.
    Error,
}

/// Shared flag checked between candidates. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct WorkItem {
    path: String,
    depth: usize,
}

pub struct PathExplorer {
    gateway: Arc<dyn ContentGateway>,
    repository: Option<RepositoryConfig>,
    config: ExplorerConfig,
    include: GlobSet,
    exclude: GlobSet,
    extractors: Vec<Box<dyn Extractor>>,
    previous_paths: Vec<String>,
    progress: Option<Arc<dyn ScanProgressReporter>>,
    cancel: CancellationFlag,
    state: ExplorerState,
    diagnostics: ScanDiagnostics,
    productive_files: usize,
    /// Every `read` issued this scan, successful or not.
    reads_attempted: usize,
    last_percent: u8,
}

impl PathExplorer {
    pub fn new(
        gateway: Arc<dyn ContentGateway>,
        repository: Option<RepositoryConfig>,
        config: &ExplorerConfig,
    ) -> Result<Self> {
        Ok(Self {
            gateway,
            repository,
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&config.exclude_globs)?,
            config: config.clone(),
            extractors: extract::default_extractors(),
            previous_paths: Vec::new(),
            progress: None,
            cancel: CancellationFlag::new(),
            state: ExplorerState::Idle,
            diagnostics: ScanDiagnostics::default(),
            productive_files: 0,
            reads_attempted: 0,
            last_percent: 0,
        })
    }

    /// Paths that succeeded in an earlier scan; tried first.
    pub fn with_previous_paths(mut self, paths: Vec<String>) -> Self {
        self.previous_paths = paths;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ScanProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> ExplorerState {
        self.state
    }

    pub fn diagnostics(&self) -> &ScanDiagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> ScanDiagnostics {
        self.diagnostics
    }

    /// Distinct files processed so far.
    pub fn files_processed(&self) -> usize {
        self.diagnostics.unique_processed_files().len()
    }

    /// Crawl the repository into `store`.
    ///
    /// Returns `true` when at least one file was processed.
    pub async fn explore(&mut self, store: &KnowledgeStore) -> bool {
        let Some(repository) = self.repository.clone() else {
            warn!("no repository configured; nothing to explore");
            self.state = ExplorerState::Error;
            return false;
        };

        let fingerprint = repository.fingerprint();
        self.state = ExplorerState::Exploring;
        self.diagnostics = ScanDiagnostics::new(&fingerprint);
        self.diagnostics.started_at = Some(chrono::Utc::now());
        self.productive_files = 0;
        self.reads_attempted = 0;
        self.last_percent = 0;
        self.emit(ScanProgressEvent::Discovering {
            repository: fingerprint.clone(),
        });

        // Root probe.
        let root = self.visit(&WorkItem { path: String::new(), depth: 0 }, store).await;
        let root_dirs: Vec<String> = root
            .as_ref()
            .map(|items| {
                items
                    .iter()
                    .filter(|i| i.kind == ItemKind::Dir && !is_ignored_dir(&i.name))
                    .map(|i| i.path.clone())
                    .collect()
            })
            .unwrap_or_default();

        let scale = self.detect_scale(&fingerprint, root.as_deref());
        self.diagnostics.scale = scale;
        let budget = self.path_budget(scale);
        info!(repository = %fingerprint, ?scale, budget, "exploring repository");

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(String::new());
        let mut queue: VecDeque<WorkItem> = VecDeque::new();
        for path in self.candidate_paths(scale, root.is_some(), &root_dirs) {
            if seen.insert(path.clone()) {
                let depth = path.split('/').count();
                queue.push_back(WorkItem { path, depth });
            }
        }

        while let Some(item) = queue.pop_front() {
            if self.cancel.is_cancelled() {
                info!(remaining = queue.len(), "scan cancelled");
                break;
            }
            if self.diagnostics.attempted_paths.len() >= budget {
                debug!(budget, remaining = queue.len(), "path budget exhausted");
                break;
            }
            if self.reads_attempted >= self.config.max_total_files {
                debug!("total file budget exhausted");
                break;
            }

            let listing = self.visit(&item, store).await;
            self.emit_exploring(&item.path, budget);

            let Some(items) = listing else { continue };
            if item.depth >= self.config.max_depth {
                continue;
            }
            for child in items.iter().filter(|i| i.kind == ItemKind::Dir) {
                if !self.should_descend(&child.name) || !seen.insert(child.path.clone()) {
                    continue;
                }
                queue.push_back(WorkItem {
                    path: child.path.clone(),
                    depth: item.depth + 1,
                });
            }
        }

        self.diagnostics.finished_at = Some(chrono::Utc::now());
        self.state = ExplorerState::Complete;
        let files = self.files_processed();
        self.emit(ScanProgressEvent::Complete {
            files_processed: files,
            paths_attempted: self.diagnostics.attempted_paths.len(),
        });
        info!(
            files,
            attempted = self.diagnostics.attempted_paths.len(),
            failures = self.diagnostics.failures.len(),
            "exploration complete"
        );
        files > 0
    }

    /// List one directory and process its files. `None` on a failed listing.
    async fn visit(&mut self, item: &WorkItem, store: &KnowledgeStore) -> Option<Vec<ContentItem>> {
        self.diagnostics.attempted_paths.push(item.path.clone());
        let items = match self.gateway.list(&item.path).await {
            Ok(items) => items,
            Err(e) => {
                self.record_failure(&item.path, &e);
                return None;
            }
        };
        if !items.is_empty() {
            self.diagnostics.successful_paths.push(item.path.clone());
        }

        let mut files: Vec<&ContentItem> = items.iter().filter(|i| i.kind == ItemKind::File).collect();
        files.sort_by_key(|f| (file_rank(&f.name), f.name.to_ascii_lowercase()));

        let mut in_directory = 0;
        for file in files {
            if in_directory >= self.config.max_files_per_directory
                || self.reads_attempted >= self.config.max_total_files
            {
                break;
            }
            if !self.is_relevant_file(file) {
                self.diagnostics.skipped_files += 1;
                continue;
            }
            // Failed reads cost a request too.
            in_directory += 1;
            self.reads_attempted += 1;
            self.process_file(&file.path, store).await;
        }

        Some(items)
    }

    async fn process_file(&mut self, path: &str, store: &KnowledgeStore) {
        let content = match self.gateway.read(path).await {
            Ok(content) => content,
            Err(e) => {
                self.record_failure(path, &e);
                return;
            }
        };

        let knowledge = extract::extract_with(&self.extractors, &content, path);
        let entries = extract::to_entries(&knowledge, path, &content);
        debug!(path, entries = entries.len(), "processed file");
        if !entries.is_empty() {
            self.productive_files += 1;
        }
        store.extend(entries);
        self.diagnostics.processed_files.push(path.to_string());
    }

    fn record_failure(&mut self, path: &str, err: &FetchError) {
        match err {
            FetchError::NotFound(_) => debug!(path, "not found"),
            _ => warn!(path, error = %err, "fetch failed"),
        }
        self.diagnostics.failures.push(PathFailure {
            path: path.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    fn is_relevant_file(&self, file: &ContentItem) -> bool {
        if let Some(size) = file.size {
            if size == 0 || size > self.config.max_file_bytes {
                return false;
            }
        }
        self.include.is_match(&file.name) && !self.exclude.is_match(&file.name)
    }

    fn should_descend(&self, name: &str) -> bool {
        if is_ignored_dir(name) {
            return false;
        }
        is_source_dir(name) || self.productive_files < self.config.min_extractions
    }

    fn detect_scale(&self, fingerprint: &str, root: Option<&[ContentItem]>) -> RepositoryScale {
        let recognised = self
            .config
            .large_repositories
            .iter()
            .any(|r| r.eq_ignore_ascii_case(fingerprint));
        if recognised {
            return RepositoryScale::Large;
        }
        let dirs = root
            .map(|items| items.iter().filter(|i| i.kind == ItemKind::Dir).count())
            .unwrap_or(0);
        if dirs >= MEDIUM_ROOT_DIRS {
            RepositoryScale::Medium
        } else {
            RepositoryScale::Small
        }
    }

    fn path_budget(&self, scale: RepositoryScale) -> usize {
        let budgets = &self.config.budgets;
        match scale {
            RepositoryScale::Small => budgets.small,
            RepositoryScale::Medium => budgets.medium,
            RepositoryScale::Large => budgets.large,
        }
    }

    fn candidate_paths(
        &self,
        scale: RepositoryScale,
        root_known: bool,
        root_dirs: &[String],
    ) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        candidates.extend(self.previous_paths.iter().filter(|p| !p.is_empty()).cloned());

        let mut discovered: Vec<&String> = root_dirs.iter().collect();
        discovered.sort_by_key(|p| !is_source_dir(p));
        candidates.extend(discovered.into_iter().cloned());

        let statics: Vec<&str> = match scale {
            RepositoryScale::Large => LARGE_REPOSITORY_PATHS
                .iter()
                .chain(CONVENTIONAL_PATHS)
                .copied()
                .collect(),
            _ => CONVENTIONAL_PATHS.to_vec(),
        };
        for path in statics.into_iter().chain(self.config.extra_paths.iter().map(String::as_str)) {
            let top = path.split('/').next().unwrap_or(path);
            if root_known && !root_dirs.iter().any(|d| d == top) {
                continue;
            }
            candidates.push(path.trim_matches('/').to_string());
        }
        candidates.retain(|p| !p.is_empty());
        candidates
    }

    fn emit(&self, event: ScanProgressEvent) {
        if let Some(progress) = &self.progress {
            progress.report(event);
        }
    }

    fn emit_exploring(&mut self, path: &str, budget: usize) {
        let attempted = self.diagnostics.attempted_paths.len();
        let percent = ((attempted * 100) / budget.max(1)).min(99) as u8;
        self.last_percent = self.last_percent.max(percent);
        self.emit(ScanProgressEvent::Exploring {
            path: path.to_string(),
            percent: self.last_percent,
            files_processed: self.diagnostics.processed_files.len(),
        });
    }
}

fn is_source_dir(name: &str) -> bool {
    let last = name.rsplit('/').next().unwrap_or(name).to_ascii_lowercase();
    SOURCE_DIRS.contains(&last.as_str())
}

fn is_ignored_dir(name: &str) -> bool {
    let last = name.rsplit('/').next().unwrap_or(name);
    (last.starts_with('.') && last != ".github") || IGNORED_DIRS.contains(&last)
}

/// Files indexed first within a directory: project descriptors, then code.
fn file_rank(name: &str) -> u8 {
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("readme") || lower == "package.json" {
        0
    } else if extract::SourceFile::new(&lower, "").is_code() {
        1
    } else {
        2
    }
}
