//! # Repo Scout
//!
//! Budgeted knowledge crawler and keyword retrieval engine for remote
//! source repositories.
//!
//! Repo Scout walks a repository through the GitHub contents API, extracts
//! comments, functions, classes, exports, routes and prose from the files it
//! finds, and answers free-text queries with a heuristic ranking. Scans are
//! cached per repository for a configurable TTL, and every result is labelled
//! as real repository data or synthetic fallback data.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────┐
//! │ GitHub API   │──▶│ PathExplorer │──▶│ KnowledgeStore │
//! │ (gateway)    │   │ + extractors │   │  (in memory)   │
//! └──────────────┘   └──────┬───────┘   └───────┬────────┘
//!                           │ diagnostics       │ search
//!                           ▼                   ▼
//!                    ┌─────────────┐      ┌──────────┐
//!                    │  ScanCache  │      │   CLI    │
//!                    │  (SQLite)   │      │ (scout)  │
//!                    └─────────────┘      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! scout init                          # create the cache database
//! scout scan                          # crawl (or load from cache)
//! scout search "subscription payment" --explain
//! scout diagnostics                   # what the last scan touched
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`traits`] | Gateway and history collaborator traits |
//! | [`connector_github`] | GitHub contents/commits implementation |
//! | [`explorer`] | Budgeted breadth-first crawler |
//! | [`cache`] | Fingerprinted, TTL-validated scan cache |
//! | [`kv`] | Key-value persistence behind the cache |
//! | [`engine`] | Orchestration and provenance |
//! | [`progress`] | Scan progress reporting |
//! | [`stats`] | Human-readable summaries |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`logging`] | Tracing subscriber setup |
//!
//! Extraction, keyword normalisation, the store and the scorer live in the
//! I/O-free [`repo_scout_core`] crate.

pub mod cache;
pub mod config;
pub mod connector_github;
pub mod db;
pub mod engine;
pub mod explorer;
pub mod kv;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod stats;
pub mod traits;

pub use repo_scout_core;
