//! Collaborator traits for remote content access.
//!
//! The crawler never talks HTTP directly. It drives a [`ContentGateway`]
//! (`list` / `read` over logical repository paths) and, optionally, a
//! [`VersionHistoryProvider`] for last-change timestamps. The GitHub
//! implementations live in [`crate::connector_github`]; tests supply
//! in-memory ones.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  list(path) / read(path)  ┌──────────────────┐
//! │ PathExplorer │ ────────────────────────▶ │  ContentGateway  │
//! └──────┬───────┘                           │  GitHub / memory │
//!        │ files                             └──────────────────┘
//!        ▼
//!   extract → KnowledgeStore
//! ```
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use repo_scout::traits::{ContentGateway, ContentItem, FetchError, ItemKind};
//!
//! pub struct SingleFile;
//!
//! #[async_trait]
//! impl ContentGateway for SingleFile {
//!     async fn list(&self, path: &str) -> Result<Vec<ContentItem>, FetchError> {
//!         if path.is_empty() {
//!             Ok(vec![ContentItem::file("README.md", "README.md", 12)])
//!         } else {
//!             Err(FetchError::NotFound(path.to_string()))
//!         }
//!     }
//!
//!     async fn read(&self, path: &str) -> Result<String, FetchError> {
//!         match path {
//!             "README.md" => Ok("# Hello".to_string()),
//!             other => Err(FetchError::NotFound(other.to_string())),
//!         }
//!     }
//!
//!     fn confirmed_round_trips(&self) -> u64 {
//!         0
//!     }
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use repo_scout_core::models::FetchErrorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified failure of a single gateway call.
///
/// Every variant is recoverable from the crawler's point of view: the path
/// is recorded in diagnostics and the scan moves on.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("authentication required: {0}")]
    AuthRequired(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("rate limited{}", retry_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Unknown(String),
}

fn retry_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::NotFound(_) => FetchErrorKind::NotFound,
            FetchError::AuthRequired(_) => FetchErrorKind::AuthRequired,
            FetchError::Forbidden(_) => FetchErrorKind::Forbidden,
            FetchError::RateLimited { .. } => FetchErrorKind::RateLimited,
            FetchError::Network(_) => FetchErrorKind::Network,
            FetchError::Unknown(_) => FetchErrorKind::Unknown,
        }
    }

    /// Whether retrying the same request can help.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }
}

/// What a listed path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub name: String,
    /// Path relative to the repository root, without a leading slash.
    pub path: String,
    pub kind: ItemKind,
    /// Size in bytes when the remote reports it (files only).
    pub size: Option<u64>,
}

impl ContentItem {
    pub fn file(name: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: ItemKind::File,
            size: Some(size),
        }
    }

    pub fn dir(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: ItemKind::Dir,
            size: None,
        }
    }
}

/// Read access to a remote repository's contents.
///
/// Paths are logical repository paths: `""` is the root, `"src/lib"` a
/// directory, `"src/lib/index.js"` a file.
#[async_trait]
pub trait ContentGateway: Send + Sync {
    /// List a directory. Listing a file may return that single file.
    async fn list(&self, path: &str) -> Result<Vec<ContentItem>, FetchError>;

    /// Read a file as text.
    async fn read(&self, path: &str) -> Result<String, FetchError>;

    /// Number of requests that completed with a successful response so far.
    ///
    /// The engine compares this before and after a crawl to confirm the
    /// data really came from the remote.
    fn confirmed_round_trips(&self) -> u64;
}

/// The most recent change to a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeInfo {
    pub timestamp: DateTime<Utc>,
    pub author: Option<String>,
    pub author_email: Option<String>,
}

/// Optional source of per-path history.
#[async_trait]
pub trait VersionHistoryProvider: Send + Sync {
    /// `Ok(None)` when the path has no recorded history.
    async fn latest_change(&self, path: &str) -> Result<Option<ChangeInfo>, FetchError>;
}
