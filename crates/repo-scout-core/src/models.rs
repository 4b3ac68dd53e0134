//! Core data models used throughout repo-scout.
//!
//! These types represent the knowledge entries, extraction results, and scan
//! diagnostics that flow between the crawler, the store, and the retrieval
//! engine.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of knowledge an entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryType {
    Comment,
    Function,
    Export,
    Class,
    ApiRoute,
    TextContent,
    StructuredData,
    Content,
    Page,
    Config,
}

impl EntryType {
    pub const ALL: [EntryType; 10] = [
        EntryType::Comment,
        EntryType::Function,
        EntryType::Export,
        EntryType::Class,
        EntryType::ApiRoute,
        EntryType::TextContent,
        EntryType::StructuredData,
        EntryType::Content,
        EntryType::Page,
        EntryType::Config,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Comment => "comment",
            EntryType::Function => "function",
            EntryType::Export => "export",
            EntryType::Class => "class",
            EntryType::ApiRoute => "api-route",
            EntryType::TextContent => "text-content",
            EntryType::StructuredData => "structured-data",
            EntryType::Content => "content",
            EntryType::Page => "page",
            EntryType::Config => "config",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a piece of embedded human-readable text was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOrigin {
    /// Text between two markup tags.
    Markup,
    /// A quoted or template string literal.
    Literal,
    /// A human-facing attribute value (`title`, `alt`, `placeholder`, ...).
    Attribute,
}

/// Per-type shape of an entry's metadata.
///
/// Nothing in retrieval depends on these fields for correctness; they are
/// serialized and matched as text by the scorer and shown by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryDetail {
    Comment {
        doc_block: bool,
    },
    Function {
        name: String,
        params: Vec<String>,
        is_async: bool,
        is_method: bool,
    },
    Class {
        name: String,
        superclass: Option<String>,
        methods: Vec<String>,
    },
    Export {
        name: String,
        is_default: bool,
    },
    ApiRoute {
        method: String,
        path: String,
        handler: String,
    },
    Text {
        origin: TextOrigin,
    },
    Page {
        heading: Option<String>,
    },
    Structured {
        keys: Vec<String>,
    },
    File {
        extension: Option<String>,
    },
    Synthetic,
}

/// Metadata attached to a [`KnowledgeEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub detail: EntryDetail,
    /// Free-form scoring hints (e.g. `priority`, `imports`). Never load-bearing.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hints: BTreeMap<String, serde_json::Value>,
}

impl EntryMetadata {
    pub fn new(detail: EntryDetail) -> Self {
        Self {
            detail,
            hints: BTreeMap::new(),
        }
    }

    pub fn with_hint(mut self, key: &str, value: serde_json::Value) -> Self {
        self.hints.insert(key.to_string(), value);
        self
    }

    /// True when the entry is flagged `priority = "high"`.
    pub fn is_high_priority(&self) -> bool {
        matches!(
            self.hints.get("priority").and_then(|v| v.as_str()),
            Some("high")
        )
    }

    /// Lowercased text values of the detail and hints, space separated.
    /// Field names, tags and flags are left out.
    pub fn searchable_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        match &self.detail {
            EntryDetail::Function { name, params, .. } => {
                parts.push(name);
                parts.extend(params.iter().map(String::as_str));
            }
            EntryDetail::Class {
                name,
                superclass,
                methods,
            } => {
                parts.push(name);
                parts.extend(superclass.as_deref());
                parts.extend(methods.iter().map(String::as_str));
            }
            EntryDetail::Export { name, .. } => parts.push(name),
            EntryDetail::ApiRoute {
                method,
                path,
                handler,
            } => {
                parts.push(method);
                parts.push(path);
                parts.push(handler);
            }
            EntryDetail::Page { heading } => parts.extend(heading.as_deref()),
            EntryDetail::Structured { keys } => parts.extend(keys.iter().map(String::as_str)),
            EntryDetail::File { extension } => parts.extend(extension.as_deref()),
            EntryDetail::Comment { .. } | EntryDetail::Text { .. } | EntryDetail::Synthetic => {}
        }
        let mut text = parts.join(" ");
        for value in self.hints.values() {
            push_json_values(value, &mut text);
        }
        text.to_lowercase()
    }
}

fn push_json_values(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;
    match value {
        Value::String(s) => {
            out.push(' ');
            out.push_str(s);
        }
        Value::Number(n) => {
            out.push(' ');
            out.push_str(&n.to_string());
        }
        Value::Array(items) => items.iter().for_each(|v| push_json_values(v, out)),
        Value::Object(map) => map.values().for_each(|v| push_json_values(v, out)),
        Value::Null | Value::Bool(_) => {}
    }
}

/// A single unit of indexed knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub content: String,
    /// Logical repository path the entry was extracted from.
    pub file_path: String,
    pub keywords: BTreeSet<String>,
    pub metadata: EntryMetadata,
    /// Populated lazily from version history; absent until requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// A documentation or line comment block.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentBlock {
    pub text: String,
    pub doc_block: bool,
}

/// A function or method signature.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSig {
    pub name: String,
    pub params: Vec<String>,
    pub is_async: bool,
    pub is_method: bool,
    /// Signature plus the leading part of the body.
    pub snippet: String,
}

/// A class declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub superclass: Option<String>,
    pub methods: Vec<String>,
}

/// A named or default export binding.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportBinding {
    pub name: String,
    pub is_default: bool,
}

/// An HTTP route registration such as `router.get('/users', listUsers)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRoute {
    pub object: String,
    pub method: String,
    pub path: String,
    pub handler: String,
}

/// Embedded human-readable text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub text: String,
    pub origin: TextOrigin,
}

/// A heading-delimited section of a prose document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocSection {
    pub heading: Option<String>,
    pub body: String,
}

/// Summary of a structured data / configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredSummary {
    pub is_config: bool,
    pub keys: Vec<String>,
    pub summary: String,
}

/// Everything the extractors found in one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedKnowledge {
    pub comments: Vec<CommentBlock>,
    pub functions: Vec<FunctionSig>,
    pub classes: Vec<ClassDecl>,
    pub exports: Vec<ExportBinding>,
    /// Import specifiers; recorded as scoring hints only.
    pub imports: Vec<String>,
    pub routes: Vec<ApiRoute>,
    pub text_blocks: Vec<TextBlock>,
    pub sections: Vec<DocSection>,
    pub structured: Option<StructuredSummary>,
}

impl ExtractedKnowledge {
    /// True when no extractor produced an indexable item.
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
            && self.functions.is_empty()
            && self.classes.is_empty()
            && self.exports.is_empty()
            && self.routes.is_empty()
            && self.text_blocks.is_empty()
            && self.sections.is_empty()
            && self.structured.is_none()
    }
}

/// Classification of a failed fetch, recorded in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    NotFound,
    AuthRequired,
    Forbidden,
    RateLimited,
    Network,
    Unknown,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchErrorKind::NotFound => "not_found",
            FetchErrorKind::AuthRequired => "auth_required",
            FetchErrorKind::Forbidden => "forbidden",
            FetchErrorKind::RateLimited => "rate_limited",
            FetchErrorKind::Network => "network",
            FetchErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A path whose listing or read failed during a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathFailure {
    pub path: String,
    pub kind: FetchErrorKind,
    pub message: String,
}

/// Coarse size tier of a repository, used to pick the path budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryScale {
    #[default]
    Small,
    Medium,
    Large,
}

/// What one scan attempted and achieved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanDiagnostics {
    /// `"{owner}/{repo}"`.
    pub repository: String,
    pub attempted_paths: Vec<String>,
    pub successful_paths: Vec<String>,
    /// May contain duplicates; see [`ScanDiagnostics::unique_processed_files`].
    pub processed_files: Vec<String>,
    #[serde(default)]
    pub failures: Vec<PathFailure>,
    #[serde(default)]
    pub skipped_files: usize,
    #[serde(default)]
    pub scale: RepositoryScale,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScanDiagnostics {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            ..Default::default()
        }
    }

    /// Processed file paths, deduplicated, in first-seen order.
    pub fn unique_processed_files(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.processed_files
            .iter()
            .filter(|p| seen.insert(p.as_str()))
            .map(|p| p.as_str())
            .collect()
    }

    /// Failure counts grouped by kind.
    pub fn failure_counts(&self) -> BTreeMap<FetchErrorKind, usize> {
        let mut counts = BTreeMap::new();
        for f in &self.failures {
            *counts.entry(f.kind).or_insert(0) += 1;
        }
        counts
    }
}

/// Aggregate counts over the current store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KnowledgeStats {
    pub total_entries: usize,
    pub by_type: BTreeMap<EntryType, usize>,
    pub processed_file_count: usize,
}
