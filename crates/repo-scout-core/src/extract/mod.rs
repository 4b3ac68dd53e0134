//! Best-effort knowledge extraction from raw file text.
//!
//! A repository can contain any mix of languages, so instead of a parser
//! this module runs a set of independent pattern matchers, each behind the
//! [`Extractor`] trait. Every matcher writes into its own scratch result;
//! a matcher that fails contributes nothing and the others are unaffected.
//!
//! ```text
//! content ─┬─▶ comments ──┐
//!          ├─▶ functions ─┤
//!          ├─▶ classes ───┤
//!          ├─▶ exports ───┼──▶ ExtractedKnowledge ──▶ to_entries() ──▶ Vec<KnowledgeEntry>
//!          ├─▶ imports ───┤
//!          ├─▶ routes ────┤
//!          ├─▶ text ──────┤
//!          └─▶ docs/data ─┘
//! ```

mod code;
mod comments;
mod docs;
mod entries;
mod markup;

use thiserror::Error;
use tracing::warn;

use crate::models::ExtractedKnowledge;

pub(crate) use entries::entry_id;
pub use entries::to_entries;

/// Files larger than this are truncated (at a char boundary) before matching.
pub const MAX_EXTRACT_BYTES: usize = 512 * 1024;

/// Upper bound on items a single matcher may emit for one file.
pub(crate) const MAX_ITEMS_PER_CATEGORY: usize = 200;

/// Failure inside a single matcher. Never escapes [`extract`].
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed {format} document: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
    #[error("unbalanced bracket at byte {0}")]
    Unbalanced(usize),
}

/// Broad family of a file, decided from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// JavaScript, TypeScript and component formats built on them.
    JavaScript,
    Python,
    Ruby,
    Go,
    Rust,
    /// Other brace-delimited languages (Java, Kotlin, C#, PHP, Swift, ...).
    OtherCode,
    /// HTML and server-side template formats.
    Markup,
    /// Markdown, reStructuredText, plain text.
    Prose,
    Json,
    /// YAML, TOML, INI, dotenv.
    KeyValue,
    Unknown,
}

/// A file handed to the extractors.
#[derive(Debug, Clone, Copy)]
pub struct SourceFile<'a> {
    pub path: &'a str,
    pub content: &'a str,
    pub language: Language,
}

impl<'a> SourceFile<'a> {
    pub fn new(path: &'a str, content: &'a str) -> Self {
        Self {
            path,
            content,
            language: detect_language(path),
        }
    }

    pub fn file_name(&self) -> &'a str {
        self.path.rsplit('/').next().unwrap_or(self.path)
    }

    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Whether the file mixes markup with code (HTML, JSX, Vue, ...).
    pub fn is_markup_flavored(&self) -> bool {
        self.language == Language::Markup
            || matches!(
                self.extension().as_deref(),
                Some("jsx" | "tsx" | "vue" | "svelte" | "astro")
            )
    }

    pub fn is_code(&self) -> bool {
        matches!(
            self.language,
            Language::JavaScript
                | Language::Python
                | Language::Ruby
                | Language::Go
                | Language::Rust
                | Language::OtherCode
        )
    }
}

/// Map a path to its [`Language`] by extension or well-known file name.
pub fn detect_language(path: &str) -> Language {
    let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
    match name.as_str() {
        ".env.example" | ".env.sample" | ".editorconfig" => return Language::KeyValue,
        "dockerfile" | "makefile" | "procfile" => return Language::Prose,
        _ => {}
    }
    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext,
        _ => return Language::Unknown,
    };
    match ext {
        "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "mts" | "cts" | "vue" | "svelte"
        | "astro" => Language::JavaScript,
        "py" => Language::Python,
        "rb" | "rake" => Language::Ruby,
        "go" => Language::Go,
        "rs" => Language::Rust,
        "java" | "kt" | "kts" | "cs" | "php" | "swift" | "scala" | "c" | "h" | "cpp" | "hpp"
        | "cc" | "dart" => Language::OtherCode,
        "html" | "htm" | "hbs" | "handlebars" | "ejs" | "njk" | "liquid" | "erb" | "xml" => {
            Language::Markup
        }
        "md" | "mdx" | "markdown" | "rst" | "txt" | "adoc" => Language::Prose,
        "json" | "json5" => Language::Json,
        "yaml" | "yml" | "toml" | "ini" | "cfg" | "conf" | "env" | "properties" => {
            Language::KeyValue
        }
        _ => Language::Unknown,
    }
}

/// One independent pattern matcher.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this matcher should run for `file` at all.
    fn applies_to(&self, file: &SourceFile<'_>) -> bool;

    /// Write findings into `out`. On `Err`, whatever was written is discarded.
    fn extract(&self, file: &SourceFile<'_>, out: &mut ExtractedKnowledge)
        -> Result<(), ExtractError>;
}

/// The default matcher set, in the order they run.
pub fn default_extractors() -> Vec<Box<dyn Extractor>> {
    vec![
        Box::new(comments::CommentExtractor),
        Box::new(code::FunctionExtractor),
        Box::new(code::ClassExtractor),
        Box::new(code::ExportExtractor),
        Box::new(code::ImportExtractor),
        Box::new(code::RouteExtractor),
        Box::new(markup::TextExtractor),
        Box::new(docs::SectionExtractor),
        Box::new(docs::StructuredExtractor),
    ]
}

/// Extract structured knowledge from `content` using the default matchers.
pub fn extract(content: &str, file_path: &str) -> ExtractedKnowledge {
    extract_with(&default_extractors(), content, file_path)
}

/// Extract with an explicit matcher set.
pub fn extract_with(
    extractors: &[Box<dyn Extractor>],
    content: &str,
    file_path: &str,
) -> ExtractedKnowledge {
    let content = truncate_at_char_boundary(content, MAX_EXTRACT_BYTES);
    let file = SourceFile::new(file_path, content);
    let mut result = ExtractedKnowledge::default();

    for extractor in extractors {
        if !extractor.applies_to(&file) {
            continue;
        }
        let mut scratch = ExtractedKnowledge::default();
        match extractor.extract(&file, &mut scratch) {
            Ok(()) => merge(&mut result, scratch),
            Err(e) => warn!(
                extractor = extractor.name(),
                path = file_path,
                error = %e,
                "extractor failed; category left empty"
            ),
        }
    }

    result
}

fn merge(into: &mut ExtractedKnowledge, from: ExtractedKnowledge) {
    into.comments.extend(from.comments);
    into.functions.extend(from.functions);
    into.classes.extend(from.classes);
    into.exports.extend(from.exports);
    into.imports.extend(from.imports);
    into.routes.extend(from.routes);
    into.text_blocks.extend(from.text_blocks);
    into.sections.extend(from.sections);
    if from.structured.is_some() {
        into.structured = from.structured;
    }
}

pub(crate) fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Collapse runs of whitespace into single spaces and trim.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters, appending `...` when cut.
pub(crate) fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Byte index of the bracket closing the one at `open_idx`.
///
/// Skips over string literals (`'`, `"`, `` ` ``) and `//` / `/* */`
/// comments. Gives up after `max_span` bytes.
pub(crate) fn find_closing(text: &str, open_idx: usize, max_span: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let open = *bytes.get(open_idx)?;
    let close = match open {
        b'(' => b')',
        b'{' => b'}',
        b'[' => b']',
        _ => return None,
    };
    let limit = bytes.len().min(open_idx.saturating_add(max_span));
    let mut depth = 0usize;
    let mut i = open_idx;
    while i < limit {
        let b = bytes[i];
        match b {
            b'\'' | b'"' | b'`' => {
                i += 1;
                while i < limit && bytes[i] != b {
                    if bytes[i] == b'\\' {
                        i += 1;
                    } else if bytes[i] == b'\n' && b != b'`' {
                        break;
                    }
                    i += 1;
                }
            }
            b'/' if i + 1 < limit && bytes[i + 1] == b'/' => {
                while i < limit && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if i + 1 < limit && bytes[i + 1] == b'*' => {
                i += 2;
                while i + 1 < limit && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split `s` on commas that are not nested in brackets or strings.
pub(crate) fn split_top_level(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    for ch in s.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' | '[' | '{' | '<' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' | '>' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth <= 0 => {
                let part = collapse_whitespace(&current);
                if !part.is_empty() {
                    parts.push(part);
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    let part = collapse_whitespace(&current);
    if !part.is_empty() {
        parts.push(part);
    }
    parts
}
