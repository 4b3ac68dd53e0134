//! Conversion from [`ExtractedKnowledge`] to indexable [`KnowledgeEntry`] values.

use std::collections::BTreeSet;

use serde_json::json;
use uuid::Uuid;

use super::{clip, collapse_whitespace, detect_language, docs::is_config_file, Language};
use crate::keywords::{extract_keywords, identifier_keywords};
use crate::models::{EntryDetail, EntryMetadata, EntryType, ExtractedKnowledge, KnowledgeEntry};

/// Leading characters kept for a file that produced nothing more specific.
const FALLBACK_CONTENT_CHARS: usize = 800;
const MAX_IMPORT_HINTS: usize = 20;

/// Files whose entries are flagged `priority = "high"` for retrieval.
fn is_priority_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
    name.starts_with("readme")
        || name == "package.json"
        || name == "cargo.toml"
        || name == "pyproject.toml"
        || name == "go.mod"
}

/// Build the entries for one file.
///
/// `raw_content` is only used when nothing was extracted, to produce a
/// single `content` entry from the start of the file.
pub fn to_entries(
    knowledge: &ExtractedKnowledge,
    file_path: &str,
    raw_content: &str,
) -> Vec<KnowledgeEntry> {
    let mut builder = EntryBuilder::new(file_path, &knowledge.imports);

    for c in &knowledge.comments {
        builder.push(
            EntryType::Comment,
            c.text.clone(),
            BTreeSet::new(),
            EntryDetail::Comment {
                doc_block: c.doc_block,
            },
        );
    }
    for f in &knowledge.functions {
        builder.push(
            EntryType::Function,
            f.snippet.clone(),
            identifier_keywords(&f.name),
            EntryDetail::Function {
                name: f.name.clone(),
                params: f.params.clone(),
                is_async: f.is_async,
                is_method: f.is_method,
            },
        );
    }
    for c in &knowledge.classes {
        let mut content = match &c.superclass {
            Some(sup) => format!("class {} extends {}", c.name, sup),
            None => format!("class {}", c.name),
        };
        if !c.methods.is_empty() {
            content.push_str(&format!(" with methods {}", c.methods.join(", ")));
        }
        let mut extra = identifier_keywords(&c.name);
        for m in &c.methods {
            extra.extend(identifier_keywords(m));
        }
        builder.push(
            EntryType::Class,
            content,
            extra,
            EntryDetail::Class {
                name: c.name.clone(),
                superclass: c.superclass.clone(),
                methods: c.methods.clone(),
            },
        );
    }
    for e in &knowledge.exports {
        let content = if e.is_default {
            format!("export default {}", e.name)
        } else {
            format!("export {}", e.name)
        };
        builder.push(
            EntryType::Export,
            content,
            identifier_keywords(&e.name),
            EntryDetail::Export {
                name: e.name.clone(),
                is_default: e.is_default,
            },
        );
    }
    for r in &knowledge.routes {
        let content = format!("{} {} handled by {}", r.method, r.path, r.handler);
        let mut extra = extract_keywords(&r.path.replace(['/', ':'], " "));
        extra.extend(identifier_keywords(&r.handler));
        extra.insert("api".to_string());
        extra.insert("route".to_string());
        builder.push_with(
            EntryType::ApiRoute,
            content,
            extra,
            EntryDetail::ApiRoute {
                method: r.method.clone(),
                path: r.path.clone(),
                handler: r.handler.clone(),
            },
            true,
        );
    }
    for t in &knowledge.text_blocks {
        builder.push(
            EntryType::TextContent,
            t.text.clone(),
            BTreeSet::new(),
            EntryDetail::Text { origin: t.origin },
        );
    }
    for s in &knowledge.sections {
        let content = match &s.heading {
            Some(h) => format!("{}: {}", h, s.body),
            None => s.body.clone(),
        };
        builder.push(
            EntryType::Page,
            content,
            BTreeSet::new(),
            EntryDetail::Page {
                heading: s.heading.clone(),
            },
        );
    }
    if let Some(st) = &knowledge.structured {
        let file_name = file_path.rsplit('/').next().unwrap_or(file_path);
        let entry_type = if st.is_config || is_config_file(file_name) {
            EntryType::Config
        } else {
            EntryType::StructuredData
        };
        let mut extra = BTreeSet::new();
        for k in &st.keys {
            extra.extend(identifier_keywords(k));
        }
        builder.push(
            entry_type,
            st.summary.clone(),
            extra,
            EntryDetail::Structured {
                keys: st.keys.clone(),
            },
        );
    }

    if builder.entries.is_empty() && detect_language(file_path) != Language::Unknown {
        let leading: String = raw_content.chars().take(FALLBACK_CONTENT_CHARS).collect();
        let leading = collapse_whitespace(&leading);
        if !leading.is_empty() {
            let extension = file_path
                .rsplit('/')
                .next()
                .and_then(|n| n.rsplit_once('.'))
                .map(|(_, ext)| ext.to_ascii_lowercase());
            builder.push(
                EntryType::Content,
                clip(&leading, FALLBACK_CONTENT_CHARS),
                BTreeSet::new(),
                EntryDetail::File { extension },
            );
        }
    }

    builder.entries
}

struct EntryBuilder<'a> {
    file_path: &'a str,
    imports: Vec<&'a str>,
    path_priority: bool,
    language: Language,
    entries: Vec<KnowledgeEntry>,
}

impl<'a> EntryBuilder<'a> {
    fn new(file_path: &'a str, imports: &'a [String]) -> Self {
        Self {
            file_path,
            imports: imports.iter().take(MAX_IMPORT_HINTS).map(String::as_str).collect(),
            path_priority: is_priority_file(file_path),
            language: detect_language(file_path),
            entries: Vec::new(),
        }
    }

    fn push(
        &mut self,
        entry_type: EntryType,
        content: String,
        extra_keywords: BTreeSet<String>,
        detail: EntryDetail,
    ) {
        self.push_with(entry_type, content, extra_keywords, detail, false);
    }

    fn push_with(
        &mut self,
        entry_type: EntryType,
        content: String,
        extra_keywords: BTreeSet<String>,
        detail: EntryDetail,
        high_priority: bool,
    ) {
        if content.trim().is_empty() {
            return;
        }
        let ordinal = self.entries.len();
        let mut keywords = extract_keywords(&content);
        keywords.extend(extra_keywords);

        let mut metadata = EntryMetadata::new(detail);
        if !self.imports.is_empty() {
            metadata = metadata.with_hint("imports", json!(self.imports));
        }
        if let Some(lang) = language_label(self.language) {
            metadata = metadata.with_hint("language", json!(lang));
        }
        if high_priority || self.path_priority {
            metadata = metadata.with_hint("priority", json!("high"));
        }

        self.entries.push(KnowledgeEntry {
            id: entry_id(self.file_path, entry_type, ordinal, &content),
            entry_type,
            content,
            file_path: self.file_path.to_string(),
            keywords,
            metadata,
            last_updated: None,
        });
    }
}

/// Name-based id: identical scans of identical content yield identical ids.
pub(crate) fn entry_id(
    file_path: &str,
    entry_type: EntryType,
    ordinal: usize,
    content: &str,
) -> String {
    let name = format!("{file_path}#{entry_type}#{ordinal}#{content}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

fn language_label(language: Language) -> Option<&'static str> {
    Some(match language {
        Language::JavaScript => "javascript",
        Language::Python => "python",
        Language::Ruby => "ruby",
        Language::Go => "go",
        Language::Rust => "rust",
        Language::OtherCode => "code",
        Language::Markup => "markup",
        Language::Prose => "prose",
        Language::Json => "json",
        Language::KeyValue => "key-value",
        Language::Unknown => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;

    fn entries_for(path: &str, src: &str) -> Vec<KnowledgeEntry> {
        to_entries(&extract(src, path), path, src)
    }

    #[test]
    fn route_entries_are_high_priority() {
        let src = "const router = require('express').Router();\nrouter.post('/members/api/checkout', createCheckoutSession);\n";
        let entries = entries_for("core/members/routes.js", src);
        let route = entries
            .iter()
            .find(|e| e.entry_type == EntryType::ApiRoute)
            .unwrap();
        assert_eq!(route.content, "POST /members/api/checkout handled by createCheckoutSession");
        assert!(route.metadata.is_high_priority());
        assert!(route.keywords.contains("checkout"));
        assert!(route.keywords.contains("session"));
        assert_eq!(route.metadata.hints["imports"], json!(["express"]));
    }

    #[test]
    fn ids_are_stable_across_runs() {
        let src = "/** Sends the newsletter to every subscribed member. */\nexport function sendNewsletter(post) {}\n";
        let a = entries_for("services/newsletter.js", src);
        let b = entries_for("services/newsletter.js", src);
        assert!(!a.is_empty());
        assert_eq!(
            a.iter().map(|e| &e.id).collect::<Vec<_>>(),
            b.iter().map(|e| &e.id).collect::<Vec<_>>()
        );
        let ids: BTreeSet<&String> = a.iter().map(|e| &e.id).collect();
        assert_eq!(ids.len(), a.len());
    }

    #[test]
    fn function_keywords_include_identifier_parts() {
        let entries = entries_for("billing.py", "def process_refund(charge):\n    return charge\n");
        let func = &entries[0];
        assert_eq!(func.entry_type, EntryType::Function);
        assert!(func.keywords.contains("refund"));
        assert!(func.keywords.contains("process_refund"));
    }

    #[test]
    fn readme_sections_are_priority_pages() {
        let entries = entries_for(
            "README.md",
            "# Ghost\n\nIndependent technology for modern publishing.\n",
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, EntryType::Page);
        assert!(entries[0].content.starts_with("Ghost: Independent"));
        assert!(entries[0].metadata.is_high_priority());
    }

    #[test]
    fn config_and_structured_data() {
        let cfg = entries_for("tsconfig.json", r#"{"compilerOptions":{"strict":true}}"#);
        assert_eq!(cfg[0].entry_type, EntryType::Config);
        let data = entries_for("fixtures/users.json", r#"{"users":[]}"#);
        assert_eq!(data[0].entry_type, EntryType::StructuredData);
    }

    #[test]
    fn content_fallback_when_nothing_matched() {
        let entries = entries_for("scripts/run.sh.txt", "");
        assert!(entries.is_empty());
        let entries = entries_for("src/constants.js", "module.foo = 1;\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, EntryType::Content);
        assert_eq!(entries[0].content, "module.foo = 1;");
    }
}
