use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{clip, collapse_whitespace, ExtractError, Extractor, Language, SourceFile};
use crate::models::{DocSection, ExtractedKnowledge, StructuredSummary};

const MAX_SECTIONS: usize = 50;
const MAX_SECTION_CHARS: usize = 1500;
const MIN_SECTION_CHARS: usize = 20;
const MAX_KEYS: usize = 60;
const MAX_SUMMARY_CHARS: usize = 1200;

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{1,6}\s+(?P<title>.+?)\s*#*\s*$").unwrap());
static KEY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?P<key>[A-Za-z_][\w.-]*)\s*[:=]").unwrap());
static TOML_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\[\[?(?P<key>[^\]\n]+)\]\]?\s*$").unwrap());

/// Heading-delimited sections of prose documents.
pub struct SectionExtractor;

impl Extractor for SectionExtractor {
    fn name(&self) -> &'static str {
        "sections"
    }

    fn applies_to(&self, file: &SourceFile<'_>) -> bool {
        file.language == Language::Prose
    }

    fn extract(
        &self,
        file: &SourceFile<'_>,
        out: &mut ExtractedKnowledge,
    ) -> Result<(), ExtractError> {
        let mut heading: Option<String> = None;
        let mut body: Vec<&str> = Vec::new();
        let mut in_fence = false;

        for line in file.content.lines() {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                body.push(line);
                continue;
            }
            if !in_fence {
                if let Some(caps) = HEADING.captures(line.trim_end()) {
                    push_section(out, heading.take(), &body);
                    body.clear();
                    heading = caps.name("title").map(|m| m.as_str().to_string());
                    continue;
                }
            }
            body.push(line);
        }
        push_section(out, heading, &body);
        Ok(())
    }
}

fn push_section(out: &mut ExtractedKnowledge, heading: Option<String>, body: &[&str]) {
    let text = collapse_whitespace(&body.join("\n"));
    if text.chars().count() < MIN_SECTION_CHARS {
        // A heading with a one-line body still tells us what the document covers.
        if heading.is_none() || text.is_empty() {
            return;
        }
    }
    let chars: Vec<char> = text.chars().collect();
    for chunk in chars.chunks(MAX_SECTION_CHARS) {
        if out.sections.len() >= MAX_SECTIONS {
            return;
        }
        out.sections.push(DocSection {
            heading: heading.clone(),
            body: chunk.iter().collect(),
        });
    }
}

/// Summaries of JSON, YAML, TOML, INI and dotenv files.
pub struct StructuredExtractor;

impl Extractor for StructuredExtractor {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn applies_to(&self, file: &SourceFile<'_>) -> bool {
        matches!(file.language, Language::Json | Language::KeyValue)
    }

    fn extract(
        &self,
        file: &SourceFile<'_>,
        out: &mut ExtractedKnowledge,
    ) -> Result<(), ExtractError> {
        let is_config = is_config_file(file.file_name());
        let summary = match file.language {
            Language::Json => summarize_json(file, is_config)?,
            _ => summarize_key_value(file, is_config),
        };
        if !summary.keys.is_empty() || !summary.summary.is_empty() {
            out.structured = Some(summary);
        }
        Ok(())
    }
}

/// Whether a data file configures tooling or the application itself.
pub(crate) fn is_config_file(file_name: &str) -> bool {
    let name = file_name.to_ascii_lowercase();
    const EXACT: &[&str] = &[
        "package.json",
        "cargo.toml",
        "pyproject.toml",
        "composer.json",
        "docker-compose.yml",
        "docker-compose.yaml",
        ".env.example",
        ".env.sample",
        ".editorconfig",
        "netlify.toml",
        "vercel.json",
        "app.json",
        "setup.cfg",
        "tox.ini",
        "go.mod",
    ];
    EXACT.contains(&name.as_str())
        || name.starts_with("tsconfig")
        || name.starts_with("jsconfig")
        || name.starts_with(".eslintrc")
        || name.starts_with(".prettierrc")
        || name.starts_with(".babelrc")
        || name.ends_with(".config.json")
        || name.ends_with(".config.js")
        || name.starts_with("config.")
}

fn summarize_json(
    file: &SourceFile<'_>,
    is_config: bool,
) -> Result<StructuredSummary, ExtractError> {
    let value: Value = serde_json::from_str(file.content).map_err(|e| ExtractError::Parse {
        format: "json",
        message: e.to_string(),
    })?;

    let keys: Vec<String> = match &value {
        Value::Object(map) => map.keys().take(MAX_KEYS).cloned().collect(),
        _ => Vec::new(),
    };

    let summary = if file.file_name().eq_ignore_ascii_case("package.json") {
        package_manifest_summary(&value)
    } else {
        format!("{} with keys: {}", file.file_name(), keys.join(", "))
    };

    Ok(StructuredSummary {
        is_config,
        keys,
        summary: clip(&summary, MAX_SUMMARY_CHARS),
    })
}

fn package_manifest_summary(value: &Value) -> String {
    let mut parts = Vec::new();
    if let Some(name) = value.get("name").and_then(Value::as_str) {
        parts.push(format!("Package {name}"));
    }
    if let Some(desc) = value.get("description").and_then(Value::as_str) {
        parts.push(desc.to_string());
    }
    for (field, label) in [
        ("scripts", "Scripts"),
        ("dependencies", "Dependencies"),
        ("devDependencies", "Dev dependencies"),
    ] {
        if let Some(map) = value.get(field).and_then(Value::as_object) {
            if !map.is_empty() {
                let names: Vec<&str> = map.keys().map(String::as_str).take(40).collect();
                parts.push(format!("{label}: {}", names.join(", ")));
            }
        }
    }
    parts.join(". ")
}

fn summarize_key_value(file: &SourceFile<'_>, is_config: bool) -> StructuredSummary {
    let mut keys: Vec<String> = Vec::new();
    for caps in TOML_SECTION.captures_iter(file.content) {
        if let Some(k) = caps.name("key") {
            let k = k.as_str().trim().to_string();
            if !keys.contains(&k) {
                keys.push(k);
            }
        }
    }
    for caps in KEY_LINE.captures_iter(file.content) {
        if keys.len() >= MAX_KEYS {
            break;
        }
        if let Some(k) = caps.name("key") {
            let k = k.as_str().to_string();
            if !keys.contains(&k) {
                keys.push(k);
            }
        }
    }
    let summary = if keys.is_empty() {
        String::new()
    } else {
        format!("{} with keys: {}", file.file_name(), keys.join(", "))
    };
    StructuredSummary {
        is_config,
        keys,
        summary: clip(&summary, MAX_SUMMARY_CHARS),
    }
}
