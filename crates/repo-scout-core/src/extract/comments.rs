use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    collapse_whitespace, ExtractError, Extractor, Language, SourceFile, MAX_ITEMS_PER_CATEGORY,
};
use crate::models::{CommentBlock, ExtractedKnowledge};

/// Comments shorter than this (after cleanup) carry no useful knowledge.
const MIN_COMMENT_CHARS: usize = 20;
const MAX_COMMENT_CHARS: usize = 2000;
/// Share of code punctuation above which a comment is treated as disabled code.
const MAX_CODE_CHAR_RATIO: f64 = 0.15;

/// Tool directives and boilerplate that are not documentation.
const IGNORED_MARKERS: &[&str] = &[
    "eslint",
    "prettier-ignore",
    "@ts-",
    "istanbul ignore",
    "jshint",
    "tslint",
    "copyright",
    "license",
    "sourcemappingurl",
    "noqa",
    "pylint",
    "type: ignore",
    "rubocop",
    "webpackchunkname",
];

static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*(?P<doc>\*)?(?P<body>.*?)\*/").unwrap());
static HTML_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--(?P<body>.*?)-->").unwrap());
static PY_DOCSTRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)(?:"""(?P<d>.*?)"""|'''(?P<s>.*?)''')"#).unwrap());

/// Doc blocks, docstrings, and runs of line comments.
pub struct CommentExtractor;

impl Extractor for CommentExtractor {
    fn name(&self) -> &'static str {
        "comments"
    }

    fn applies_to(&self, file: &SourceFile<'_>) -> bool {
        file.is_code() || file.language == Language::Markup || file.language == Language::KeyValue
    }

    fn extract(
        &self,
        file: &SourceFile<'_>,
        out: &mut ExtractedKnowledge,
    ) -> Result<(), ExtractError> {
        let text = file.content;
        let mut found: Vec<CommentBlock> = Vec::new();

        let block_style = matches!(
            file.language,
            Language::JavaScript | Language::Go | Language::Rust | Language::OtherCode
        );
        if block_style {
            for caps in BLOCK_COMMENT.captures_iter(text) {
                let body = caps.name("body").map_or("", |m| m.as_str());
                let doc_block = caps.name("doc").is_some();
                found.push(CommentBlock {
                    text: clean_block(body),
                    doc_block,
                });
            }
        }
        if file.language == Language::Python {
            for caps in PY_DOCSTRING.captures_iter(text) {
                let body = caps
                    .name("d")
                    .or_else(|| caps.name("s"))
                    .map_or("", |m| m.as_str());
                found.push(CommentBlock {
                    text: collapse_whitespace(body),
                    doc_block: true,
                });
            }
        }
        if file.is_markup_flavored() {
            for caps in HTML_COMMENT.captures_iter(text) {
                let body = caps.name("body").map_or("", |m| m.as_str());
                found.push(CommentBlock {
                    text: collapse_whitespace(body),
                    doc_block: false,
                });
            }
        }
        if let Some(prefix) = line_comment_prefix(file.language) {
            found.extend(line_comment_runs(text, prefix));
        }

        for block in found {
            if out.comments.len() >= MAX_ITEMS_PER_CATEGORY {
                break;
            }
            if !is_meaningful(&block.text) || out.comments.iter().any(|c| c.text == block.text) {
                continue;
            }
            let mut block = block;
            if block.text.chars().count() > MAX_COMMENT_CHARS {
                block.text = block.text.chars().take(MAX_COMMENT_CHARS).collect();
            }
            out.comments.push(block);
        }
        Ok(())
    }
}

fn line_comment_prefix(language: Language) -> Option<&'static str> {
    match language {
        Language::JavaScript | Language::Go | Language::Rust | Language::OtherCode => Some("//"),
        Language::Python | Language::Ruby | Language::KeyValue => Some("#"),
        _ => None,
    }
}

/// Strip the leading `*` gutter of a `/* ... */` body and join the lines.
fn clean_block(body: &str) -> String {
    let lines: Vec<&str> = body
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .filter(|l| !l.is_empty())
        .collect();
    lines.join(" ")
}

/// Consecutive full-line comments grouped into one block each.
fn line_comment_runs(text: &str, prefix: &str) -> Vec<CommentBlock> {
    let mut runs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut doc_block = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if prefix == "#" && trimmed.starts_with("#!") {
            flush(&mut current, &mut doc_block, &mut runs);
            continue;
        }
        match trimmed.strip_prefix(prefix) {
            Some(rest) => {
                // `///` and `//!` mark Rust doc comments.
                if rest.starts_with('/') || rest.starts_with('!') {
                    doc_block = true;
                }
                let rest = rest.trim_start_matches(['/', '!', '#']).trim();
                if !rest.is_empty() {
                    current.push(rest);
                }
            }
            None => flush(&mut current, &mut doc_block, &mut runs),
        }
    }
    flush(&mut current, &mut doc_block, &mut runs);
    runs
}

fn flush(current: &mut Vec<&str>, doc_block: &mut bool, runs: &mut Vec<CommentBlock>) {
    if !current.is_empty() {
        runs.push(CommentBlock {
            text: current.join(" "),
            doc_block: *doc_block,
        });
        current.clear();
    }
    *doc_block = false;
}

fn is_meaningful(text: &str) -> bool {
    if text.chars().count() < MIN_COMMENT_CHARS {
        return false;
    }
    let lower = text.to_lowercase();
    if lower.starts_with("global ") || IGNORED_MARKERS.iter().any(|m| lower.contains(m)) {
        return false;
    }
    !looks_like_code(text)
}

fn looks_like_code(text: &str) -> bool {
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    if total == 0 {
        return true;
    }
    let code = text.chars().filter(|c| ";{}()=".contains(*c)).count();
    code as f64 / total as f64 > MAX_CODE_CHAR_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comments(path: &str, src: &str) -> Vec<CommentBlock> {
        let file = SourceFile::new(path, src);
        let mut out = ExtractedKnowledge::default();
        CommentExtractor.extract(&file, &mut out).unwrap();
        out.comments
    }

    #[test]
    fn jsdoc_blocks_are_cleaned_and_flagged() {
        let src = r#"
/**
 * Processes subscription payments through Stripe.
 * Retries failed charges up to three times.
 */
function charge() {}
"#;
        let found = comments("members/payment.js", src);
        assert_eq!(found.len(), 1);
        assert!(found[0].doc_block);
        assert_eq!(
            found[0].text,
            "Processes subscription payments through Stripe. Retries failed charges up to three times."
        );
    }

    #[test]
    fn consecutive_line_comments_are_grouped() {
        let src = "// Sends the welcome email after a member\n// confirms their address.\nsend();\n// short\n";
        let found = comments("mail.ts", src);
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].text,
            "Sends the welcome email after a member confirms their address."
        );
        assert!(!found[0].doc_block);
    }

    #[test]
    fn directives_and_commented_out_code_are_skipped() {
        let src = "// eslint-disable-next-line no-console because of legacy\n// if (x) { y(); z(); } else { w(); }\n";
        assert!(comments("a.js", src).is_empty());
    }

    #[test]
    fn python_docstrings_and_hash_comments() {
        let src = "#!/usr/bin/env python\n\"\"\"Command line entry point for the importer.\"\"\"\n# Reads the export file and creates posts in batches.\n";
        let found = comments("tools/import.py", src);
        let texts: Vec<&str> = found.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Command line entry point for the importer.",
                "Reads the export file and creates posts in batches."
            ]
        );
    }

    #[test]
    fn html_comments_in_templates() {
        let src = "<div>\n<!-- Renders the member signup form for paid tiers -->\n</div>";
        let found = comments("theme/signup.hbs", src);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "Renders the member signup form for paid tiers");
    }
}
