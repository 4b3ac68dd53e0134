use once_cell::sync::Lazy;
use regex::Regex;

use super::{collapse_whitespace, ExtractError, Extractor, SourceFile};
use crate::models::{ExtractedKnowledge, TextBlock, TextOrigin};

const MAX_TEXT_BLOCKS: usize = 100;
const MIN_MARKUP_TEXT_CHARS: usize = 12;
const MIN_LITERAL_CHARS: usize = 30;
const MIN_LITERAL_WORDS: usize = 4;
const MAX_TEXT_CHARS: usize = 500;

const HUMAN_ATTRIBUTES: &str = "title|alt|placeholder|aria-label|label|description|content|summary";

static SCRIPT_OR_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").unwrap());
static BETWEEN_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r">(?P<text>[^<>{}]+)<").unwrap());
static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"'(?P<s>[^'\n\\]{30,})'|"(?P<d>[^"\n\\]{30,})"|`(?P<t>[^`$\\]{30,})`"#).unwrap()
});
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)\b(?:{HUMAN_ATTRIBUTES})\s*=\s*(?:"(?P<d>[^"{{}}]+)"|'(?P<s>[^'{{}}]+)')"#
    ))
    .unwrap()
});

/// Human-readable text embedded in markup, JSX and string literals.
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn applies_to(&self, file: &SourceFile<'_>) -> bool {
        file.is_markup_flavored()
    }

    fn extract(
        &self,
        file: &SourceFile<'_>,
        out: &mut ExtractedKnowledge,
    ) -> Result<(), ExtractError> {
        let stripped = SCRIPT_OR_STYLE.replace_all(file.content, " ");
        let push = |text: &str, origin: TextOrigin, out: &mut ExtractedKnowledge| {
            let text = collapse_whitespace(text);
            if text.is_empty()
                || out.text_blocks.len() >= MAX_TEXT_BLOCKS
                || out.text_blocks.iter().any(|b| b.text == text)
            {
                return;
            }
            let text = if text.chars().count() > MAX_TEXT_CHARS {
                text.chars().take(MAX_TEXT_CHARS).collect()
            } else {
                text
            };
            out.text_blocks.push(TextBlock { text, origin });
        };

        for caps in BETWEEN_TAGS.captures_iter(&stripped) {
            let text = caps.name("text").map_or("", |m| m.as_str()).trim();
            if is_prose(text, MIN_MARKUP_TEXT_CHARS, 2) {
                push(text, TextOrigin::Markup, out);
            }
        }
        for caps in ATTRIBUTE.captures_iter(&stripped) {
            let text = caps
                .name("d")
                .or_else(|| caps.name("s"))
                .map_or("", |m| m.as_str());
            if is_prose(text, 3, 1) {
                push(text, TextOrigin::Attribute, out);
            }
        }
        for caps in STRING_LITERAL.captures_iter(&stripped) {
            let text = caps
                .name("s")
                .or_else(|| caps.name("d"))
                .or_else(|| caps.name("t"))
                .map_or("", |m| m.as_str());
            if is_prose(text, MIN_LITERAL_CHARS, MIN_LITERAL_WORDS) && !looks_like_class_list(text) {
                push(text, TextOrigin::Literal, out);
            }
        }
        Ok(())
    }
}

/// Enough words, and no code punctuation, to read as a sentence.
fn is_prose(text: &str, min_chars: usize, min_words: usize) -> bool {
    let text = text.trim();
    if text.chars().count() < min_chars || text.split_whitespace().count() < min_words {
        return false;
    }
    const CODE_MARKERS: &[&str] = &[
        "=>", "();", "function", "&&", "||", "={", "===", "import ", "://",
    ];
    if CODE_MARKERS.iter().any(|m| text.contains(m)) {
        return false;
    }
    text.chars().any(|c| c.is_alphabetic())
}

/// Utility-class strings such as `flex items-center px-4 md:w-1/2`.
fn looks_like_class_list(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    let utility = words
        .iter()
        .filter(|w| w.contains('-') || w.contains(':') || w.chars().any(|c| c.is_ascii_digit()))
        .count();
    utility * 2 >= words.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(path: &str, src: &str) -> Vec<TextBlock> {
        let file = SourceFile::new(path, src);
        let mut out = ExtractedKnowledge::default();
        TextExtractor.extract(&file, &mut out).unwrap();
        out.text_blocks
    }

    #[test]
    fn markup_text_and_attributes() {
        let src = r#"
<section class="signup">
  <h2>Become a paying member today</h2>
  <img src="/logo.png" alt="Publication logo">
  <input placeholder="Your email address">
  <script>var ignored = "This text lives inside a script block";</script>
  <p>OK</p>
</section>
"#;
        let found = texts("theme/signup.hbs", src);
        let rendered: Vec<(&str, TextOrigin)> =
            found.iter().map(|b| (b.text.as_str(), b.origin)).collect();
        assert_eq!(
            rendered,
            vec![
                ("Become a paying member today", TextOrigin::Markup),
                ("Publication logo", TextOrigin::Attribute),
                ("Your email address", TextOrigin::Attribute),
            ]
        );
    }

    #[test]
    fn jsx_string_literals_skip_class_lists() {
        let src = r#"
const message = 'Your subscription has been cancelled successfully';
const classes = "flex items-center px-4 py-2 md:w-1/2 text-gray-700";
"#;
        let found = texts("components/Notice.jsx", src);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].origin, TextOrigin::Literal);
        assert_eq!(found[0].text, "Your subscription has been cancelled successfully");
    }

    #[test]
    fn plain_code_files_are_not_scanned() {
        let file = SourceFile::new(
            "lib/util.js",
            "const s = 'A long sentence that would otherwise count';",
        );
        assert!(!TextExtractor.applies_to(&file));
    }
}
