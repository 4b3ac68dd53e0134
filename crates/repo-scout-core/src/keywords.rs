//! Keyword normalization.
//!
//! Turns free text (file content, identifiers, queries) into a deduplicated
//! set of lowercase tokens. The same function is used at index time and at
//! query time so both sides agree on token boundaries.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Tokens of this many characters or fewer are dropped.
const MAX_DROPPED_LEN: usize = 2;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]+").unwrap());

const STOP_WORDS: &[&str] = &[
    "about", "after", "again", "all", "also", "and", "any", "are", "because", "been", "before",
    "being", "between", "both", "but", "can", "could", "did", "does", "doing", "down", "during",
    "each", "few", "for", "from", "further", "had", "has", "have", "having", "her", "here",
    "hers", "him", "his", "how", "into", "its", "itself", "just", "more", "most", "not", "now",
    "off", "once", "only", "other", "our", "ours", "out", "over", "own", "same", "she",
    "should", "some", "such", "than", "that", "the", "their", "theirs", "them", "then",
    "there", "these", "they", "this", "those", "through", "too", "under", "until", "very",
    "was", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "would", "you", "your", "yours",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Normalize `text` into a set of keywords.
///
/// Lowercases, strips non-word characters, splits on whitespace, and drops
/// short tokens and stop-words. Never fails; empty input yields an empty set.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    let cleaned = NON_WORD.replace_all(&lowered, " ");
    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > MAX_DROPPED_LEN)
        .filter(|t| !is_stop_word(t))
        .map(str::to_string)
        .collect()
}

/// Split a camelCase / snake_case identifier into its words, then normalize.
///
/// `processStripePayment` yields `{"process", "stripe", "payment"}` plus the
/// full lowercase identifier.
pub fn identifier_keywords(ident: &str) -> BTreeSet<String> {
    let mut spaced = String::with_capacity(ident.len() * 2);
    let mut prev_lower = false;
    for ch in ident.chars() {
        if ch == '_' || ch == '-' || ch == '$' {
            spaced.push(' ');
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower {
            spaced.push(' ');
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        spaced.push(ch);
    }
    let mut out = extract_keywords(&spaced);
    out.extend(extract_keywords(ident));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_words_are_sorted_for_binary_search() {
        let mut sorted = STOP_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOP_WORDS);
    }

    #[test]
    fn empty_input_yields_empty_set() {
        assert!(extract_keywords("").is_empty());
        assert!(extract_keywords("   \n\t ").is_empty());
        assert!(extract_keywords("?!,.").is_empty());
    }

    #[test]
    fn drops_short_tokens_and_stop_words() {
        let kws = extract_keywords("How does subscription payment work?");
        let expected: BTreeSet<String> = ["subscription", "payment", "work"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(kws, expected);
    }

    #[test]
    fn strips_punctuation_and_dedupes() {
        let kws = extract_keywords("Stripe: stripe, STRIPE! (webhooks) webhooks.");
        assert_eq!(kws.len(), 2);
        assert!(kws.contains("stripe"));
        assert!(kws.contains("webhooks"));
    }

    #[test]
    fn idempotent_under_retokenization() {
        let inputs = [
            "Processes subscription payments through Stripe",
            "export async function handleWebhook(req, res) { return res.json({ ok: true }); }",
            "Ünïcode wörds and snake_case_names mixed-with-dashes",
        ];
        for input in inputs {
            let once = extract_keywords(input);
            let joined = once.iter().cloned().collect::<Vec<_>>().join(" ");
            let twice = extract_keywords(&joined);
            assert_eq!(once, twice, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn identifier_keywords_split_camel_and_snake_case() {
        let kws = identifier_keywords("processStripePayment");
        assert!(kws.contains("process"));
        assert!(kws.contains("stripe"));
        assert!(kws.contains("payment"));
        assert!(kws.contains("processstripepayment"));

        let kws = identifier_keywords("send_welcome_email");
        assert!(kws.contains("send"));
        assert!(kws.contains("welcome"));
        assert!(kws.contains("email"));
    }
}
