//! Heuristic retrieval over a [`KnowledgeStore`].
//!
//! The algorithm operates on a store snapshot only, with no I/O and no
//! configuration dependencies; the application builds [`SearchParams`]
//! from its config.
//!
//! # Scoring
//!
//! For each query keyword `k` and entry `e`:
//!
//! | Signal | Condition | Weight |
//! |--------|-----------|--------|
//! | keyword | `k ∈ e.keywords` | `weights.keyword` |
//! | content | `k` is a substring of the lowercased content | `weights.content` |
//! | word boundary | `k` matches `\bk\b` in the content | `weights.word_boundary` |
//! | path | `k` is a substring of the lowercased file path | `weights.path` |
//! | metadata | `k` is a substring of the metadata values (no field names) | `weights.metadata` |
//!
//! The sum is divided by the number of query keywords. Entries flagged
//! `priority = "high"` with a positive score are multiplied by
//! `priority_boost`, clamped to `[1.0, 1.5]` so it can reorder close
//! results but never lift an unrelated entry over a strong match.
//!
//! Results below `min_score` are dropped, the rest sorted by score
//! descending with insertion order as the tie-break, then truncated to
//! `limit`. A query with no usable keywords, or with no entry above the
//! threshold, returns an empty list.

use std::cmp::Ordering;

use regex::Regex;
use serde::Serialize;

use crate::keywords::extract_keywords;
use crate::models::KnowledgeEntry;
use crate::store::KnowledgeStore;

pub const MIN_PRIORITY_BOOST: f64 = 1.0;
pub const MAX_PRIORITY_BOOST: f64 = 1.5;

/// Per-signal weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchWeights {
    pub keyword: f64,
    pub content: f64,
    pub word_boundary: f64,
    pub path: f64,
    pub metadata: f64,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            keyword: 10.0,
            content: 3.0,
            word_boundary: 2.0,
            path: 2.0,
            metadata: 1.0,
        }
    }
}

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub weights: SearchWeights,
    /// Maximum results to return.
    pub limit: usize,
    /// Results scoring below this are dropped.
    pub min_score: f64,
    /// Multiplier for high-priority entries; clamped on use.
    pub priority_boost: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            weights: SearchWeights::default(),
            limit: 20,
            min_score: 0.5,
            priority_boost: 1.25,
        }
    }
}

impl SearchParams {
    pub fn effective_boost(&self) -> f64 {
        if self.priority_boost.is_nan() {
            return MIN_PRIORITY_BOOST;
        }
        self.priority_boost.clamp(MIN_PRIORITY_BOOST, MAX_PRIORITY_BOOST)
    }
}

/// Contribution of each signal to a result's score, already divided by the
/// query keyword count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreExplanation {
    pub keyword: f64,
    pub content: f64,
    pub word_boundary: f64,
    pub path: f64,
    pub metadata: f64,
    /// Multiplier applied after the sum (1.0 when not boosted).
    pub boost: f64,
    /// Query keywords that matched at least one signal.
    pub matched_keywords: Vec<String>,
}

/// A ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntry {
    pub entry: KnowledgeEntry,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreExplanation>,
}

/// A normalized query with its boundary matchers compiled once.
pub struct PreparedQuery {
    keywords: Vec<String>,
    boundaries: Vec<Option<Regex>>,
}

impl PreparedQuery {
    pub fn new(query: &str) -> Self {
        let keywords: Vec<String> = extract_keywords(query).into_iter().collect();
        let boundaries = keywords
            .iter()
            .map(|k| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(k))).ok())
            .collect();
        Self {
            keywords,
            boundaries,
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

/// Rank the store's entries for `query`.
pub fn search(
    store: &KnowledgeStore,
    query: &str,
    params: &SearchParams,
    explain: bool,
) -> Vec<ScoredEntry> {
    let prepared = PreparedQuery::new(query);
    if prepared.is_empty() || params.limit == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<(usize, f64, ScoreExplanation)> = store.with_entries(|entries| {
        entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| {
                let (score, why) = score_entry(entry, &prepared, params);
                (score >= params.min_score && score > 0.0).then_some((idx, score, why))
            })
            .collect()
    });

    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.truncate(params.limit);

    store.with_entries(|entries| {
        ranked
            .into_iter()
            .filter_map(|(idx, score, why)| {
                entries.get(idx).map(|entry| ScoredEntry {
                    entry: entry.clone(),
                    score,
                    explain: explain.then_some(why),
                })
            })
            .collect()
    })
}

/// Score one entry against a prepared query.
pub fn score_entry(
    entry: &KnowledgeEntry,
    query: &PreparedQuery,
    params: &SearchParams,
) -> (f64, ScoreExplanation) {
    let w = &params.weights;
    let mut why = ScoreExplanation {
        boost: 1.0,
        ..Default::default()
    };
    if query.is_empty() {
        return (0.0, why);
    }

    let content = entry.content.to_lowercase();
    let path = entry.file_path.to_lowercase();
    let metadata = entry.metadata.searchable_text();

    for (keyword, boundary) in query.keywords.iter().zip(&query.boundaries) {
        let mut matched = false;
        if entry.keywords.contains(keyword) {
            why.keyword += w.keyword;
            matched = true;
        }
        if content.contains(keyword.as_str()) {
            why.content += w.content;
            matched = true;
            if boundary.as_ref().map_or(false, |re| re.is_match(&content)) {
                why.word_boundary += w.word_boundary;
            }
        }
        if path.contains(keyword.as_str()) {
            why.path += w.path;
            matched = true;
        }
        if metadata.contains(keyword.as_str()) {
            why.metadata += w.metadata;
            matched = true;
        }
        if matched {
            why.matched_keywords.push(keyword.clone());
        }
    }

    let n = query.keywords.len() as f64;
    why.keyword /= n;
    why.content /= n;
    why.word_boundary /= n;
    why.path /= n;
    why.metadata /= n;

    let mut score = why.keyword + why.content + why.word_boundary + why.path + why.metadata;
    if score > 0.0 && entry.metadata.is_high_priority() {
        why.boost = params.effective_boost();
        score *= why.boost;
    }
    (score, why)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryDetail, EntryMetadata, EntryType};
    use serde_json::json;

    fn entry(id: &str, content: &str, keywords: &[&str], path: &str) -> KnowledgeEntry {
        KnowledgeEntry {
            id: id.to_string(),
            entry_type: EntryType::Comment,
            content: content.to_string(),
            file_path: path.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            metadata: EntryMetadata::new(EntryDetail::Comment { doc_block: true }),
            last_updated: None,
        }
    }

    fn payment_store() -> KnowledgeStore {
        KnowledgeStore::from_entries(vec![
            entry(
                "theme",
                "Renders the theme header and navigation",
                &["theme", "header", "navigation"],
                "themes/casper/header.hbs",
            ),
            entry(
                "payment",
                "Processes subscription payments through Stripe",
                &["subscription", "payment", "stripe"],
                "members/payment.js",
            ),
            entry(
                "email",
                "Sends a payment receipt email",
                &["sends", "receipt", "email"],
                "services/mail.js",
            ),
        ])
    }

    #[test]
    fn metadata_field_names_do_not_match() {
        let store = KnowledgeStore::from_entries(crate::synthetic::synthetic_entries());
        for query in ["detail", "kind", "hints", "synthetic", "doc_block", "is_async"] {
            let results = search(&store, query, &SearchParams::default(), false);
            assert!(results.is_empty(), "{} matched {} entries", query, results.len());
        }
    }

    #[test]
    fn metadata_values_still_match() {
        let mut invoice = entry("invoice", "Handles billing", &["handles", "billing"], "src/billing.js");
        invoice.metadata = EntryMetadata::new(EntryDetail::Function {
            name: "createInvoice".to_string(),
            params: vec!["member".to_string()],
            is_async: true,
            is_method: false,
        })
        .with_hint("imports", json!(["stripe-node"]));
        let store = KnowledgeStore::from_entries(vec![invoice]);

        let results = search(&store, "createInvoice", &SearchParams::default(), true);
        assert_eq!(results.len(), 1);
        let why = results[0].explain.as_ref().unwrap();
        assert!(why.metadata > 0.0);
        assert_eq!(why.keyword, 0.0);

        assert_eq!(search(&store, "stripe-node", &SearchParams::default(), false).len(), 1);
    }

    #[test]
    fn payment_scenario_ranks_first() {
        let store = payment_store();
        let results = search(
            &store,
            "How does subscription payment work?",
            &SearchParams::default(),
            false,
        );
        assert!(!results.is_empty());
        assert_eq!(results[0].entry.id, "payment");
        assert!(results[0].score > 0.0);
        assert!(results.iter().all(|r| r.entry.id != "theme"));
    }

    #[test]
    fn zero_keyword_query_is_empty() {
        let store = payment_store();
        assert!(search(&store, "how is it?", &SearchParams::default(), false).is_empty());
        assert!(search(&store, "", &SearchParams::default(), false).is_empty());
    }

    #[test]
    fn no_match_returns_empty() {
        let store = payment_store();
        let results = search(&store, "kubernetes autoscaling", &SearchParams::default(), false);
        assert!(results.is_empty());
    }

    #[test]
    fn adding_exact_keyword_never_lowers_score() {
        let params = SearchParams::default();
        let query = PreparedQuery::new("stripe webhook");
        let without = entry("a", "Handles the stripe webhook", &["handles"], "a.js");
        let mut with = without.clone();
        with.keywords.insert("webhook".to_string());
        let (s1, _) = score_entry(&without, &query, &params);
        let (s2, _) = score_entry(&with, &query, &params);
        assert!(s2 >= s1);
        assert!(s2 > s1);
    }

    #[test]
    fn results_are_deterministic_with_insertion_tie_break() {
        let store = KnowledgeStore::from_entries(vec![
            entry("first", "same text about billing", &["billing"], "a.js"),
            entry("second", "same text about billing", &["billing"], "b.js"),
        ]);
        let params = SearchParams::default();
        let one = search(&store, "billing", &params, false);
        let two = search(&store, "billing", &params, false);
        assert_eq!(one, two);
        assert_eq!(one[0].entry.id, "first");
        assert_eq!(one[1].entry.id, "second");
    }

    #[test]
    fn priority_boost_is_clamped_and_reorders_close_results() {
        let mut boosted = entry("boosted", "billing overview", &["billing"], "README.md");
        boosted.metadata = boosted.metadata.with_hint("priority", json!("high"));
        let plain = entry("plain", "billing overview", &["billing"], "docs/billing.md");
        let store = KnowledgeStore::from_entries(vec![plain, boosted]);

        let params = SearchParams {
            priority_boost: 10.0,
            ..Default::default()
        };
        assert_eq!(params.effective_boost(), MAX_PRIORITY_BOOST);

        let results = search(&store, "billing", &params, true);
        // The plain entry also matches on its path, the boost still wins.
        assert_eq!(results[0].entry.id, "boosted");
        let explain = results[0].explain.as_ref().unwrap();
        assert_eq!(explain.boost, MAX_PRIORITY_BOOST);
        assert_eq!(explain.matched_keywords, vec!["billing"]);
    }

    #[test]
    fn limit_and_threshold_are_applied() {
        let store = payment_store();
        let params = SearchParams {
            limit: 1,
            ..Default::default()
        };
        assert_eq!(search(&store, "payment", &params, false).len(), 1);

        let strict = SearchParams {
            min_score: 1000.0,
            ..Default::default()
        };
        assert!(search(&store, "payment", &strict, false).is_empty());
    }
}
