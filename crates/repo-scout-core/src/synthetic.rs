//! Built-in fallback dataset.
//!
//! Served when no repository is configured, and merged into the store when
//! a crawl does not produce trustworthy real data. Every entry carries the
//! `synthetic = true` hint so it can never be mistaken for crawled content.

use std::collections::BTreeSet;

use serde_json::json;

use crate::extract::entry_id;
use crate::keywords::extract_keywords;
use crate::models::{EntryDetail, EntryMetadata, EntryType, KnowledgeEntry};

const DATASET: &[(EntryType, &str, &str)] = &[
    (
        EntryType::Page,
        "README.md",
        "Project overview: a web application with a members area, paid subscriptions, an admin dashboard and a public REST API.",
    ),
    (
        EntryType::Comment,
        "src/auth/session.js",
        "Authenticates a user with email and password and issues a signed session cookie.",
    ),
    (
        EntryType::Function,
        "src/payments/checkout.js",
        "async function createCheckoutSession(member, plan) creates a hosted checkout for the selected subscription plan.",
    ),
    (
        EntryType::ApiRoute,
        "src/api/routes.js",
        "GET /api/posts handled by listPosts returns published posts with pagination.",
    ),
    (
        EntryType::Class,
        "src/services/mailer.js",
        "class Mailer extends BaseService with methods send, sendWelcome, sendReceipt",
    ),
    (
        EntryType::Export,
        "src/models/index.js",
        "export Member, Post, Tag, Subscription models backed by the relational database.",
    ),
    (
        EntryType::Config,
        "package.json",
        "Package example-app. Scripts: dev, build, test. Dependencies: express, knex, stripe",
    ),
    (
        EntryType::TextContent,
        "src/views/signup.hbs",
        "Create your account to start reading members-only content.",
    ),
];

/// The fixed synthetic entries, in a stable order.
pub fn synthetic_entries() -> Vec<KnowledgeEntry> {
    DATASET
        .iter()
        .enumerate()
        .map(|(ordinal, (entry_type, path, content))| KnowledgeEntry {
            id: entry_id(path, *entry_type, ordinal, content),
            entry_type: *entry_type,
            content: content.to_string(),
            file_path: path.to_string(),
            keywords: extract_keywords(content),
            metadata: EntryMetadata::new(EntryDetail::Synthetic).with_hint("synthetic", json!(true)),
            last_updated: None,
        })
        .collect()
}

/// Share of `entries` that are copies of synthetic entries, in `[0, 1]`.
///
/// An empty slice counts as fully synthetic: nothing in it distinguishes it
/// from the fallback.
pub fn synthetic_overlap(entries: &[KnowledgeEntry]) -> f64 {
    if entries.is_empty() {
        return 1.0;
    }
    let known: BTreeSet<(&str, &str)> = DATASET.iter().map(|(_, p, c)| (*p, *c)).collect();
    let copies = entries
        .iter()
        .filter(|e| {
            matches!(e.metadata.detail, EntryDetail::Synthetic)
                || known.contains(&(e.file_path.as_str(), e.content.as_str()))
        })
        .count();
    copies as f64 / entries.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_is_stable_and_flagged() {
        let a = synthetic_entries();
        let b = synthetic_entries();
        assert_eq!(a, b);
        assert_eq!(a.len(), DATASET.len());
        assert!(a
            .iter()
            .all(|e| e.metadata.hints.get("synthetic") == Some(&json!(true))));
    }

    #[test]
    fn overlap_ratio() {
        let synthetic = synthetic_entries();
        assert_eq!(synthetic_overlap(&synthetic), 1.0);
        assert_eq!(synthetic_overlap(&[]), 1.0);

        let mut real = synthetic[0].clone();
        real.metadata = EntryMetadata::new(EntryDetail::Comment { doc_block: false });
        real.content = "Crawled from the actual repository".to_string();
        let mixed = vec![real.clone(), real, synthetic[1].clone(), synthetic[2].clone()];
        assert_eq!(synthetic_overlap(&mixed), 0.5);
    }
}
