//! In-memory knowledge store.
//!
//! An insertion-ordered, append-only sequence of [`KnowledgeEntry`] values
//! behind a `std::sync::RwLock`. Overlapping directory visits may append the
//! same entry twice; nothing here deduplicates.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{KnowledgeEntry, KnowledgeStats};

/// Shared store for one engine instance.
#[derive(Debug, Default)]
pub struct KnowledgeStore {
    entries: RwLock<Vec<KnowledgeEntry>>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<KnowledgeEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<KnowledgeEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<KnowledgeEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, entry: KnowledgeEntry) {
        self.write().push(entry);
    }

    pub fn extend(&self, entries: impl IntoIterator<Item = KnowledgeEntry>) {
        self.write().extend(entries);
    }

    /// Copy of the current contents, in insertion order.
    pub fn snapshot(&self) -> Vec<KnowledgeEntry> {
        self.read().clone()
    }

    /// Run `f` against the entries without cloning them.
    pub fn with_entries<R>(&self, f: impl FnOnce(&[KnowledgeEntry]) -> R) -> R {
        f(&self.read())
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Swap in a whole new entry set (used after a completed scan or a cache load).
    pub fn replace(&self, entries: Vec<KnowledgeEntry>) {
        *self.write() = entries;
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Totals by entry type. `processed_file_count` is the number of
    /// distinct file paths represented in the store.
    pub fn stats(&self) -> KnowledgeStats {
        let entries = self.read();
        let mut by_type = BTreeMap::new();
        let mut files = BTreeSet::new();
        for e in entries.iter() {
            *by_type.entry(e.entry_type).or_insert(0) += 1;
            files.insert(e.file_path.as_str());
        }
        KnowledgeStats {
            total_entries: entries.len(),
            by_type,
            processed_file_count: files.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryDetail, EntryMetadata, EntryType};

    fn entry(id: &str, path: &str, entry_type: EntryType) -> KnowledgeEntry {
        KnowledgeEntry {
            id: id.to_string(),
            entry_type,
            content: format!("content of {id}"),
            file_path: path.to_string(),
            keywords: BTreeSet::new(),
            metadata: EntryMetadata::new(EntryDetail::Synthetic),
            last_updated: None,
        }
    }

    #[test]
    fn append_preserves_insertion_order_and_duplicates() {
        let store = KnowledgeStore::new();
        store.append(entry("b", "x.js", EntryType::Function));
        store.append(entry("a", "x.js", EntryType::Comment));
        store.append(entry("b", "x.js", EntryType::Function));
        let ids: Vec<String> = store.snapshot().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["b", "a", "b"]);
    }

    #[test]
    fn clear_and_replace() {
        let store = KnowledgeStore::new();
        store.extend(vec![entry("a", "x.js", EntryType::Comment)]);
        assert_eq!(store.len(), 1);
        store.clear();
        assert!(store.is_empty());
        store.replace(vec![
            entry("c", "y.js", EntryType::Class),
            entry("d", "z.md", EntryType::Page),
        ]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn stats_count_types_and_distinct_files() {
        let store = KnowledgeStore::from_entries(vec![
            entry("1", "a.js", EntryType::Function),
            entry("2", "a.js", EntryType::Function),
            entry("3", "b.md", EntryType::Page),
        ]);
        let stats = store.stats();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.by_type[&EntryType::Function], 2);
        assert_eq!(stats.by_type[&EntryType::Page], 1);
        assert_eq!(stats.processed_file_count, 2);
    }
}
