//! Tables: an ordered set of indexes plus table-level statistics

use crate::dict::index::{Index, IndexKind};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Table-level statistics derived from its indexes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    /// Estimated rows: distinct full keys of the clustered index
    pub n_rows: u64,
    pub clustered_index_size: u64,
    pub sum_of_other_index_sizes: u64,
    pub last_recalc: Option<DateTime<Utc>>,
    /// False until the first recalculation or reset
    pub initialized: bool,
}

impl TableStats {
    /// One page per index, no rows
    pub fn empty(n_indexes: usize) -> Self {
        Self {
            n_rows: 0,
            clustered_index_size: 1,
            sum_of_other_index_sizes: n_indexes.saturating_sub(1) as u64,
            last_recalc: None,
            initialized: false,
        }
    }
}

/// A table and the indexes defined on it; the first index is the clustered one
pub struct Table {
    name: String,
    indexes: Vec<Arc<Index>>,
    stats: RwLock<TableStats>,
    /// Rows changed since the last recalculation
    modified: AtomicU64,
    corrupted: AtomicBool,
    /// Raised to make a running analysis stop between indexes
    should_quit: AtomicBool,
}

impl Table {
    pub fn new(name: impl Into<String>, indexes: Vec<Arc<Index>>) -> Self {
        let stats = TableStats::empty(indexes.len());
        Self {
            name: name.into(),
            indexes,
            stats: RwLock::new(stats),
            modified: AtomicU64::new(0),
            corrupted: AtomicBool::new(false),
            should_quit: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indexes(&self) -> &[Arc<Index>] {
        &self.indexes
    }

    /// The first index, if it really is a clustered index
    pub fn clustered_index(&self) -> Option<&Arc<Index>> {
        self.indexes
            .first()
            .filter(|index| index.kind() == IndexKind::Clustered)
    }

    pub fn index(&self, name: &str) -> Option<&Arc<Index>> {
        self.indexes.iter().find(|index| index.name() == name)
    }

    pub fn stats(&self) -> TableStats {
        self.stats.read().clone()
    }

    pub(crate) fn set_stats(&self, stats: TableStats) {
        *self.stats.write() = stats;
    }

    /// Reset the table and every index with statistics to the empty state
    pub fn reset_stats(&self) {
        for index in self.indexes.iter().filter(|i| i.has_stats()) {
            index.reset_stats();
        }
        let mut stats = TableStats::empty(self.indexes.len());
        stats.initialized = true;
        self.set_stats(stats);
        self.modified.store(0, Ordering::Release);
    }

    /// Record `rows` changed rows
    pub fn note_modified(&self, rows: u64) {
        self.modified.fetch_add(rows, Ordering::AcqRel);
    }

    pub fn modified_count(&self) -> u64 {
        self.modified.load(Ordering::Acquire)
    }

    pub(crate) fn reset_modified(&self) {
        self.modified.store(0, Ordering::Release);
    }

    /// More than a tenth of the rows changed since the last recalculation
    pub fn needs_recalc(&self) -> bool {
        let modified = self.modified_count();
        modified > 0 && modified > self.stats.read().n_rows / 10
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted.load(Ordering::Acquire)
    }

    /// Mark the table as corrupted or discarded; its next analysis resets it
    pub fn mark_corrupted(&self) {
        self.corrupted.store(true, Ordering::Release);
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit.load(Ordering::Acquire)
    }

    pub fn request_quit(&self) {
        self.should_quit.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("indexes", &self.indexes)
            .field("stats", &self.stats())
            .field("modified", &self.modified_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::dict::index::IndexDef;

    fn table() -> Table {
        let config = TreeConfig::default();
        let indexes = vec![
            IndexDef::new("PRIMARY", IndexKind::Clustered, 1, 3),
            IndexDef::new("idx_b", IndexKind::Secondary, 2, 2),
            IndexDef::new("ft_c", IndexKind::FullText, 1, 1),
        ]
        .into_iter()
        .map(|def| Arc::new(Index::new(def, &config).unwrap()))
        .collect();
        Table::new("t", indexes)
    }

    #[test]
    fn test_new_table() {
        let t = table();
        let stats = t.stats();

        assert_eq!(stats, TableStats::empty(3));
        assert_eq!(stats.sum_of_other_index_sizes, 2);
        assert!(!stats.initialized);
        assert_eq!(t.clustered_index().unwrap().name(), "PRIMARY");
        assert!(t.index("idx_b").is_some());
        assert!(t.index("nope").is_none());
    }

    #[test]
    fn test_needs_recalc_after_ten_percent() {
        let t = table();
        assert!(!t.needs_recalc());

        // Never analyzed: any change counts
        t.note_modified(1);
        assert!(t.needs_recalc());

        t.set_stats(TableStats {
            n_rows: 1000,
            ..TableStats::empty(3)
        });
        t.reset_modified();
        t.note_modified(100);
        assert!(!t.needs_recalc());
        t.note_modified(1);
        assert!(t.needs_recalc());
    }

    #[test]
    fn test_reset_stats() {
        let t = table();
        let mut stats = crate::stats::IndexStats::empty(2);
        stats.n_diff_key_vals = vec![5, 10];
        t.indexes()[1].set_stats(stats);
        t.note_modified(7);

        t.reset_stats();

        assert!(t.indexes()[1].stats().is_empty_state());
        assert!(t.stats().initialized);
        assert_eq!(t.modified_count(), 0);
    }

    #[test]
    fn test_quit_flag() {
        let t = table();
        assert!(!t.should_quit());
        t.request_quit();
        assert!(t.should_quit());
    }
}
