//! Indexes and their statistics snapshot

use crate::btree::{BTreeIndex, TreeError, TreeResult};
use crate::config::TreeConfig;
use crate::stats::IndexStats;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Kind of index, which decides whether statistics are gathered for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Holds the rows; the first index of every table
    Clustered,
    Secondary,
    /// Never analyzed
    FullText,
    /// Never analyzed
    Spatial,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::Clustered => write!(f, "clustered"),
            IndexKind::Secondary => write!(f, "secondary"),
            IndexKind::FullText => write!(f, "fulltext"),
            IndexKind::Spatial => write!(f, "spatial"),
        }
    }
}

/// Static description of an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub kind: IndexKind,
    /// Leading fields that identify a record
    pub n_uniq: usize,
    pub n_fields: usize,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, kind: IndexKind, n_uniq: usize, n_fields: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            n_uniq,
            n_fields,
        }
    }
}

/// An index: its tree, lifecycle flags and current statistics
///
/// Statistics are an immutable snapshot behind a lock. A recalculation
/// builds a complete new `IndexStats` and swaps it in, so readers holding
/// an older `Arc` keep a consistent value.
pub struct Index {
    def: IndexDef,
    tree: BTreeIndex,
    committed: AtomicBool,
    to_be_dropped: AtomicBool,
    corrupted: AtomicBool,
    /// Serializes analyses of this index
    analyze_lock: Mutex<()>,
    stats: RwLock<Arc<IndexStats>>,
}

impl Index {
    /// Create an index over an empty tree
    pub fn new(def: IndexDef, config: &TreeConfig) -> TreeResult<Self> {
        let tree = BTreeIndex::new(def.n_uniq, def.n_fields, config)?;
        Self::with_tree(def, tree)
    }

    /// Wrap an existing tree, e.g. one built with `BTreeIndex::bulk_load`
    pub fn with_tree(def: IndexDef, tree: BTreeIndex) -> TreeResult<Self> {
        if tree.n_uniq() != def.n_uniq || tree.n_fields() != def.n_fields {
            return Err(TreeError::Config(format!(
                "index {} declares {}/{} fields, tree has {}/{}",
                def.name,
                def.n_uniq,
                def.n_fields,
                tree.n_uniq(),
                tree.n_fields()
            )));
        }

        let stats = IndexStats::empty(def.n_uniq);
        Ok(Self {
            def,
            tree,
            committed: AtomicBool::new(true),
            to_be_dropped: AtomicBool::new(false),
            corrupted: AtomicBool::new(false),
            analyze_lock: Mutex::new(()),
            stats: RwLock::new(Arc::new(stats)),
        })
    }

    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn kind(&self) -> IndexKind {
        self.def.kind
    }

    pub fn n_uniq(&self) -> usize {
        self.def.n_uniq
    }

    pub fn tree(&self) -> &BTreeIndex {
        &self.tree
    }

    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    pub fn set_committed(&self, committed: bool) {
        self.committed.store(committed, Ordering::Release);
    }

    pub fn is_to_be_dropped(&self) -> bool {
        self.to_be_dropped.load(Ordering::Acquire)
    }

    pub fn mark_to_be_dropped(&self) {
        self.to_be_dropped.store(true, Ordering::Release);
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted.load(Ordering::Acquire)
    }

    pub fn mark_corrupted(&self) {
        self.corrupted.store(true, Ordering::Release);
    }

    /// Full-text and spatial indexes carry no cardinality statistics
    pub fn has_stats(&self) -> bool {
        !matches!(self.def.kind, IndexKind::FullText | IndexKind::Spatial)
    }

    /// Whether table analysis leaves this index out
    pub fn should_ignore(&self) -> bool {
        !self.has_stats() || self.is_to_be_dropped() || !self.is_committed() || self.is_corrupted()
    }

    /// Current statistics snapshot
    pub fn stats(&self) -> Arc<IndexStats> {
        Arc::clone(&self.stats.read())
    }

    /// Replace the statistics snapshot
    pub fn set_stats(&self, stats: IndexStats) {
        assert_eq!(
            stats.n_uniq(),
            self.def.n_uniq,
            "statistics for index {} have the wrong number of prefixes",
            self.def.name
        );
        *self.stats.write() = Arc::new(stats);
    }

    /// Back to the empty state
    pub fn reset_stats(&self) {
        *self.stats.write() = Arc::new(IndexStats::empty(self.def.n_uniq));
    }

    /// Hold this while analyzing; a second analysis of the same index waits
    pub fn lock_for_analyze(&self) -> MutexGuard<'_, ()> {
        self.analyze_lock.lock()
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("def", &self.def)
            .field("committed", &self.is_committed())
            .field("to_be_dropped", &self.is_to_be_dropped())
            .field("corrupted", &self.is_corrupted())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::Record;

    fn secondary() -> IndexDef {
        IndexDef::new("idx_a", IndexKind::Secondary, 2, 2)
    }

    #[test]
    fn test_new_index_has_empty_stats() {
        let index = Index::new(secondary(), &TreeConfig::default()).unwrap();
        assert!(index.stats().is_empty_state());
        assert!(index.is_committed());
        assert!(!index.should_ignore());
    }

    #[test]
    fn test_with_tree_checks_shape() {
        let tree = BTreeIndex::new(1, 2, &TreeConfig::default()).unwrap();
        let err = Index::with_tree(secondary(), tree).unwrap_err();
        assert!(matches!(err, TreeError::Config(_)));
    }

    #[test]
    fn test_snapshot_swap() {
        let index = Index::new(secondary(), &TreeConfig::default()).unwrap();
        let before = index.stats();

        let mut stats = IndexStats::empty(2);
        stats.n_diff_key_vals = vec![3, 9];
        index.set_stats(stats);

        // An old reader keeps its consistent snapshot
        assert!(before.is_empty_state());
        assert_eq!(index.stats().n_diff_key_vals, vec![3, 9]);

        index.reset_stats();
        assert!(index.stats().is_empty_state());
    }

    #[test]
    fn test_should_ignore() {
        let fts = Index::new(IndexDef::new("ft", IndexKind::FullText, 1, 1), &TreeConfig::default()).unwrap();
        assert!(fts.should_ignore());

        let index = Index::new(secondary(), &TreeConfig::default()).unwrap();
        index.set_committed(false);
        assert!(index.should_ignore());
        index.set_committed(true);
        index.mark_to_be_dropped();
        assert!(index.should_ignore());

        let index = Index::new(secondary(), &TreeConfig::default()).unwrap();
        index.mark_corrupted();
        assert!(index.should_ignore());
    }

    #[test]
    fn test_tree_is_writable() {
        let index = Index::new(secondary(), &TreeConfig::default()).unwrap();
        index.tree().insert(Record::from_ints(&[1, 2])).unwrap();
        assert_eq!(index.tree().n_records(), 1);
    }
}
