//! Core data types for the paged B-tree
//!
//! This module defines the values the tree stores and the shape it exposes:
//! - `Datum`: a single key column value
//! - `Record`: a leaf row or a node pointer
//! - `Page`: an ordered run of records on one tree level
//! - `ScanEpoch`: what a reader observed of the tree's shape under a latch

use serde::{Deserialize, Serialize};

/// Page number inside a tree's page arena
pub type PageId = u32;

/// A single key column value
///
/// Ordering is `Null < Int < Text`. For statistics purposes two nulls are
/// considered equal, so a run of nulls forms a single distinct group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Int(i64),
    Text(String),
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Text(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::Text(v)
    }
}

impl std::fmt::Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Int(v) => write!(f, "{}", v),
            Datum::Text(v) => write!(f, "'{}'", v),
        }
    }
}

/// A record on a tree page
///
/// Leaf records carry the full field list of the index. Node pointers carry
/// the `n_uniq` key prefix of their child's first record plus the child page.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Column values, key columns first
    pub fields: Vec<Datum>,
    /// Logically deleted, waiting for purge (leaf level only)
    pub delete_marked: bool,
    /// Predefined minimum record: first node pointer on the leftmost page of a non-leaf level
    pub min_rec: bool,
    /// Child page (node pointers only)
    pub child: Option<PageId>,
    /// Byte lengths of fields stored off-page
    pub external: Vec<u64>,
}

impl Record {
    /// Create a leaf record
    pub fn new(fields: Vec<Datum>) -> Self {
        Self {
            fields,
            delete_marked: false,
            min_rec: false,
            child: None,
            external: Vec::new(),
        }
    }

    /// Create a leaf record from integer columns
    pub fn from_ints(values: &[i64]) -> Self {
        Self::new(values.iter().copied().map(Datum::Int).collect())
    }

    /// Create a node pointer to `child`
    pub fn node_ptr(prefix: Vec<Datum>, child: PageId) -> Self {
        Self {
            fields: prefix,
            delete_marked: false,
            min_rec: false,
            child: Some(child),
            external: Vec::new(),
        }
    }

    /// Builder method: add an externally stored field of `len` bytes
    pub fn with_external(mut self, len: u64) -> Self {
        self.external.push(len);
        self
    }

    /// Builder method: set the delete mark
    pub fn deleted(mut self) -> Self {
        self.delete_marked = true;
        self
    }

    /// Whether this record points at a child page
    pub fn is_node_ptr(&self) -> bool {
        self.child.is_some()
    }

    /// Leading `n` fields (clamped to the record length)
    pub fn prefix(&self, n: usize) -> &[Datum] {
        &self.fields[..n.min(self.fields.len())]
    }

    /// Number of overflow pages referenced by this record
    pub fn external_pages(&self, page_size: u64) -> u64 {
        if page_size == 0 {
            return 0;
        }
        self.external
            .iter()
            .map(|len| (len + page_size - 1) / page_size)
            .sum()
    }
}

/// One page of the tree
#[derive(Debug, Clone)]
pub struct Page {
    pub id: PageId,
    /// Tree level, 0 = leaf
    pub level: u16,
    /// Left sibling on the same level
    pub prev: Option<PageId>,
    /// Right sibling on the same level
    pub next: Option<PageId>,
    /// User records in key order
    pub records: Vec<Record>,
}

impl Page {
    pub fn new(id: PageId, level: u16) -> Self {
        Self {
            id,
            level,
            prev: None,
            next: None,
            records: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    pub fn has_prev(&self) -> bool {
        self.prev.is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The tree shape a reader saw inside one latch scope
///
/// `root_level` changes only when the root splits; `modify_clock` moves on
/// every insert, delete mark, split or purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEpoch {
    pub root_level: u16,
    pub modify_clock: u64,
}

impl ScanEpoch {
    /// Whether the tree still has the height it had at `earlier`
    pub fn same_height(&self, earlier: &ScanEpoch) -> bool {
        self.root_level == earlier.root_level
    }
}
