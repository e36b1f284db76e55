//! In-memory paged B+tree
//!
//! Pages live in an arena indexed by `PageId`. Every level is a doubly linked
//! list of pages; non-leaf pages hold node pointers keyed by the `n_uniq`
//! prefix of their child's first record.
//!
//! # Latching
//! - Readers take the shared side of the tree latch through [`IndexTree::latch`]
//! - `insert`, `delete_mark` and `purge` take the exclusive side
//!
//! A reader therefore sees a consistent tree for as long as it holds its
//! view, and writers are only held up for the duration of one such scope.

use crate::btree::error::{TreeError, TreeResult};
use crate::btree::types::{Datum, Page, PageId, Record, ScanEpoch};
use crate::btree::{IndexTree, TreeView};
use crate::config::TreeConfig;
use parking_lot::{RwLock, RwLockReadGuard};
use std::cmp::Ordering;

/// Mutable part of the tree, guarded by the tree latch
struct TreeState {
    pages: Vec<Page>,
    root: PageId,
    /// Ordinary leaf pages
    leaf_pages: u64,
    /// Overflow pages referenced from leaf records
    external_pages: u64,
    /// Leaf records, delete-marked ones included
    n_records: u64,
    modify_clock: u64,
}

impl TreeState {
    fn empty() -> Self {
        Self {
            pages: vec![Page::new(0, 0)],
            root: 0,
            leaf_pages: 1,
            external_pages: 0,
            n_records: 0,
            modify_clock: 0,
        }
    }

    fn page(&self, id: PageId) -> &Page {
        &self.pages[id as usize]
    }

    fn page_mut(&mut self, id: PageId) -> &mut Page {
        &mut self.pages[id as usize]
    }

    fn next_id(&self) -> PageId {
        self.pages.len() as PageId
    }
}

/// A paged B+tree held in memory
pub struct BTreeIndex {
    state: RwLock<TreeState>,
    n_uniq: usize,
    n_fields: usize,
    page_capacity: usize,
    page_size: u64,
}

impl BTreeIndex {
    /// Create an empty tree: a single empty leaf page as the root
    pub fn new(n_uniq: usize, n_fields: usize, config: &TreeConfig) -> TreeResult<Self> {
        if n_uniq == 0 || n_uniq > n_fields {
            return Err(TreeError::Config(format!(
                "n_uniq must be in 1..={}, got {}",
                n_fields, n_uniq
            )));
        }
        if config.page_capacity < 3 {
            return Err(TreeError::Config(format!(
                "page capacity must be at least 3, got {}",
                config.page_capacity
            )));
        }

        Ok(Self {
            state: RwLock::new(TreeState::empty()),
            n_uniq,
            n_fields,
            page_capacity: config.page_capacity,
            page_size: config.page_size,
        })
    }

    /// Build a tree bottom-up from a batch of records
    ///
    /// Records are sorted first. Pages are filled to `fill_factor` of their
    /// capacity, so later inserts do not split immediately.
    pub fn bulk_load(
        n_uniq: usize,
        n_fields: usize,
        mut records: Vec<Record>,
        config: &TreeConfig,
    ) -> TreeResult<Self> {
        let tree = Self::new(n_uniq, n_fields, config)?;

        for record in &records {
            tree.check_fields(record)?;
        }

        records.sort_by(|a, b| a.prefix(n_uniq).cmp(b.prefix(n_uniq)));
        if let Some(dup) = records
            .windows(2)
            .find(|w| w[0].prefix(n_uniq) == w[1].prefix(n_uniq))
        {
            return Err(TreeError::DuplicateKey(fmt_key(dup[1].prefix(n_uniq))));
        }

        if records.is_empty() {
            return Ok(tree);
        }

        let per_page = ((config.page_capacity as f64 * config.fill_factor).floor() as usize)
            .clamp(1, config.page_capacity);
        // Interior pages need at least two pointers or the levels never converge
        let per_interior_page = per_page.max(2);

        let mut state = TreeState {
            pages: Vec::new(),
            root: 0,
            leaf_pages: 0,
            external_pages: 0,
            n_records: records.len() as u64,
            modify_clock: 0,
        };
        state.external_pages = records
            .iter()
            .map(|r| r.external_pages(config.page_size))
            .sum();

        let mut level_pages = build_level(&mut state.pages, 0, records, per_page);
        state.leaf_pages = level_pages.len() as u64;

        let mut level = 0u16;
        while level_pages.len() > 1 {
            level += 1;
            let pointers: Vec<Record> = level_pages
                .iter()
                .enumerate()
                .map(|(i, &child)| {
                    let first = &state.page(child).records[0];
                    let mut ptr = Record::node_ptr(first.prefix(n_uniq).to_vec(), child);
                    ptr.min_rec = i == 0;
                    ptr
                })
                .collect();
            level_pages = build_level(&mut state.pages, level, pointers, per_interior_page);
        }
        state.root = level_pages[0];

        *tree.state.write() = state;
        Ok(tree)
    }

    /// Number of leading fields that identify a record
    pub fn n_uniq(&self) -> usize {
        self.n_uniq
    }

    /// Number of fields in a leaf record
    pub fn n_fields(&self) -> usize {
        self.n_fields
    }

    /// Level of the root page
    pub fn height(&self) -> u16 {
        let state = self.state.read();
        state.page(state.root).level
    }

    /// Leaf records, delete-marked ones included
    pub fn n_records(&self) -> u64 {
        self.state.read().n_records
    }

    /// Pages in the arena, all levels
    pub fn page_count(&self) -> usize {
        self.state.read().pages.len()
    }

    /// Insert a leaf record
    ///
    /// Inserting over a delete-marked record with the same unique prefix
    /// replaces it. Full pages split in half; a root split grows the tree.
    pub fn insert(&self, record: Record) -> TreeResult<()> {
        self.check_fields(&record)?;
        let n_uniq = self.n_uniq;
        let page_size = self.page_size;

        let mut state = self.state.write();
        let (leaf, mut path) = find_leaf(&state, record.prefix(n_uniq));

        let page = state.page_mut(leaf);
        let pos = page
            .records
            .binary_search_by(|r| r.prefix(n_uniq).cmp(record.prefix(n_uniq)));
        match pos {
            Ok(pos) if page.records[pos].delete_marked => {
                let old = page.records[pos].external_pages(page_size);
                let new = record.external_pages(page_size);
                page.records[pos] = record;
                state.external_pages = state.external_pages - old + new;
                state.modify_clock += 1;
                return Ok(());
            }
            Ok(_) => {
                return Err(TreeError::DuplicateKey(fmt_key(record.prefix(n_uniq))));
            }
            Err(pos) => {
                let external = record.external_pages(page_size);
                page.records.insert(pos, record);
                state.external_pages += external;
                state.n_records += 1;
            }
        }

        let mut current = leaf;
        while state.page(current).len() > self.page_capacity {
            let right = split_page(&mut state, current);
            let separator = Record::node_ptr(
                state.page(right).records[0].prefix(n_uniq).to_vec(),
                right,
            );

            match path.pop() {
                Some((parent, slot)) => {
                    state.page_mut(parent).records.insert(slot + 1, separator);
                    current = parent;
                }
                None => {
                    let level = state.page(current).level + 1;
                    let root_id = state.next_id();
                    let mut left = Record::node_ptr(
                        state.page(current).records[0].prefix(n_uniq).to_vec(),
                        current,
                    );
                    left.min_rec = true;

                    let mut root = Page::new(root_id, level);
                    root.records = vec![left, separator];
                    state.pages.push(root);
                    state.root = root_id;
                    tracing::trace!(root = root_id, level, "Root split");
                    break;
                }
            }
        }

        state.modify_clock += 1;
        Ok(())
    }

    /// Set the delete mark on the live record with the given unique prefix
    pub fn delete_mark(&self, key: &[Datum]) -> TreeResult<()> {
        let key = &key[..key.len().min(self.n_uniq)];
        if key.len() != self.n_uniq {
            return Err(TreeError::FieldCount {
                expected: self.n_uniq,
                got: key.len(),
            });
        }

        let mut state = self.state.write();
        let (leaf, _) = find_leaf(&state, key);
        let n_uniq = self.n_uniq;
        let page = state.page_mut(leaf);

        match page
            .records
            .binary_search_by(|r| r.prefix(n_uniq).cmp(key))
        {
            Ok(pos) if !page.records[pos].delete_marked => {
                page.records[pos].delete_marked = true;
                state.modify_clock += 1;
                Ok(())
            }
            _ => Err(TreeError::KeyNotFound(fmt_key(key))),
        }
    }

    /// Physically remove delete-marked leaf records
    ///
    /// Pages are not merged; a leaf page may be left empty. Returns the
    /// number of records removed.
    pub fn purge(&self) -> u64 {
        let mut state = self.state.write();
        let page_size = self.page_size;
        let mut removed = 0u64;
        let mut freed_external = 0u64;

        for page in state.pages.iter_mut().filter(|p| p.is_leaf()) {
            page.records.retain(|r| {
                if r.delete_marked {
                    removed += 1;
                    freed_external += r.external_pages(page_size);
                    false
                } else {
                    true
                }
            });
        }

        if removed > 0 {
            state.n_records -= removed;
            state.external_pages -= freed_external;
            state.modify_clock += 1;
            tracing::debug!(removed, "Purged delete-marked records");
        }
        removed
    }

    fn check_fields(&self, record: &Record) -> TreeResult<()> {
        if record.fields.len() != self.n_fields {
            return Err(TreeError::FieldCount {
                expected: self.n_fields,
                got: record.fields.len(),
            });
        }
        Ok(())
    }
}

/// Shared latch on a [`BTreeIndex`]
pub struct TreeLatch<'a> {
    state: RwLockReadGuard<'a, TreeState>,
    page_size: u64,
}

impl TreeView for TreeLatch<'_> {
    fn root_level(&self) -> u16 {
        self.state.page(self.state.root).level
    }

    fn root_page(&self) -> PageId {
        self.state.root
    }

    fn page(&self, id: PageId) -> &Page {
        self.state
            .pages
            .get(id as usize)
            .unwrap_or_else(|| panic!("dangling page id {}", id))
    }

    fn n_leaf_pages(&self) -> u64 {
        self.state.leaf_pages + self.state.external_pages
    }

    fn index_size(&self) -> u64 {
        self.state.pages.len() as u64 + self.state.external_pages
    }

    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn epoch(&self) -> ScanEpoch {
        ScanEpoch {
            root_level: self.root_level(),
            modify_clock: self.state.modify_clock,
        }
    }
}

impl IndexTree for BTreeIndex {
    type View<'a> = TreeLatch<'a>;

    fn latch(&self) -> TreeLatch<'_> {
        TreeLatch {
            state: self.state.read(),
            page_size: self.page_size,
        }
    }
}

/// Lay out `records` on fresh, linked pages of one level
fn build_level(pages: &mut Vec<Page>, level: u16, records: Vec<Record>, per_page: usize) -> Vec<PageId> {
    let mut ids: Vec<PageId> = Vec::new();
    let mut iter = records.into_iter().peekable();

    while iter.peek().is_some() {
        let id = pages.len() as PageId;
        let mut page = Page::new(id, level);
        page.records = iter.by_ref().take(per_page).collect();

        if let Some(&prev) = ids.last() {
            page.prev = Some(prev);
            pages[prev as usize].next = Some(id);
        }
        pages.push(page);
        ids.push(id);
    }
    ids
}

/// Descend to the leaf that should hold `key`, remembering (page, slot) per level
fn find_leaf(state: &TreeState, key: &[Datum]) -> (PageId, Vec<(PageId, usize)>) {
    let mut path = Vec::new();
    let mut id = state.root;

    loop {
        let page = state.page(id);
        if page.is_leaf() {
            return (id, path);
        }
        assert!(!page.is_empty(), "non-leaf page {} is empty", id);

        // Last pointer whose key is <= the search key; the minimum record
        // matches everything
        let slot = page
            .records
            .partition_point(|r| r.min_rec || r.fields.as_slice().cmp(key) != Ordering::Greater)
            .saturating_sub(1);

        path.push((id, slot));
        id = page.records[slot]
            .child
            .unwrap_or_else(|| panic!("record on non-leaf page {} has no child", id));
    }
}

/// Move the upper half of `id` to a new right sibling; returns the new page
fn split_page(state: &mut TreeState, id: PageId) -> PageId {
    let right_id = state.next_id();
    let page = state.page_mut(id);
    let mid = page.len() / 2;
    let level = page.level;
    let old_next = page.next;

    let mut right = Page::new(right_id, level);
    right.records = page.records.split_off(mid);
    right.prev = Some(id);
    right.next = old_next;
    page.next = Some(right_id);

    if let Some(next) = old_next {
        state.page_mut(next).prev = Some(right_id);
    }
    if level == 0 {
        state.leaf_pages += 1;
    }
    state.pages.push(right);
    right_id
}

fn fmt_key(key: &[Datum]) -> String {
    let parts: Vec<String> = key.iter().map(|d| d.to_string()).collect();
    format!("({})", parts.join(", "))
}
