//! Paged B+tree
//!
//! This module provides the tree the statistics engine reads from:
//!
//! - **types**: Records, pages, key values and scan epochs
//! - **tree**: In-memory paged tree with page latches (`BTreeIndex`)
//! - **cursor**: Level cursors and random root-to-leaf descent
//! - **error**: Error types
//!
//! # Access model
//!
//! ```text
//! IndexTree::latch()  →  View (shared latch held)
//!        ↓
//! LevelCursor / page(id) / child pointers
//!        ↓
//! drop(View)          →  latch released, writers may proceed
//! ```
//!
//! The estimator only depends on the two traits below, so any tree that can
//! hand out a consistent read view over its pages can be analyzed.

pub mod cursor;
pub mod error;
pub mod tree;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use cursor::{open_at_random_leaf, LevelCursor};
pub use error::{TreeError, TreeResult};
pub use tree::{BTreeIndex, TreeLatch};
pub use types::{Datum, Page, PageId, Record, ScanEpoch};

/// Read access to a tree inside one latch scope
pub trait TreeView {
    /// Level of the root page (0 = the root is a leaf)
    fn root_level(&self) -> u16;

    /// The root page
    fn root_page(&self) -> PageId;

    /// Look up a page. Dangling page ids are structural corruption.
    fn page(&self, id: PageId) -> &Page;

    /// Pages in the leaf segment, including external (overflow) pages
    fn n_leaf_pages(&self) -> u64;

    /// Pages reserved by the whole index
    fn index_size(&self) -> u64;

    /// Bytes per page, used to turn overflow lengths into page counts
    fn page_size(&self) -> u64;

    /// Shape of the tree as seen by this view
    fn epoch(&self) -> ScanEpoch;

    /// Leftmost page on `level`, found by following first children from the root
    fn leftmost_page(&self, level: u16) -> PageId {
        assert!(
            level <= self.root_level(),
            "level {} is above the root level {}",
            level,
            self.root_level()
        );

        let mut id = self.root_page();
        loop {
            let page = self.page(id);
            if page.level == level {
                return id;
            }
            let first = page
                .records
                .first()
                .unwrap_or_else(|| panic!("non-leaf page {} is empty", page.id));
            id = first
                .child
                .unwrap_or_else(|| panic!("record on non-leaf page {} has no child", page.id));
        }
    }
}

/// A tree that can be latched for reading
pub trait IndexTree: Send + Sync {
    type View<'a>: TreeView
    where
        Self: 'a;

    /// Take a shared latch; it is released when the view is dropped
    fn latch(&self) -> Self::View<'_>;
}
