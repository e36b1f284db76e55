//! Leaf dives
//!
//! Starting from a node pointer on some non-leaf level, follow child pointers
//! down to a single leaf page and count the distinct key prefixes on it.
//! Interior pages are only read up to their first non-boring record, so the
//! cost of a dive is the length of the boring runs it crosses, not the size
//! of the pages.

use crate::btree::{Page, Record, TreeView};
use crate::stats::compare::RecordComparator;

/// Result of scanning a single page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageScan {
    /// Distinct groups seen; on a non-leaf page never more than 2
    pub n_diff: u64,
    /// Overflow pages referenced from the scanned records (leaf pages only)
    pub n_external_pages: u64,
    /// Slot of the last record read before the scan stopped; meaningless
    /// when `n_diff` is 0
    pub slot: usize,
}

/// Scan one page for distinct `n_prefix` groups
///
/// A leaf page is read completely. A non-leaf page is read until the first
/// record whose right neighbour differs; `slot` then points at that record,
/// the last one of the first group.
pub fn scan_page(
    page: &Page,
    n_prefix: usize,
    comparator: &RecordComparator,
    include_delete_marked: bool,
    page_size: u64,
) -> PageScan {
    let is_leaf = page.is_leaf();
    let skip_deleted = is_leaf && !include_delete_marked;

    let mut live = page
        .records
        .iter()
        .enumerate()
        .filter(|(_, r)| !(skip_deleted && r.delete_marked));

    let Some((mut slot, mut rec)) = live.next() else {
        return PageScan {
            n_diff: 0,
            n_external_pages: 0,
            slot: 0,
        };
    };

    let mut n_diff = 1u64;
    let mut n_external_pages = 0u64;

    for (next_slot, next) in live {
        if comparator.compare(rec, next) < n_prefix {
            n_diff += 1;
            if !is_leaf {
                return PageScan {
                    n_diff,
                    n_external_pages: 0,
                    slot,
                };
            }
        }
        if is_leaf {
            n_external_pages += rec.external_pages(page_size);
        }
        slot = next_slot;
        rec = next;
    }

    if is_leaf {
        n_external_pages += rec.external_pages(page_size);
    }

    PageScan {
        n_diff,
        n_external_pages,
        slot,
    }
}

/// Outcome of one leaf dive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiveResult {
    /// Distinct `n_prefix` groups on the leaf that was reached
    pub n_diff: u64,
    pub n_external_pages: u64,
}

/// Descends below non-leaf records to a leaf page
#[derive(Debug, Clone, Copy)]
pub struct LeafDiver {
    comparator: RecordComparator,
    include_delete_marked: bool,
}

impl LeafDiver {
    pub fn new(n_uniq: usize, include_delete_marked: bool) -> Self {
        Self {
            comparator: RecordComparator::new(n_uniq),
            include_delete_marked,
        }
    }

    /// Dive below `node_ptr` and count `n_prefix` groups on the leaf found
    ///
    /// An interior page whose records all share the prefix ends the dive
    /// with `(1, 0)`: the whole subtree is one group. Overflow pages below
    /// such a page are not counted.
    pub fn dive<V: TreeView>(&self, view: &V, node_ptr: &Record, n_prefix: usize) -> DiveResult {
        let mut child = node_ptr
            .child
            .unwrap_or_else(|| panic!("dive started from a record without a child pointer"));

        loop {
            let page = view.page(child);
            let scan = scan_page(
                page,
                n_prefix,
                &self.comparator,
                self.include_delete_marked,
                view.page_size(),
            );

            if page.is_leaf() {
                return DiveResult {
                    n_diff: scan.n_diff,
                    n_external_pages: scan.n_external_pages,
                };
            }

            assert!(scan.n_diff > 0, "non-leaf page {} is empty", page.id);
            if scan.n_diff == 1 {
                return DiveResult {
                    n_diff: 1,
                    n_external_pages: 0,
                };
            }
            assert_eq!(
                scan.n_diff, 2,
                "interior scan of page {} did not stop at the first change",
                page.id
            );

            child = page.records[scan.slot]
                .child
                .unwrap_or_else(|| panic!("record on non-leaf page {} has no child", page.id));
        }
    }
}
