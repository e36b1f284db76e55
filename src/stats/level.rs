//! Level scanner
//!
//! One pass over every record of a tree level, left to right across page
//! boundaries, inside a single latch scope. Adjacent records are compared
//! and every prefix length whose fields differ opens a new distinct group.
//!
//! ```text
//! keys (col 1):  1 1 1 2 2 7 7 7 7 7 9
//! index:         0 1 2 3 4 5 6 7 8 9 10
//!                    ^   ^         ^ ^     boundaries = [2, 4, 9, 10]
//! ```

use crate::btree::{IndexTree, LevelCursor, Record, TreeView};
use crate::stats::compare::{KeyRef, PrefixBuf, RecordComparator};
use crate::stats::types::LevelScanResult;

/// The record before the current one
#[derive(Clone, Copy)]
enum Prev<'r> {
    /// No counted record yet
    Missing,
    /// Still on the page being read
    OnPage(&'r Record),
    /// Left behind on a previous page, copied into the scanner's buffer
    Copied,
}

/// Scans whole tree levels, reusing its prefix buffer between calls
pub struct LevelScanner {
    comparator: RecordComparator,
    prev_buf: PrefixBuf,
    include_delete_marked: bool,
}

impl LevelScanner {
    pub fn new(n_uniq: usize, include_delete_marked: bool) -> Self {
        Self {
            comparator: RecordComparator::new(n_uniq),
            prev_buf: PrefixBuf::with_capacity(n_uniq),
            include_delete_marked,
        }
    }

    /// Count records, pages and distinct groups per prefix on `level`
    ///
    /// With `want_boundaries`, also record for every prefix the index of the
    /// last record of each group; each list then has exactly `n_diff[i]`
    /// strictly increasing entries.
    pub fn scan_level<T: IndexTree>(&mut self, tree: &T, level: u16, want_boundaries: bool) -> LevelScanResult {
        let view = tree.latch();
        let epoch = view.epoch();
        let n_uniq = self.comparator.n_uniq();

        let leftmost = view.page(view.leftmost_page(level));
        assert_eq!(leftmost.level, level, "leftmost page is on the wrong level");
        assert!(!leftmost.has_prev(), "leftmost page {} has a left sibling", leftmost.id);

        let mut cursor = LevelCursor::open_at_left(&view, level);
        assert!(
            cursor.is_on_user_rec() || level == 0,
            "non-leaf level {} is empty",
            level
        );
        if level > 0 {
            assert!(
                cursor.record().min_rec,
                "first record on non-leaf level {} is not the minimum record",
                level
            );
        }

        let mut n_diff = vec![0u64; n_uniq];
        let mut boundaries: Option<Vec<Vec<u64>>> = want_boundaries.then(|| vec![Vec::new(); n_uniq]);
        let mut total_recs = 0u64;
        let mut total_pages = 0u64;
        let mut prev = Prev::Missing;

        while cursor.is_on_user_rec() {
            let rec = cursor.record();
            let last_on_page = cursor.is_last_on_page();

            if last_on_page {
                total_pages += 1;
            }

            // Delete marks only mean something on the leaf level
            if level == 0 && !self.include_delete_marked && rec.delete_marked {
                if last_on_page {
                    if let Prev::OnPage(p) = prev {
                        self.prev_buf.copy_from(p, n_uniq);
                        prev = Prev::Copied;
                    }
                }
                cursor.move_to_next_user_rec();
                continue;
            }

            total_recs += 1;

            let prev_key: Option<KeyRef<'_>> = match prev {
                Prev::Missing => None,
                Prev::OnPage(p) => Some(p.into()),
                Prev::Copied => Some(self.prev_buf.key()),
            };

            match prev_key {
                Some(prev_key) => {
                    let matched = self.comparator.matched_fields(prev_key, rec.into());
                    for i in matched..n_uniq {
                        if let Some(b) = boundaries.as_mut() {
                            // The previous record closed a group; it sits at total_recs - 2
                            b[i].push(total_recs - 2);
                        }
                        n_diff[i] += 1;
                    }
                }
                None => n_diff.iter_mut().for_each(|n| *n = 1),
            }

            if last_on_page {
                self.prev_buf.copy_from(rec, n_uniq);
                prev = Prev::Copied;
            } else {
                prev = Prev::OnPage(rec);
            }

            cursor.move_to_next_user_rec();
        }

        if total_pages == 0 {
            // Only an empty leaf level can get here; the root page still counts
            assert_eq!(level, 0, "non-leaf level {} has no pages", level);
            assert_eq!(total_recs, 0);
            total_pages = 1;
        }

        if total_recs > 0 {
            if let Some(b) = boundaries.as_mut() {
                // The last record closes the last group of every prefix
                for list in b.iter_mut() {
                    list.push(total_recs - 1);
                }
            }
        }

        tracing::trace!(level, total_recs, total_pages, ?n_diff, "Scanned level");

        LevelScanResult {
            level,
            n_diff,
            total_recs,
            total_pages,
            boundaries,
            epoch,
        }
    }
}
