//! Cursors over a latched tree view
//!
//! `LevelCursor` walks every user record of one level from left to right,
//! crossing page boundaries through the sibling links. Positions are only
//! known by sequential count; there is no random access by record index.

use crate::btree::{Page, PageId, Record, TreeView};
use rand::Rng;

/// Cursor positioned on a record of one tree level
///
/// A cursor that ran past the last record of the level sits "after last"
/// (the supremum position) and `is_on_user_rec` returns false.
pub struct LevelCursor<'v, V: TreeView> {
    view: &'v V,
    page: PageId,
    slot: usize,
}

impl<'v, V: TreeView> LevelCursor<'v, V> {
    /// Position on the first user record of `level`
    ///
    /// Leading pages emptied by purge are stepped over. On an empty level the
    /// cursor stays on the leftmost page, past its (absent) last record.
    pub fn open_at_left(view: &'v V, level: u16) -> Self {
        let leftmost = view.leftmost_page(level);
        let mut page = leftmost;
        loop {
            let current = view.page(page);
            if !current.is_empty() {
                break;
            }
            match current.next {
                Some(next) => page = next,
                None => {
                    page = leftmost;
                    break;
                }
            }
        }
        Self {
            view,
            page,
            slot: 0,
        }
    }

    /// Current page
    pub fn page(&self) -> &'v Page {
        self.view.page(self.page)
    }

    /// Whether the cursor is on a user record (not past the end)
    pub fn is_on_user_rec(&self) -> bool {
        self.slot < self.page().len()
    }

    /// Current record
    pub fn record(&self) -> &'v Record {
        let page = self.page();
        page.records.get(self.slot).unwrap_or_else(|| {
            panic!(
                "cursor is not on a user record (page {}, slot {})",
                page.id, self.slot
            )
        })
    }

    /// Whether the current record is the last one on its page
    pub fn is_last_on_page(&self) -> bool {
        self.slot + 1 == self.page().len()
    }

    /// Advance to the next user record, moving to the right sibling when the
    /// current page is exhausted. Returns false once the level is exhausted.
    pub fn move_to_next_user_rec(&mut self) -> bool {
        let page = self.page();
        if self.slot < page.len() {
            self.slot += 1;
        }
        if self.slot < page.len() {
            return true;
        }

        let mut next = page.next;
        while let Some(id) = next {
            let sibling = self.view.page(id);
            if !sibling.is_empty() {
                self.page = id;
                self.slot = 0;
                return true;
            }
            // Purged pages may be empty; stay on the last page with records
            next = sibling.next;
        }
        false
    }
}

/// Descend from the root to a leaf, picking a uniformly random record at
/// every non-leaf level
pub fn open_at_random_leaf<'v, V: TreeView, R: Rng + ?Sized>(view: &'v V, rng: &mut R) -> &'v Page {
    let mut page = view.page(view.root_page());
    while !page.is_leaf() {
        assert!(!page.is_empty(), "non-leaf page {} is empty", page.id);
        let slot = rng.gen_range(0..page.len());
        let child = page.records[slot]
            .child
            .unwrap_or_else(|| panic!("record on non-leaf page {} has no child", page.id));
        page = view.page(child);
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::{BTreeIndex, IndexTree};
    use crate::config::TreeConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_tree(rows: i64) -> BTreeIndex {
        let config = TreeConfig {
            page_capacity: 4,
            fill_factor: 1.0,
            ..Default::default()
        };
        let records = (0..rows).map(|i| Record::from_ints(&[i])).collect();
        BTreeIndex::bulk_load(1, 1, records, &config).unwrap()
    }

    #[test]
    fn test_walks_whole_leaf_level() {
        let tree = small_tree(10);
        let view = tree.latch();
        let mut cursor = LevelCursor::open_at_left(&view, 0);

        let mut seen = Vec::new();
        while cursor.is_on_user_rec() {
            seen.push(cursor.record().fields[0].clone());
            cursor.move_to_next_user_rec();
        }

        let expected: Vec<_> = (0..10).map(crate::btree::Datum::Int).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_last_on_page() {
        let tree = small_tree(6);
        let view = tree.latch();
        let mut cursor = LevelCursor::open_at_left(&view, 0);

        let mut last_flags = Vec::new();
        while cursor.is_on_user_rec() {
            last_flags.push(cursor.is_last_on_page());
            cursor.move_to_next_user_rec();
        }

        // Pages of 4 and 2 records
        assert_eq!(last_flags, vec![false, false, false, true, false, true]);
    }

    #[test]
    fn test_past_end_stays_past_end() {
        let tree = small_tree(3);
        let view = tree.latch();
        let mut cursor = LevelCursor::open_at_left(&view, 0);

        assert!(cursor.move_to_next_user_rec());
        assert!(cursor.move_to_next_user_rec());
        assert!(!cursor.move_to_next_user_rec());
        assert!(!cursor.is_on_user_rec());
        assert!(!cursor.move_to_next_user_rec());
    }

    #[test]
    fn test_random_leaf_is_leaf() {
        let tree = small_tree(200);
        let view = tree.latch();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..20 {
            let page = open_at_random_leaf(&view, &mut rng);
            assert!(page.is_leaf());
            assert!(!page.is_empty());
        }
    }
}
