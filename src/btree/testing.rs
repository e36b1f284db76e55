//! Test trees that change shape between latch scopes

use crate::btree::{BTreeIndex, IndexTree, TreeLatch};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out latches on `before` for the first `switch_after` calls and on
/// `after` from then on, as if a writer reshaped the tree in between
pub(crate) struct ReshapingTree {
    before: BTreeIndex,
    after: BTreeIndex,
    switch_after: usize,
    latches: AtomicUsize,
}

impl ReshapingTree {
    pub(crate) fn new(before: BTreeIndex, after: BTreeIndex, switch_after: usize) -> Self {
        Self {
            before,
            after,
            switch_after,
            latches: AtomicUsize::new(0),
        }
    }

    /// Latches taken so far
    pub(crate) fn latches(&self) -> usize {
        self.latches.load(Ordering::SeqCst)
    }
}

impl IndexTree for ReshapingTree {
    type View<'a> = TreeLatch<'a>;

    fn latch(&self) -> TreeLatch<'_> {
        if self.latches.fetch_add(1, Ordering::SeqCst) < self.switch_after {
            self.before.latch()
        } else {
            self.after.latch()
        }
    }
}
