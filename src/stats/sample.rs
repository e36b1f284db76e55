//! Prefix sampling
//!
//! The distinct groups found on a non-leaf level are split into as many
//! contiguous segments as there are leaf pages to sample. One group is picked
//! at random inside every segment and the diver descends below the record
//! that closes it.
//!
//! ```text
//! D = 13 groups, N = 7 segments
//! [0,0] [1,2] [3,4] [5,6] [7,8] [9,10] [11,12]
//! ```

use crate::btree::{IndexTree, LevelCursor, TreeView};
use crate::stats::dive::LeafDiver;
use crate::stats::types::PrefixSampleData;
use rand::Rng;

/// Inclusive range of group indices covered by segment `i` of `n_pick`
///
/// Segments partition `0..n_diff` without gaps or overlaps whenever
/// `n_diff >= n_pick >= 1`.
pub fn segment_bounds(i: u64, n_diff: u64, n_pick: u64) -> (u64, u64) {
    debug_assert!(i < n_pick && n_pick <= n_diff);

    let left = n_diff as u128 * i as u128 / n_pick as u128;
    let right = n_diff as u128 * (i as u128 + 1) / n_pick as u128 - 1;
    (left as u64, right as u64)
}

/// Samples leaf pages for one key prefix
#[derive(Debug, Clone, Copy)]
pub struct PrefixSampler {
    diver: LeafDiver,
}

impl PrefixSampler {
    pub fn new(n_uniq: usize, include_delete_marked: bool) -> Self {
        Self {
            diver: LeafDiver::new(n_uniq, include_delete_marked),
        }
    }

    /// Dive below up to `target_pages` records of `level`, one per segment
    ///
    /// `boundaries` are the group boundaries of `n_prefix` on `level` from an
    /// earlier scan. If the level has shrunk since then, sampling stops and
    /// whatever was collected is returned; this is never an error. The result
    /// carries the epoch seen under the sampling latch.
    #[allow(clippy::too_many_arguments)]
    pub fn sample_prefix<T: IndexTree, R: Rng + ?Sized>(
        &self,
        tree: &T,
        n_prefix: usize,
        level: u16,
        boundaries: &[u64],
        n_recs_on_level: u64,
        n_diff_on_level: u64,
        target_pages: u64,
        rng: &mut R,
    ) -> PrefixSampleData {
        assert!(level > 0, "leaf dives must start above the leaf level");
        assert!(n_recs_on_level > 0 && n_diff_on_level > 0, "sampling an empty level");
        assert_eq!(
            boundaries.len() as u64,
            n_diff_on_level,
            "boundary list does not match the distinct count"
        );

        let view = tree.latch();
        let mut data = PrefixSampleData {
            level,
            n_recs_on_level,
            n_diff_on_level,
            n_leaf_pages_to_analyze: target_pages.min(n_diff_on_level),
            epoch: view.epoch(),
            ..Default::default()
        };

        if view.root_level() < level {
            tracing::debug!(level, root_level = view.root_level(), "Tree shrank below sampling level");
            return data;
        }

        let mut cursor = LevelCursor::open_at_left(&view, level);
        assert!(!cursor.page().has_prev(), "leftmost page on level {} has a left sibling", level);
        assert!(
            cursor.is_on_user_rec() && cursor.record().min_rec,
            "first record on non-leaf level {} is not the minimum record",
            level
        );

        let n_pick = data.n_leaf_pages_to_analyze;
        let mut rec_idx = 0u64;

        for i in 0..n_pick {
            let (left, right) = segment_bounds(i, n_diff_on_level, n_pick);
            let group = left + rng.gen_range(0..=right - left);
            let dive_below_idx = boundaries[group as usize];

            // Positions are only known by counting from the left end
            while rec_idx < dive_below_idx && cursor.is_on_user_rec() {
                cursor.move_to_next_user_rec();
                rec_idx += 1;
            }

            if rec_idx < dive_below_idx || !cursor.is_on_user_rec() {
                tracing::debug!(
                    n_prefix,
                    level,
                    analyzed = data.n_leaf_pages_analyzed,
                    planned = n_pick,
                    "Level ended before the sampled record, keeping partial sample"
                );
                break;
            }

            let dive = self.diver.dive(&view, cursor.record(), n_prefix);

            // The first and last group of a leaf are usually shared with its
            // neighbours; count one of them less
            data.n_diff_all_analyzed_pages += dive.n_diff.saturating_sub(1);
            data.n_external_pages_sum += dive.n_external_pages;
            data.n_leaf_pages_analyzed += 1;
        }

        data
    }
}
