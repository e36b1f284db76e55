//! Transient statistics
//!
//! A cheaper estimator that never scans a whole level: it descends to a few
//! random leaves and counts prefix changes between adjacent records on each.
//! The counts are scaled by the number of leaf pages. Delete-marked records
//! are counted like live ones.

use crate::btree::{open_at_random_leaf, IndexTree, TreeView};
use crate::config::StatsConfig;
use crate::stats::compare::RecordComparator;
use crate::stats::types::IndexStats;
use chrono::Utc;
use rand::Rng;

/// Estimates distinct key prefixes from random leaf samples
#[derive(Debug, Clone)]
pub struct TransientEstimator {
    sample_pages: u64,
    seed: Option<u64>,
}

impl TransientEstimator {
    pub fn new(config: &StatsConfig) -> Self {
        Self {
            sample_pages: config.transient_sample_pages,
            seed: config.seed,
        }
    }

    pub fn estimate<T: IndexTree>(&self, tree: &T, n_uniq: usize) -> IndexStats {
        let mut rng = super::sampling_rng(self.seed);
        self.estimate_with_rng(tree, n_uniq, &mut rng)
    }

    /// Estimate with a caller-provided random source
    pub fn estimate_with_rng<T: IndexTree, R: Rng + ?Sized>(
        &self,
        tree: &T,
        n_uniq: usize,
        rng: &mut R,
    ) -> IndexStats {
        let (index_size, n_leaf_pages) = {
            let view = tree.latch();
            (view.index_size(), view.n_leaf_pages())
        };
        let comparator = RecordComparator::new(n_uniq);
        let n_sample_pages = self.sample_pages.min(index_size).max(1);

        let mut borders = vec![0u64; n_uniq];
        let mut total_external = 0u64;
        let mut not_empty = 0u64;

        for _ in 0..n_sample_pages {
            let view = tree.latch();
            let page = open_at_random_leaf(&view, rng);
            let page_size = view.page_size();

            if !page.is_empty() {
                not_empty = 1;
            }

            for pair in page.records.windows(2) {
                let matched = comparator.compare(&pair[0], &pair[1]);
                for n in &mut borders[matched..] {
                    *n += 1;
                }
            }
            total_external += page
                .records
                .iter()
                .map(|r| r.external_pages(page_size))
                .sum::<u64>();

            // The first record on a page with siblings certainly differs
            // from the last one of the previous page in the full key
            if page.prev.is_some() || page.next.is_some() {
                borders[n_uniq - 1] += 1;
            }
        }

        let divisor = n_sample_pages as u128 + total_external as u128;
        let add_on = (n_leaf_pages as u128 / (10 * divisor)).min(n_sample_pages as u128);

        let n_diff_key_vals = borders
            .iter()
            .map(|&b| {
                let scaled = (b as u128)
                    .saturating_mul(n_leaf_pages as u128)
                    .saturating_add(n_sample_pages as u128 - 1 + total_external as u128 + not_empty as u128)
                    / divisor;
                u64::try_from(scaled + add_on).unwrap_or(u64::MAX)
            })
            .collect();

        tracing::debug!(
            n_sample_pages,
            total_external,
            ?n_diff_key_vals,
            "Transient estimate"
        );

        IndexStats {
            n_diff_key_vals,
            n_sample_sizes: vec![n_sample_pages; n_uniq],
            index_size,
            n_leaf_pages,
            last_analyzed: Some(Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::{BTreeIndex, Record};
    use crate::config::TreeConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(capacity: usize) -> TreeConfig {
        TreeConfig {
            page_capacity: capacity,
            fill_factor: 1.0,
            ..Default::default()
        }
    }

    fn estimator(sample_pages: u64) -> TransientEstimator {
        TransientEstimator::new(&StatsConfig {
            transient_sample_pages: sample_pages,
            ..Default::default()
        })
    }

    #[test]
    fn test_empty_tree() {
        let tree = BTreeIndex::new(2, 2, &config(4)).unwrap();
        let stats = estimator(8).estimate(&tree, 2);

        assert_eq!(stats.n_diff_key_vals, vec![0, 0]);
        assert_eq!(stats.n_sample_sizes, vec![1, 1]);
        assert_eq!(stats.index_size, 1);
    }

    #[test]
    fn test_single_page_is_exact() {
        let records = (0..10).map(|i| Record::from_ints(&[i / 5, i])).collect();
        let tree = BTreeIndex::bulk_load(2, 2, records, &config(16)).unwrap();

        let stats = estimator(8).estimate(&tree, 2);

        // One page: S = 1, borders = n_diff - 1, plus one for the non-empty page
        assert_eq!(stats.n_diff_key_vals, vec![2, 10]);
        assert_eq!(stats.n_sample_sizes, vec![1, 1]);
    }

    #[test]
    fn test_unique_keys_scale_with_leaf_pages() {
        let records = (0..4000).map(|i| Record::from_ints(&[i])).collect();
        let tree = BTreeIndex::bulk_load(1, 1, records, &config(10)).unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        let stats = estimator(8).estimate_with_rng(&tree, 1, &mut rng);

        // 400 leaves of 10 unique keys: (8 * 10 * 400 + 8) / 8 + min(400 / 80, 8)
        assert_eq!(stats.n_diff_key_vals, vec![4006]);
        assert_eq!(stats.n_sample_sizes, vec![8]);
    }

    #[test]
    fn test_counts_delete_marked_records() {
        let records = (0..10).map(|i| Record::from_ints(&[i]).deleted()).collect();
        let tree = BTreeIndex::bulk_load(1, 1, records, &config(16)).unwrap();

        let stats = estimator(8).estimate(&tree, 1);
        assert_eq!(stats.n_diff_key_vals, vec![10]);
    }
}
