//! Per-index statistics recalculation
//!
//! # Descent
//!
//! Prefixes are handled from the full key down to the first column. For each
//! prefix a non-leaf level with enough distinct groups is chosen, starting at
//! the root, which is scanned before the first prefix, and going down one
//! level at a time:
//!
//! ```text
//!             ┌──────────────┐ good enough or level 1
//!   ┌────────▶│  NextPrefix  │──────────────────────────┐
//!   │         └──────┬───────┘                          ▼
//!   │                │ too few groups             ┌──────────┐
//!   │                ▼                            │  Sample  │──▶ Done
//!   │   ┌──────────────┐  level below too big     └──────────┘   (prefix 1)
//!   │   │ DescendLevel │─────────────────────────────▲  │
//!   │   └──────┬───────┘                              │  │ next prefix
//!   │          ▼                                      │  │
//!   │   ┌──────────────┐                              │  │
//!   └───│  ScanLevel   │                              │  │
//!       └──────────────┘                              │  │
//!   ◀─────────────────────────────────────────────────┴──┘
//! ```
//!
//! Small trees skip all of this and are scanned once at the leaf level.
//! Each scan and each prefix sample holds the tree latch for its own
//! duration only, so writers can run in between. If the root level moves
//! while the descent is in progress the analysis gives up.

use crate::btree::{IndexTree, ScanEpoch, TreeView};
use crate::config::StatsConfig;
use crate::stats::level::LevelScanner;
use crate::stats::sample::PrefixSampler;
use crate::stats::types::{IndexStats, LevelScanResult, PrefixSampleData};
use chrono::Utc;
use rand::Rng;

/// Result of one analysis
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzeOutcome {
    /// New statistics for every prefix
    Complete(IndexStats),
    /// The tree changed shape underneath the analysis
    ///
    /// Nothing is published: the previous statistics stay for every prefix,
    /// including the ones sampled before the change was seen. A new
    /// snapshot is all or nothing.
    Interrupted {
        /// Prefixes sampled before giving up; reported, never applied
        completed_prefixes: usize,
        reason: String,
    },
}

impl AnalyzeOutcome {
    pub fn stats(&self) -> Option<&IndexStats> {
        match self {
            AnalyzeOutcome::Complete(stats) => Some(stats),
            AnalyzeOutcome::Interrupted { .. } => None,
        }
    }

    pub fn into_stats(self) -> Option<IndexStats> {
        match self {
            AnalyzeOutcome::Complete(stats) => Some(stats),
            AnalyzeOutcome::Interrupted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DescentState {
    /// Decide whether the last scanned level serves the current prefix
    NextPrefix,
    /// Move one level down, unless the level below is too large
    DescendLevel,
    /// Scan the level below the last scanned one, remembering group boundaries
    ScanLevel,
    /// Dive below the chosen level for the current prefix
    Sample,
    Done,
}

/// Persistent-statistics estimator for one index
#[derive(Debug, Clone)]
pub struct IndexStatsEstimator {
    config: StatsConfig,
}

impl IndexStatsEstimator {
    pub fn new(config: StatsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Recalculate statistics for a tree with `n_uniq` key columns
    pub fn analyze<T: IndexTree>(&self, tree: &T, n_uniq: usize) -> AnalyzeOutcome {
        let mut rng = super::sampling_rng(self.config.seed);
        self.analyze_with_rng(tree, n_uniq, &mut rng)
    }

    /// Same as [`analyze`](Self::analyze) with a caller-provided random source
    pub fn analyze_with_rng<T: IndexTree, R: Rng + ?Sized>(
        &self,
        tree: &T,
        n_uniq: usize,
        rng: &mut R,
    ) -> AnalyzeOutcome {
        assert!(n_uniq > 0, "index without key columns");

        let (start, index_size, n_leaf_pages) = {
            let view = tree.latch();
            (view.epoch(), view.index_size(), view.n_leaf_pages())
        };

        let mut stats = IndexStats::empty(n_uniq);
        stats.index_size = index_size;
        stats.n_leaf_pages = n_leaf_pages;

        let sample_pages = self.config.sample_pages;
        if start.root_level == 0 || sample_pages.saturating_mul(n_uniq as u64) > n_leaf_pages {
            tracing::debug!(
                root_level = start.root_level,
                n_leaf_pages,
                "Small index, scanning the leaf level"
            );
            let scan = LevelScanner::new(n_uniq, self.config.include_delete_marked).scan_level(tree, 0, false);
            stats.n_sample_sizes = vec![scan.total_pages; n_uniq];
            stats.n_diff_key_vals = scan.n_diff;
            stats.last_analyzed = Some(Utc::now());
            return AnalyzeOutcome::Complete(stats);
        }

        let samples = match self.descend(tree, n_uniq, &start, rng) {
            Ok(samples) => samples,
            Err((completed_prefixes, reason)) => {
                tracing::warn!(completed_prefixes, %reason, "Index analysis interrupted");
                return AnalyzeOutcome::Interrupted {
                    completed_prefixes,
                    reason,
                };
            }
        };

        for (i, data) in samples.iter().enumerate() {
            stats.n_diff_key_vals[i] = data.estimate(n_leaf_pages);
            stats.n_sample_sizes[i] = data.n_leaf_pages_to_analyze;
            tracing::debug!(
                n_prefix = i + 1,
                level = data.level,
                n_diff_on_level = data.n_diff_on_level,
                n_recs_on_level = data.n_recs_on_level,
                analyzed = data.n_leaf_pages_analyzed,
                estimate = stats.n_diff_key_vals[i],
                "Prefix estimated"
            );
        }
        stats.last_analyzed = Some(Utc::now());
        AnalyzeOutcome::Complete(stats)
    }

    /// Run the level descent and return one sample per prefix, first column first
    fn descend<T: IndexTree, R: Rng + ?Sized>(
        &self,
        tree: &T,
        n_uniq: usize,
        start: &ScanEpoch,
        rng: &mut R,
    ) -> Result<Vec<PrefixSampleData>, (usize, String)> {
        let diff_required = self.config.diff_required();
        let sample_pages = self.config.sample_pages;

        let mut scanner = LevelScanner::new(n_uniq, self.config.include_delete_marked);
        let sampler = PrefixSampler::new(n_uniq, self.config.include_delete_marked);

        let mut samples: Vec<PrefixSampleData> = vec![PrefixSampleData::default(); n_uniq];
        let mut n_prefix = n_uniq;
        let mut current = Self::scan_checked(&mut scanner, tree, start.root_level, start, 0)?;
        let mut state = DescentState::NextPrefix;

        while state != DescentState::Done {
            state = match state {
                DescentState::NextPrefix => {
                    if current.level == 1 || current.n_diff[n_prefix - 1] >= diff_required {
                        DescentState::Sample
                    } else {
                        DescentState::DescendLevel
                    }
                }

                DescentState::DescendLevel => {
                    // Every record on this level is a page on the level below
                    if current.total_recs > sample_pages {
                        tracing::debug!(
                            n_prefix,
                            level = current.level,
                            pages_below = current.total_recs,
                            "Level below exceeds the page budget, staying"
                        );
                        DescentState::Sample
                    } else {
                        DescentState::ScanLevel
                    }
                }

                DescentState::ScanLevel => {
                    current = Self::scan_checked(
                        &mut scanner,
                        tree,
                        current.level - 1,
                        start,
                        n_uniq - n_prefix,
                    )?;
                    tracing::debug!(
                        n_prefix,
                        level = current.level,
                        n_diff = current.n_diff[n_prefix - 1],
                        "Descended one level"
                    );
                    DescentState::NextPrefix
                }

                DescentState::Sample => {
                    let data = sampler.sample_prefix(
                        tree,
                        n_prefix,
                        current.level,
                        current.boundaries_for(n_prefix).unwrap_or(&[]),
                        current.total_recs,
                        current.n_diff[n_prefix - 1],
                        sample_pages,
                        rng,
                    );

                    if !data.epoch.same_height(start) {
                        return Err((
                            n_uniq - n_prefix,
                            format!(
                                "root level changed from {} to {} while sampling",
                                start.root_level, data.epoch.root_level
                            ),
                        ));
                    }
                    samples[n_prefix - 1] = data;

                    if n_prefix == 1 {
                        DescentState::Done
                    } else {
                        n_prefix -= 1;
                        DescentState::NextPrefix
                    }
                }

                DescentState::Done => DescentState::Done,
            };
        }

        Ok(samples)
    }

    /// Scan `level` with boundaries; a root level other than `start`'s ends the descent
    fn scan_checked<T: IndexTree>(
        scanner: &mut LevelScanner,
        tree: &T,
        level: u16,
        start: &ScanEpoch,
        completed_prefixes: usize,
    ) -> Result<LevelScanResult, (usize, String)> {
        let scan = scanner.scan_level(tree, level, true);
        if !scan.epoch.same_height(start) {
            return Err((
                completed_prefixes,
                format!(
                    "root level changed from {} to {} during the descent",
                    start.root_level, scan.epoch.root_level
                ),
            ));
        }
        tracing::debug!(
            level,
            total_recs = scan.total_recs,
            total_pages = scan.total_pages,
            "Scanned level"
        );
        Ok(scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::testing::ReshapingTree;
    use crate::btree::{BTreeIndex, Datum, Record};
    use crate::config::TreeConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tree_config(capacity: usize) -> TreeConfig {
        TreeConfig {
            page_capacity: capacity,
            fill_factor: 1.0,
            ..Default::default()
        }
    }

    fn estimator(sample_pages: u64) -> IndexStatsEstimator {
        IndexStatsEstimator::new(StatsConfig {
            sample_pages,
            ..Default::default()
        })
    }

    fn complete(outcome: AnalyzeOutcome) -> IndexStats {
        match outcome {
            AnalyzeOutcome::Complete(stats) => stats,
            other => panic!("expected a complete analysis, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_index() {
        let tree = BTreeIndex::new(2, 3, &tree_config(4)).unwrap();
        let stats = complete(estimator(20).analyze(&tree, 2));

        assert_eq!(stats.n_diff_key_vals, vec![0, 0]);
        assert_eq!(stats.n_sample_sizes, vec![1, 1]);
        assert_eq!(stats.index_size, 1);
        assert_eq!(stats.n_leaf_pages, 1);
        assert!(stats.last_analyzed.is_some());
    }

    #[test]
    fn test_single_page_takes_full_scan() {
        // 500 records on one leaf root, whatever the sample target
        let records = (0..500).map(|i| Record::from_ints(&[i % 7, i])).collect();
        let tree = BTreeIndex::bulk_load(2, 2, records, &tree_config(512)).unwrap();
        assert_eq!(tree.height(), 0);

        for sample_pages in [1, 20, 1000] {
            let stats = complete(estimator(sample_pages).analyze(&tree, 2));
            assert_eq!(stats.n_diff_key_vals, vec![7, 500]);
            assert_eq!(stats.n_sample_sizes, vec![1, 1]);
        }
    }

    #[test]
    fn test_full_scan_when_sample_covers_leaves() {
        let records = (0..300).map(|i| Record::from_ints(&[i / 10, i])).collect();
        let tree = BTreeIndex::bulk_load(2, 2, records, &tree_config(8)).unwrap();
        let n_leaf_pages = tree.latch().n_leaf_pages();
        assert!(tree.height() > 0);

        // 20 * 2 > 38 leaf pages
        let first = complete(estimator(20).analyze(&tree, 2));
        let second = complete(estimator(20).analyze(&tree, 2));

        assert_eq!(first.n_diff_key_vals, vec![30, 300]);
        assert_eq!(first.n_sample_sizes, vec![n_leaf_pages, n_leaf_pages]);
        assert_eq!(first.n_diff_key_vals, second.n_diff_key_vals);
        assert_eq!(first.n_sample_sizes, second.n_sample_sizes);
    }

    #[test]
    fn test_full_scan_excludes_delete_marked() {
        let records = (0..40).map(|i| Record::from_ints(&[i])).collect();
        let tree = BTreeIndex::bulk_load(1, 1, records, &tree_config(64)).unwrap();
        for i in 0..10 {
            tree.delete_mark(&[Datum::Int(i)]).unwrap();
        }

        let stats = complete(estimator(20).analyze(&tree, 1));
        assert_eq!(stats.n_diff_key_vals, vec![30]);

        let including = IndexStatsEstimator::new(StatsConfig {
            include_delete_marked: true,
            ..Default::default()
        });
        assert_eq!(complete(including.analyze(&tree, 1)).n_diff_key_vals, vec![40]);
    }

    #[test]
    fn test_sampled_unique_index() {
        // 2000 leaves of 5 unique keys each
        let records = (0..10_000).map(|i| Record::from_ints(&[i])).collect();
        let tree = BTreeIndex::bulk_load(1, 1, records, &tree_config(5)).unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        let stats = complete(estimator(4).analyze_with_rng(&tree, 1, &mut rng));

        // Each sampled leaf contributes 4 of its 5 keys
        assert_eq!(stats.n_sample_sizes, vec![4]);
        assert_eq!(stats.n_diff_key_vals, vec![8000]);
    }

    #[test]
    fn test_sampled_composite_index() {
        // 100 values of the first column, 50 rows each
        let records = (0..5000).map(|i| Record::from_ints(&[i / 50, i])).collect();
        let tree = BTreeIndex::bulk_load(2, 2, records, &tree_config(10)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let stats = complete(estimator(5).analyze_with_rng(&tree, 2, &mut rng));

        assert_eq!(stats.n_diff_key_vals.len(), 2);
        assert_eq!(stats.n_sample_sizes, vec![5, 5]);
        assert!(stats.n_sample_sizes.iter().all(|&s| s >= 1));

        let full_key = stats.n_diff_key_vals[1];
        assert!((4000..=5000).contains(&full_key), "full key estimate {}", full_key);
        let first_col = stats.n_diff_key_vals[0];
        assert!(first_col <= 500, "first column estimate {}", first_col);
    }

    #[test]
    fn test_same_seed_same_estimate() {
        let records = (0..5000).map(|i| Record::from_ints(&[i % 97, i])).collect();
        let tree = BTreeIndex::bulk_load(2, 2, records, &tree_config(10)).unwrap();

        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            complete(estimator(5).analyze_with_rng(&tree, 2, &mut rng)).n_diff_key_vals
        };
        assert_eq!(run(17), run(17));
    }

    /// A height-3 index that turns into a height-6 one after `switch_after` latches
    fn reshaping(switch_after: usize) -> ReshapingTree {
        let records = |n: i64| -> Vec<Record> { (0..n).map(|i| Record::from_ints(&[i / 50, i])).collect() };
        let before = BTreeIndex::bulk_load(2, 2, records(10_000), &tree_config(10)).unwrap();
        let after = BTreeIndex::bulk_load(2, 2, records(10_000), &tree_config(4)).unwrap();
        assert!(after.height() > before.height());
        ReshapingTree::new(before, after, switch_after)
    }

    #[test]
    fn test_root_level_change_interrupts() {
        let estimator = IndexStatsEstimator::new(StatsConfig {
            sample_pages: 5,
            seed: Some(4),
            ..Default::default()
        });

        // Latch scopes of an undisturbed analysis
        let steady = reshaping(usize::MAX);
        assert!(estimator.analyze(&steady, 2).stats().is_some());
        let scopes = steady.latches();
        assert!(scopes > 2);

        for switch_after in 1..scopes {
            match estimator.analyze(&reshaping(switch_after), 2) {
                AnalyzeOutcome::Interrupted {
                    completed_prefixes,
                    reason,
                } => {
                    assert!(reason.contains("root level changed"), "{}", reason);
                    if switch_after == scopes - 1 {
                        // Only the first-column sample saw the new root
                        assert_eq!(completed_prefixes, 1);
                    } else {
                        assert!(completed_prefixes < 2);
                    }
                }
                other => panic!(
                    "switching after {} latches should interrupt, got {:?}",
                    switch_after, other
                ),
            }
        }

        // A change after the last scope goes unnoticed
        assert!(estimator.analyze(&reshaping(scopes), 2).stats().is_some());
    }

    #[test]
    fn test_outcome_accessors() {
        let stats = IndexStats::empty(1);
        let outcome = AnalyzeOutcome::Complete(stats.clone());
        assert_eq!(outcome.stats(), Some(&stats));
        assert_eq!(outcome.into_stats(), Some(stats));

        let interrupted = AnalyzeOutcome::Interrupted {
            completed_prefixes: 0,
            reason: "root split".to_string(),
        };
        assert!(interrupted.stats().is_none());
    }
}
