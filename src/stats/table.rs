//! Table-level statistics
//!
//! The clustered index is analyzed first and gives the row estimate. Every
//! other index with statistics is analyzed after it and its size added to
//! the table's total. Full-text and spatial indexes are passed over.

use crate::btree::IndexTree;
use crate::config::{StatsConfig, StatsMethod};
use crate::dict::{Index, Table, TableStats};
use crate::stats::index::{AnalyzeOutcome, IndexStatsEstimator};
use crate::stats::transient::TransientEstimator;
use chrono::Utc;
use serde::Serialize;

/// What happened during one table analysis
#[derive(Debug, Clone, Serialize)]
pub struct TableAnalysis {
    pub table: String,
    pub stats: TableStats,
    /// Indexes that got new statistics
    pub analyzed: Vec<String>,
    /// Indexes whose analysis lost a race with a writer and kept old values
    pub interrupted: Vec<String>,
    /// Indexes left out: no statistics, dropped, uncommitted or corrupted
    pub skipped: Vec<String>,
    /// A quit request stopped the analysis before every index was done
    pub stopped_early: bool,
    /// The table could not be analyzed and was reset to the empty state
    pub reset: bool,
}

impl TableAnalysis {
    fn new(table: &Table) -> Self {
        Self {
            table: table.name().to_string(),
            stats: table.stats(),
            analyzed: Vec::new(),
            interrupted: Vec::new(),
            skipped: Vec::new(),
            stopped_early: false,
            reset: false,
        }
    }
}

/// Recalculates statistics for whole tables
#[derive(Debug, Clone)]
pub struct TableStatsEstimator {
    method: StatsMethod,
    persistent: IndexStatsEstimator,
    transient: TransientEstimator,
}

impl TableStatsEstimator {
    pub fn new(config: StatsConfig) -> Self {
        Self {
            method: config.method,
            transient: TransientEstimator::new(&config),
            persistent: IndexStatsEstimator::new(config),
        }
    }

    pub fn method(&self) -> StatsMethod {
        self.method
    }

    /// Recalculate one index and swap in the result
    ///
    /// Concurrent calls for the same index run one after the other. An
    /// interrupted analysis leaves the previous snapshot in place.
    pub fn analyze_index(&self, index: &Index) -> AnalyzeOutcome {
        self.analyze_tree(index, index.tree())
    }

    /// Analyze `tree` and publish the result as the statistics of `index`
    fn analyze_tree<T: IndexTree>(&self, index: &Index, tree: &T) -> AnalyzeOutcome {
        let _guard = index.lock_for_analyze();

        let outcome = match self.method {
            StatsMethod::Persistent => self.persistent.analyze(tree, index.n_uniq()),
            StatsMethod::Transient => {
                AnalyzeOutcome::Complete(self.transient.estimate(tree, index.n_uniq()))
            }
        };

        match &outcome {
            AnalyzeOutcome::Complete(stats) => {
                tracing::debug!(index = index.name(), %stats, "Index analyzed");
                index.set_stats(stats.clone());
            }
            AnalyzeOutcome::Interrupted { reason, .. } => {
                tracing::warn!(index = index.name(), %reason, "Keeping previous index statistics");
            }
        }
        outcome
    }

    /// Recalculate statistics for every index of `table`
    pub fn analyze(&self, table: &Table) -> TableAnalysis {
        let mut report = TableAnalysis::new(table);

        if table.is_corrupted() {
            tracing::warn!(table = table.name(), "Table is corrupted, resetting statistics");
            return self.reset(table, report);
        }

        let clustered = match table.clustered_index() {
            Some(index) if !index.is_corrupted() => index,
            _ => {
                tracing::warn!(
                    table = table.name(),
                    "First index is not a usable clustered index, resetting statistics"
                );
                return self.reset(table, report);
            }
        };

        self.record(&mut report, clustered, self.analyze_index(clustered));
        let clustered_stats = clustered.stats();

        let mut stats = TableStats {
            n_rows: clustered_stats.full_key_distinct(),
            clustered_index_size: clustered_stats.index_size,
            sum_of_other_index_sizes: 0,
            last_recalc: Some(Utc::now()),
            initialized: true,
        };

        for index in table.indexes().iter().skip(1) {
            self.analyze_secondary(table, index, &mut report, &mut stats);
        }

        if report.stopped_early {
            tracing::info!(table = table.name(), "Quit requested, remaining indexes keep their statistics");
        }

        tracing::info!(
            table = table.name(),
            n_rows = stats.n_rows,
            clustered_index_size = stats.clustered_index_size,
            sum_of_other_index_sizes = stats.sum_of_other_index_sizes,
            "Table statistics recalculated"
        );

        table.set_stats(stats.clone());
        table.reset_modified();
        report.stats = stats;
        report
    }

    /// Analyze one non-clustered index and add its size to the table total
    ///
    /// The table flags are read again for every index, so a table that is
    /// corrupted or asked to quit part way through stops being analyzed.
    fn analyze_secondary(
        &self,
        table: &Table,
        index: &Index,
        report: &mut TableAnalysis,
        stats: &mut TableStats,
    ) {
        if !index.has_stats() {
            report.skipped.push(index.name().to_string());
            return;
        }

        if index.should_ignore() || table.is_corrupted() {
            tracing::debug!(table = table.name(), index = index.name(), "Skipping index");
            index.reset_stats();
            report.skipped.push(index.name().to_string());
            return;
        }

        if table.should_quit() {
            report.stopped_early = true;
        } else {
            self.record(report, index, self.analyze_index(index));
        }

        stats.sum_of_other_index_sizes += index.stats().index_size;
    }

    fn record(&self, report: &mut TableAnalysis, index: &Index, outcome: AnalyzeOutcome) {
        match outcome {
            AnalyzeOutcome::Complete(_) => report.analyzed.push(index.name().to_string()),
            AnalyzeOutcome::Interrupted { .. } => report.interrupted.push(index.name().to_string()),
        }
    }

    fn reset(&self, table: &Table, mut report: TableAnalysis) -> TableAnalysis {
        table.reset_stats();
        report.stats = table.stats();
        report.reset = true;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::testing::ReshapingTree;
    use crate::btree::{BTreeIndex, Record};
    use crate::config::TreeConfig;
    use crate::dict::{IndexDef, IndexKind};
    use crate::stats::IndexStats;
    use std::sync::Arc;

    fn tree_config() -> TreeConfig {
        TreeConfig {
            page_capacity: 8,
            fill_factor: 1.0,
            ..Default::default()
        }
    }

    /// Clustered index on id, secondary on (id % 10, id), full-text on id
    fn table(rows: i64) -> Table {
        let config = tree_config();
        let primary = BTreeIndex::bulk_load(
            1,
            2,
            (0..rows).map(|i| Record::from_ints(&[i, i * 3])).collect(),
            &config,
        )
        .unwrap();
        let secondary = BTreeIndex::bulk_load(
            2,
            2,
            (0..rows).map(|i| Record::from_ints(&[i % 10, i])).collect(),
            &config,
        )
        .unwrap();

        let indexes = vec![
            Index::with_tree(IndexDef::new("PRIMARY", IndexKind::Clustered, 1, 2), primary).unwrap(),
            Index::with_tree(IndexDef::new("idx_mod", IndexKind::Secondary, 2, 2), secondary).unwrap(),
            Index::new(IndexDef::new("ft", IndexKind::FullText, 1, 1), &config).unwrap(),
        ];
        Table::new("t", indexes.into_iter().map(Arc::new).collect())
    }

    fn estimator() -> TableStatsEstimator {
        TableStatsEstimator::new(StatsConfig {
            seed: Some(1),
            ..Default::default()
        })
    }

    #[test]
    fn test_analyze_table() {
        let t = table(100);
        t.note_modified(100);

        let report = estimator().analyze(&t);

        assert!(!report.reset);
        assert_eq!(report.analyzed, vec!["PRIMARY", "idx_mod"]);
        assert_eq!(report.skipped, vec!["ft"]);

        let stats = t.stats();
        assert_eq!(stats.n_rows, 100);
        assert!(stats.initialized);
        assert!(stats.last_recalc.is_some());
        assert_eq!(stats.clustered_index_size, t.indexes()[0].stats().index_size);
        assert_eq!(stats.sum_of_other_index_sizes, t.indexes()[1].stats().index_size);
        assert_eq!(t.indexes()[1].stats().n_diff_key_vals, vec![10, 100]);
        assert_eq!(t.modified_count(), 0);
        assert!(t.indexes()[2].stats().is_empty_state());
    }

    #[test]
    fn test_uncommitted_index_is_reset_and_not_summed() {
        let t = table(50);
        let mut stale = IndexStats::empty(2);
        stale.n_diff_key_vals = vec![1, 1];
        t.indexes()[1].set_stats(stale);
        t.indexes()[1].set_committed(false);

        let report = estimator().analyze(&t);

        assert_eq!(report.skipped, vec!["idx_mod", "ft"]);
        assert!(t.indexes()[1].stats().is_empty_state());
        assert_eq!(t.stats().sum_of_other_index_sizes, 0);
    }

    #[test]
    fn test_corrupted_table_is_reset() {
        let t = table(50);
        estimator().analyze(&t);
        assert_eq!(t.stats().n_rows, 50);

        t.mark_corrupted();
        let report = estimator().analyze(&t);

        assert!(report.reset);
        assert_eq!(t.stats().n_rows, 0);
        assert_eq!(t.stats().clustered_index_size, 1);
        assert_eq!(t.stats().sum_of_other_index_sizes, 2);
        assert!(t.indexes()[0].stats().is_empty_state());
        assert!(t.indexes()[1].stats().is_empty_state());
    }

    #[test]
    fn test_missing_clustered_index_resets() {
        let config = tree_config();
        let secondary = Index::new(IndexDef::new("idx", IndexKind::Secondary, 1, 1), &config).unwrap();
        let t = Table::new("no_pk", vec![Arc::new(secondary)]);

        let report = estimator().analyze(&t);
        assert!(report.reset);
        assert!(t.stats().initialized);
        assert_eq!(t.stats().sum_of_other_index_sizes, 0);

        let t = table(20);
        t.indexes()[0].mark_corrupted();
        assert!(estimator().analyze(&t).reset);
    }

    #[test]
    fn test_quit_keeps_previous_secondary_stats() {
        let t = table(100);
        let mut previous = IndexStats::empty(2);
        previous.n_diff_key_vals = vec![4, 40];
        previous.index_size = 9;
        t.indexes()[1].set_stats(previous.clone());

        t.request_quit();
        let report = estimator().analyze(&t);

        assert!(report.stopped_early);
        assert_eq!(report.analyzed, vec!["PRIMARY"]);
        assert_eq!(*t.indexes()[1].stats(), previous);
        assert_eq!(t.stats().sum_of_other_index_sizes, 9);
        assert_eq!(t.stats().n_rows, 100);
    }

    #[test]
    fn test_interrupted_analysis_keeps_snapshot() {
        let records = |n: i64| -> Vec<Record> { (0..n).map(|i| Record::from_ints(&[i % 40, i])).collect() };
        let small_pages = TreeConfig {
            page_capacity: 4,
            ..tree_config()
        };
        let index = Index::with_tree(
            IndexDef::new("idx", IndexKind::Secondary, 2, 2),
            BTreeIndex::bulk_load(2, 2, records(4000), &tree_config()).unwrap(),
        )
        .unwrap();
        let estimator = TableStatsEstimator::new(StatsConfig {
            sample_pages: 4,
            seed: Some(6),
            ..Default::default()
        });

        assert!(estimator.analyze_index(&index).stats().is_some());
        let previous = index.stats();

        // The root has grown by the time the root level is scanned
        let reshaped = ReshapingTree::new(
            BTreeIndex::bulk_load(2, 2, records(4000), &tree_config()).unwrap(),
            BTreeIndex::bulk_load(2, 2, records(4000), &small_pages).unwrap(),
            1,
        );
        let outcome = estimator.analyze_tree(&index, &reshaped);

        assert!(matches!(outcome, AnalyzeOutcome::Interrupted { .. }));
        assert!(Arc::ptr_eq(&previous, &index.stats()));
    }

    #[test]
    fn test_table_corrupted_between_indexes() {
        let t = table(100);
        let estimator = estimator();
        estimator.analyze(&t);
        assert!(!t.indexes()[1].stats().is_empty_state());

        // The clustered index is done when the table goes bad
        let mut report = TableAnalysis::new(&t);
        let mut stats = t.stats();
        stats.sum_of_other_index_sizes = 0;
        t.mark_corrupted();

        estimator.analyze_secondary(&t, &t.indexes()[1], &mut report, &mut stats);

        assert_eq!(report.skipped, vec!["idx_mod"]);
        assert!(report.analyzed.is_empty());
        assert!(t.indexes()[1].stats().is_empty_state());
        assert_eq!(stats.sum_of_other_index_sizes, 0);
    }

    #[test]
    fn test_transient_method() {
        let t = table(100);
        let estimator = TableStatsEstimator::new(StatsConfig {
            method: StatsMethod::Transient,
            seed: Some(2),
            ..Default::default()
        });

        let report = estimator.analyze(&t);

        assert_eq!(report.analyzed, vec!["PRIMARY", "idx_mod"]);
        let stats = t.indexes()[0].stats();
        assert_eq!(stats.n_sample_sizes, vec![8]);
        assert!(stats.full_key_distinct() > 0);
    }

    #[test]
    fn test_analyze_while_writing() {
        let t = table(2000);
        let estimator = TableStatsEstimator::new(StatsConfig {
            sample_pages: 4,
            ..Default::default()
        });

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 2000..6000 {
                    t.indexes()[0]
                        .tree()
                        .insert(Record::from_ints(&[i, 0]))
                        .unwrap();
                    t.note_modified(1);
                }
            });

            for _ in 0..20 {
                estimator.analyze(&t);
                let stats = t.indexes()[0].stats();
                assert_eq!(stats.n_diff_key_vals.len(), 1);
                assert!(stats.n_sample_sizes.iter().all(|&s| s >= 1));
            }
        });

        let report = estimator.analyze(&t);
        assert_eq!(report.analyzed.first().map(String::as_str), Some("PRIMARY"));
    }
}
