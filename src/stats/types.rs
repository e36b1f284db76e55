//! Data produced by the statistics engine
//!
//! - `IndexStats`: the per-index result handed to planners and persistence
//! - `LevelScanResult`: one full pass over a tree level
//! - `PrefixSampleData`: the inputs of one key prefix's final estimate

use crate::btree::ScanEpoch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cardinality statistics of one index
///
/// Entry `p - 1` of each array describes the first `p` key columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Estimated number of distinct values per key prefix
    pub n_diff_key_vals: Vec<u64>,
    /// Leaf pages the estimate for each prefix was based on
    pub n_sample_sizes: Vec<u64>,
    /// Pages reserved by the whole index
    pub index_size: u64,
    /// Pages in the leaf segment
    pub n_leaf_pages: u64,
    /// When these values were computed; `None` for the empty state
    pub last_analyzed: Option<DateTime<Utc>>,
}

impl IndexStats {
    /// The state of a new or reset index: nothing known yet
    pub fn empty(n_uniq: usize) -> Self {
        Self {
            n_diff_key_vals: vec![0; n_uniq],
            n_sample_sizes: vec![1; n_uniq],
            index_size: 1,
            n_leaf_pages: 1,
            last_analyzed: None,
        }
    }

    pub fn n_uniq(&self) -> usize {
        self.n_diff_key_vals.len()
    }

    /// Whether this is the untouched empty state
    pub fn is_empty_state(&self) -> bool {
        self.last_analyzed.is_none()
            && self.n_diff_key_vals.iter().all(|&n| n == 0)
            && self.n_sample_sizes.iter().all(|&n| n == 1)
            && self.index_size == 1
            && self.n_leaf_pages == 1
    }

    /// Distinct values of the full unique key
    pub fn full_key_distinct(&self) -> u64 {
        self.n_diff_key_vals.last().copied().unwrap_or(0)
    }

    /// Average rows per distinct value of the first `n_prefix` columns
    pub fn rows_per_key(&self, n_prefix: usize, n_rows: u64) -> Option<f64> {
        let n_diff = *self.n_diff_key_vals.get(n_prefix.checked_sub(1)?)?;
        if n_diff == 0 {
            return None;
        }
        Some(n_rows as f64 / n_diff as f64)
    }
}

impl std::fmt::Display for IndexStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n_diff={:?}, sample_sizes={:?}, size={} pages, leaf={} pages",
            self.n_diff_key_vals, self.n_sample_sizes, self.index_size, self.n_leaf_pages
        )
    }
}

/// Result of one pass over every record of a tree level
#[derive(Debug, Clone, PartialEq)]
pub struct LevelScanResult {
    pub level: u16,
    /// Distinct groups per prefix length
    pub n_diff: Vec<u64>,
    /// Records counted (delete-marked leaf records excluded unless configured)
    pub total_recs: u64,
    /// Pages visited; at least 1
    pub total_pages: u64,
    /// Per prefix, the 0-based index of the last record of every group
    pub boundaries: Option<Vec<Vec<u64>>>,
    /// Tree shape seen while scanning
    pub epoch: ScanEpoch,
}

impl LevelScanResult {
    /// Group boundaries for a prefix length, if they were collected
    pub fn boundaries_for(&self, n_prefix: usize) -> Option<&[u64]> {
        self.boundaries
            .as_ref()
            .and_then(|b| b.get(n_prefix - 1))
            .map(|v| v.as_slice())
    }
}

/// What was learned about one key prefix by sampling below a level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixSampleData {
    /// Level the leaf dives started from; never the leaf level
    pub level: u16,
    pub n_recs_on_level: u64,
    pub n_diff_on_level: u64,
    /// Planned number of leaf dives
    pub n_leaf_pages_to_analyze: u64,
    /// Leaf dives actually completed
    pub n_leaf_pages_analyzed: u64,
    /// Sum of per-leaf distinct counts, each reduced by one
    pub n_diff_all_analyzed_pages: u64,
    /// Overflow pages referenced from the sampled leaves
    pub n_external_pages_sum: u64,
    /// Tree shape seen while sampling
    pub epoch: ScanEpoch,
}

impl PrefixSampleData {
    /// Distinct-value estimate for the whole index
    ///
    /// ```text
    /// ordinary_leaf_pages * (n_diff_on_level / n_recs_on_level)
    ///                     * (n_diff_all_analyzed_pages / n_leaf_pages_to_analyze)
    /// ```
    ///
    /// Evaluated left to right in saturating 128-bit arithmetic.
    pub fn estimate(&self, n_leaf_pages: u64) -> u64 {
        if self.n_leaf_pages_to_analyze == 0 || self.n_recs_on_level == 0 {
            return 0;
        }

        let to_analyze = self.n_leaf_pages_to_analyze as u128;
        let ordinary_leaf_pages = if self.level == 1 {
            // Records on level 1 are exactly the leaf pages
            self.n_recs_on_level as u128
        } else {
            // D sampled pages referenced E overflow pages: ordinary = T * D / (D + E)
            n_leaf_pages as u128 * to_analyze / (to_analyze + self.n_external_pages_sum as u128)
        };

        let estimate = ordinary_leaf_pages.saturating_mul(self.n_diff_on_level as u128)
            / self.n_recs_on_level as u128;
        let estimate = estimate.saturating_mul(self.n_diff_all_analyzed_pages as u128) / to_analyze;

        u64::try_from(estimate).unwrap_or(u64::MAX)
    }
}
