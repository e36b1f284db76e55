//! Synthetic tables
//!
//! Builds a table with a clustered index on `id` and one secondary index on
//! `(c1, .., ck, id)`. Column values are drawn from a seeded generator, so
//! the same description always yields the same table.

use crate::btree::{BTreeIndex, Datum, Record, TreeResult};
use crate::config::TreeConfig;
use crate::dict::{Index, IndexDef, IndexKind, Table};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shape of a synthetic table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub rows: u64,
    /// Columns in the secondary index, besides `id`
    pub columns: usize,
    /// Value range per column; the last entry applies to the remaining columns
    pub distinct: Vec<u64>,
    /// Every n-th row stores a field off-page
    pub overflow_every: Option<u64>,
    /// Every n-th row is delete-marked
    pub delete_every: Option<u64>,
    pub seed: u64,
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        Self {
            rows: 100_000,
            columns: 2,
            distinct: vec![100, 1000],
            overflow_every: None,
            delete_every: None,
            seed: 42,
        }
    }
}

impl WorkloadSpec {
    /// Value range of column `col` (0-based)
    pub fn distinct_for(&self, col: usize) -> u64 {
        self.distinct
            .get(col)
            .or_else(|| self.distinct.last())
            .copied()
            .unwrap_or(1)
            .max(1)
    }

    fn every(n: Option<u64>, id: u64) -> bool {
        matches!(n, Some(n) if n > 0 && id % n == n - 1)
    }
}

/// Name of the secondary index built by [`build_table`]
pub const SECONDARY_INDEX: &str = "idx_columns";

/// Build the table described by `spec`
pub fn build_table(name: &str, spec: &WorkloadSpec, config: &TreeConfig) -> TreeResult<Table> {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let k = spec.columns;
    let overflow_len = config.page_size * 3 / 2;

    let mut primary = Vec::with_capacity(spec.rows as usize);
    let mut secondary = Vec::with_capacity(spec.rows as usize);

    for id in 0..spec.rows {
        let values: Vec<Datum> = (0..k)
            .map(|col| Datum::Int(rng.gen_range(0..spec.distinct_for(col)) as i64))
            .collect();
        let deleted = WorkloadSpec::every(spec.delete_every, id);

        let mut row = Vec::with_capacity(k + 1);
        row.push(Datum::Int(id as i64));
        row.extend(values.iter().cloned());
        let mut clustered = Record::new(row);
        if WorkloadSpec::every(spec.overflow_every, id) {
            clustered = clustered.with_external(overflow_len);
        }

        let mut key = values;
        key.push(Datum::Int(id as i64));
        let mut entry = Record::new(key);

        if deleted {
            clustered = clustered.deleted();
            entry = entry.deleted();
        }
        primary.push(clustered);
        secondary.push(entry);
    }

    let primary_tree = BTreeIndex::bulk_load(1, k + 1, primary, config)?;
    let secondary_tree = BTreeIndex::bulk_load(k + 1, k + 1, secondary, config)?;

    tracing::debug!(
        table = name,
        rows = spec.rows,
        primary_height = primary_tree.height(),
        secondary_height = secondary_tree.height(),
        "Built synthetic table"
    );

    let indexes = vec![
        Index::with_tree(IndexDef::new("PRIMARY", IndexKind::Clustered, 1, k + 1), primary_tree)?,
        Index::with_tree(
            IndexDef::new(SECONDARY_INDEX, IndexKind::Secondary, k + 1, k + 1),
            secondary_tree,
        )?,
    ];
    Ok(Table::new(name, indexes.into_iter().map(Arc::new).collect()))
}
