//! # Keystats
//!
//! Cardinality statistics for B-tree indexes: estimates how many distinct
//! values every key prefix of an index holds, by scanning a few upper tree
//! levels and diving to a sample of leaf pages instead of reading the whole
//! index.
//!
//! ## Features
//!
//! - **Level descent**: picks the highest non-leaf level with enough distinct groups
//! - **Leaf dives**: samples leaves spread evenly over those groups
//! - **Writer friendly**: latches are held per level scan, never per analysis
//! - **Snapshot stats**: readers always see a complete, consistent result
//! - **Background recalc**: modified tables are re-analyzed periodically
//!
//! ## Modules
//!
//! - [`btree`]: Paged B+tree and the read interface the estimator needs
//! - [`stats`]: The estimators and the background worker
//! - [`dict`]: Tables and indexes owning their statistics
//! - [`config`]: TOML and environment configuration
//! - [`workload`]: Seeded synthetic tables
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keystats::config::{StatsConfig, TreeConfig};
//! use keystats::stats::TableStatsEstimator;
//! use keystats::workload::{build_table, WorkloadSpec};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let table = build_table("orders", &WorkloadSpec::default(), &TreeConfig::default())?;
//!
//!     let report = TableStatsEstimator::new(StatsConfig::default()).analyze(&table);
//!     println!("~{} rows", report.stats.n_rows);
//!
//!     for index in table.indexes() {
//!         println!("{}: {}", index.name(), index.stats());
//!     }
//!     Ok(())
//! }
//! ```

pub mod btree;
pub mod config;
pub mod dict;
pub mod stats;
pub mod workload;

// Re-export top-level types for convenience
pub use btree::{BTreeIndex, Datum, IndexTree, Record, TreeError, TreeResult, TreeView};

pub use stats::{
    AnalyzeOutcome, IndexStats, IndexStatsEstimator, StatsError, StatsResult, StatsWorker,
    TableAnalysis, TableStatsEstimator, TransientEstimator,
};

pub use dict::{Index, IndexDef, IndexKind, Table, TableStats};

pub use config::{Config, ConfigError, LoggingConfig, StatsConfig, StatsMethod, TreeConfig};
