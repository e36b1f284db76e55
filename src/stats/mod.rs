//! Index Statistics Engine
//!
//! Estimates the number of distinct values of every key prefix of an index
//! without reading the whole index:
//!
//! - **compare**: Matching leading fields between records
//! - **level**: One full pass over a tree level (`LevelScanner`)
//! - **dive**: Descent below a non-leaf record to one leaf (`LeafDiver`)
//! - **sample**: Leaf dives spread over distinct-value groups (`PrefixSampler`)
//! - **index**: The per-index descent state machine (`IndexStatsEstimator`)
//! - **transient**: Cheaper random-leaf estimator (`TransientEstimator`)
//! - **table**: All indexes of a table (`TableStatsEstimator`)
//! - **background**: Periodic recalculation of modified tables (`StatsWorker`)
//! - **error**: Error types
//!
//! # Estimation
//!
//! ```text
//! root ─── scan level, too few groups? go down ───┐
//!  │                                              ▼
//!  │                          level L with enough groups (or level 1)
//!  │                                              │
//!  │                    pick N groups at random, one per segment
//!  │                                              │
//!  └──────────────── dive below each to a leaf, count groups there
//!
//! estimate = leaf pages * (groups on L / records on L) * (groups per sampled leaf)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use keystats::btree::{BTreeIndex, Record};
//! use keystats::config::{StatsConfig, TreeConfig};
//! use keystats::stats::IndexStatsEstimator;
//!
//! let records = (0..100_000).map(|i| Record::from_ints(&[i % 1000, i])).collect();
//! let tree = BTreeIndex::bulk_load(2, 2, records, &TreeConfig::default())?;
//!
//! let outcome = IndexStatsEstimator::new(StatsConfig::default()).analyze(&tree, 2);
//! if let Some(stats) = outcome.stats() {
//!     println!("{}", stats);
//! }
//! # Ok::<(), keystats::btree::TreeError>(())
//! ```

pub mod background;
pub mod compare;
pub mod dive;
pub mod error;
pub mod index;
pub mod level;
pub mod sample;
pub mod table;
pub mod transient;
pub mod types;

pub use background::StatsWorker;
pub use compare::{KeyRef, PrefixBuf, RecordComparator};
pub use dive::{scan_page, DiveResult, LeafDiver, PageScan};
pub use error::{StatsError, StatsResult};
pub use index::{AnalyzeOutcome, IndexStatsEstimator};
pub use level::LevelScanner;
pub use sample::{segment_bounds, PrefixSampler};
pub use table::{TableAnalysis, TableStatsEstimator};
pub use transient::TransientEstimator;
pub use types::{IndexStats, LevelScanResult, PrefixSampleData};

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Random source for sample selection: seeded when reproducibility is asked for
pub(crate) fn sampling_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
