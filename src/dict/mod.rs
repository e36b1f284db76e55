//! Data dictionary objects that own statistics
//!
//! - **index**: `Index` wraps a tree with lifecycle flags and a stats snapshot
//! - **table**: `Table` groups indexes, the first one clustered
//!
//! Statistics are never written field by field: estimators build a whole new
//! value and swap it in, so a reader sees either the old or the new one.

pub mod index;
pub mod table;

pub use index::{Index, IndexDef, IndexKind};
pub use table::{Table, TableStats};
