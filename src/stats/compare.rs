//! Record prefix comparison
//!
//! The scanners only need to know how many leading fields two adjacent
//! records share. A record carrying the minimum-record flag compares below
//! everything and shares no fields with anything.

use crate::btree::{Datum, Record};

/// Borrowed view of the leading key fields of a record
#[derive(Debug, Clone, Copy)]
pub struct KeyRef<'a> {
    fields: &'a [Datum],
    min_rec: bool,
}

impl<'a> From<&'a Record> for KeyRef<'a> {
    fn from(rec: &'a Record) -> Self {
        Self {
            fields: &rec.fields,
            min_rec: rec.min_rec,
        }
    }
}

/// Owned copy of a record's key prefix
///
/// Allocated once per analysis with room for `n_uniq` fields and refilled in
/// place, so a scan keeps the previous record across a page boundary without
/// allocating per record.
#[derive(Debug)]
pub struct PrefixBuf {
    fields: Vec<Datum>,
    min_rec: bool,
}

impl PrefixBuf {
    pub fn with_capacity(n_uniq: usize) -> Self {
        Self {
            fields: Vec::with_capacity(n_uniq),
            min_rec: false,
        }
    }

    /// Replace the contents with the first `n` fields of `rec`
    pub fn copy_from(&mut self, rec: &Record, n: usize) {
        self.fields.clear();
        self.fields.extend_from_slice(rec.prefix(n));
        self.min_rec = rec.min_rec;
    }

    pub fn key(&self) -> KeyRef<'_> {
        KeyRef {
            fields: &self.fields,
            min_rec: self.min_rec,
        }
    }
}

/// Counts matching leading fields on up to `n_uniq` columns
#[derive(Debug, Clone, Copy)]
pub struct RecordComparator {
    n_uniq: usize,
}

impl RecordComparator {
    pub fn new(n_uniq: usize) -> Self {
        Self { n_uniq }
    }

    pub fn n_uniq(&self) -> usize {
        self.n_uniq
    }

    /// Number of leading fields, at most `n_uniq`, on which `a` and `b` agree
    pub fn matched_fields(&self, a: KeyRef<'_>, b: KeyRef<'_>) -> usize {
        if a.min_rec || b.min_rec {
            return 0;
        }
        a.fields
            .iter()
            .zip(b.fields)
            .take(self.n_uniq)
            .take_while(|(x, y)| x == y)
            .count()
    }

    /// Same as [`matched_fields`](Self::matched_fields) for two records
    pub fn compare(&self, a: &Record, b: &Record) -> usize {
        self.matched_fields(a.into(), b.into())
    }
}
