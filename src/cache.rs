//! Table manager: an explicit handle for the two lookup tables the
//! category-index mappings need (the LMS index table and the coded-BKW
//! syndrome-decoding table), replacing the hidden global mutable caches
//! the original keeps per table shape. At most one table of each shape is
//! held at a time; requesting a different shape evicts and rebuilds.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::step::CodingType;
use crate::syndrome::SyndromeTable;

struct LmsTableEntry {
    c: u64,
    num_positions: usize,
    table: Vec<u64>,
}

struct SyndromeTableEntry {
    q: u32,
    coding: CodingType,
    table: SyndromeTable,
}

/// Caches at most one LMS table and one syndrome table. Constructed by the
/// driver and threaded by `&mut` into every call that needs a cached table,
/// so cache lifetime is visible at every call site instead of hidden behind
/// a `lazy_static`.
pub struct TableManager {
    lms: Option<LmsTableEntry>,
    syndrome: Option<SyndromeTableEntry>,
    /// Directory syndrome tables are persisted to and loaded from; `None`
    /// means always regenerate in memory (used by tests).
    syndrome_table_dir: Option<PathBuf>,
}

impl TableManager {
    pub fn new() -> Self {
        Self { lms: None, syndrome: None, syndrome_table_dir: None }
    }

    pub fn with_syndrome_table_dir(dir: PathBuf) -> Self {
        Self { lms: None, syndrome: None, syndrome_table_dir: Some(dir) }
    }

    /// Returns the LMS table for `(c, num_positions)`, building it first if
    /// the cache holds a table of a different shape (or none yet).
    pub fn lms_table(&mut self, c: u64, num_positions: usize) -> &Vec<u64> {
        let needs_rebuild = match &self.lms {
            Some(entry) => entry.c != c || entry.num_positions != num_positions,
            None => true,
        };
        if needs_rebuild {
            let table = crate::index::build_lms_table(c, num_positions);
            self.lms = Some(LmsTableEntry { c, num_positions, table });
        }
        &self.lms.as_ref().expect("just populated").table
    }

    /// Returns the syndrome table for `(q, coding)`, loading it from disk
    /// (generating and persisting it if absent) when a table directory was
    /// configured, or generating it purely in memory otherwise.
    pub fn syndrome_table(&mut self, q: u32, coding: CodingType) -> Result<&SyndromeTable, ConfigError> {
        let needs_rebuild = match &self.syndrome {
            Some(entry) => entry.q != q || entry.coding != coding,
            None => true,
        };
        if needs_rebuild {
            let table = match &self.syndrome_table_dir {
                Some(dir) => SyndromeTable::load_or_generate(dir, q, coding)?,
                None => SyndromeTable::generate(q, coding)?,
            };
            self.syndrome = Some(SyndromeTableEntry { q, coding, table });
        }
        Ok(&self.syndrome.as_ref().expect("just populated").table)
    }
}

impl Default for TableManager {
    fn default() -> Self {
        Self::new()
    }
}
