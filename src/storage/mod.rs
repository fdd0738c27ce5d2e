//! Storage I/O (component C6).
//!
//! Two on-disk representations of a base/output table (§6):
//! - [`csv`]: an index file plus a dense matrix file, both plain text.
//! - [`binary`]: a single self-describing length-prefixed binary container,
//!   standing in for the NetCDF contract the distilled specification names
//!   without committing to its wire format.
//!
//! Both produce the same in-memory result: an [`IndexSet`](crate::index_set::IndexSet)
//! populated with every (sector, region) pair in the file, and a
//! [`Table`](crate::table::Table) of the same size holding the flows.

pub mod binary;
pub mod csv;

use crate::config::StorageFormat;
use crate::error::MrioError;
use crate::index_set::IndexSet;
use crate::table::Table;
use std::path::Path;

/// Loads a base table in the configured format.
pub fn load_table(format: StorageFormat, path: &Path, threshold: f64) -> Result<(IndexSet, Table<f64>), MrioError> {
    match format {
        StorageFormat::Tabular => csv::load(path, threshold),
        StorageFormat::Binary => binary::load(path, threshold),
    }
}

/// Writes a table in the configured format.
pub fn write_table(format: StorageFormat, path: &Path, index_set: &IndexSet, table: &Table<f64>) -> Result<(), MrioError> {
    match format {
        StorageFormat::Tabular => csv::write(path, index_set, table),
        StorageFormat::Binary => binary::write(path, index_set, table),
    }
}
