//! Self-describing binary container, standing in for the NetCDF contract
//! named but not pinned down by the distilled specification (§6).
//!
//! The on-disk record is a `bincode`-encoded [`BinaryRecord`]: the dense-order
//! `(sector, region)` name pairs followed by the row-major flow matrix.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entities::{RegionId, SectorId};
use crate::error::{MrioError, StorageError};
use crate::index_set::IndexSet;
use crate::table::Table;

#[derive(Serialize, Deserialize)]
struct BinaryRecord {
    /// `(sector, region)` names, in dense-index order.
    pairs: Vec<(String, String)>,
    /// Row-major flow matrix over `pairs`.
    values: Vec<f64>,
}

fn io_err(path: &str, source: std::io::Error) -> MrioError {
    StorageError::Io {
        path: path.to_string(),
        source,
    }
    .into()
}

fn malformed(path: &str, reason: impl Into<String>) -> MrioError {
    StorageError::MalformedBinary {
        path: path.to_string(),
        reason: reason.into(),
    }
    .into()
}

pub fn load(path: &Path, threshold: f64) -> Result<(IndexSet, Table<f64>), MrioError> {
    let path_str = path.display().to_string();
    let reader = BufReader::new(File::open(path).map_err(|source| io_err(&path_str, source))?);

    let record: BinaryRecord =
        bincode::deserialize_from(reader).map_err(|source| malformed(&path_str, source.to_string()))?;
    let n_pairs = record.pairs.len();
    if record.values.len() != n_pairs * n_pairs {
        return Err(malformed(
            &path_str,
            format!("expected {} flow values for {n_pairs} pairs, got {}", n_pairs * n_pairs, record.values.len()),
        ));
    }

    let mut index_set = IndexSet::new();
    let mut row_ids = Vec::with_capacity(n_pairs);
    for (sector_name, region_name) in &record.pairs {
        let sector = index_set.add_sector(sector_name)?;
        let region = index_set.add_region(region_name)?;
        let already = index_set.supersector(sector).regions.contains(&region);
        if !already {
            index_set.add_index(sector, region)?;
        }
        row_ids.push((sector, region));
    }
    index_set.finalize_load();

    let dense_of_row: Vec<usize> = row_ids
        .iter()
        .map(|&(sector, region)| {
            index_set
                .at(SectorId::Super(sector), RegionId::Super(region))
                .expect("every registered pair resolves to a dense index")
        })
        .collect();

    let mut table = Table::zeros(&index_set);
    for row in 0..n_pairs {
        for col in 0..n_pairs {
            let mut value = record.values[row * n_pairs + col];
            if value.abs() <= threshold {
                value = 0.0;
            }
            let dense_row = dense_of_row[row];
            let dense_col = dense_of_row[col];
            table.set_raw(dense_row * n_pairs + dense_col, value);
        }
    }

    Ok((index_set, table))
}

pub fn write(path: &Path, index_set: &IndexSet, table: &Table<f64>) -> Result<(), MrioError> {
    let path_str = path.display().to_string();
    let writer = BufWriter::new(File::create(path).map_err(|source| io_err(&path_str, source))?);

    let mut ordered = index_set.iterate_total();
    ordered.sort_by_key(|&(_, _, idx)| idx);
    let n = ordered.len();

    let pairs = ordered
        .iter()
        .map(|&(sector, region, _)| (index_set.sector_name(sector).to_string(), index_set.region_name(region).to_string()))
        .collect();

    let mut values = Vec::with_capacity(n * n);
    for row in 0..n {
        for col in 0..n {
            values.push(table.get_raw(row * n + col));
        }
    }

    let record = BinaryRecord { pairs, values };
    bincode::serialize_into(writer, &record).map_err(|source| malformed(&path_str, source.to_string()))?;
    Ok(())
}
