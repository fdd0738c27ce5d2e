//! Tabular base/output table storage: an index file plus a dense matrix
//! file, both plain comma-separated text (§6, "pair of tabular files").
//!
//! Index file: one header row, then one `region,sector` row per stored
//! (sector, region) pair, in storage order. Matrix file: `N` rows of `N`
//! comma-separated floats in the same order, `matrix[i][j]` being the flow
//! from entry `i` to entry `j`.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::entities::{RegionId, SectorId};
use crate::error::{MrioError, StorageError};
use crate::index_set::IndexSet;
use crate::table::Table;

fn index_file_path(base: &Path) -> std::path::PathBuf {
    let mut p = base.as_os_str().to_os_string();
    p.push(".index");
    std::path::PathBuf::from(p)
}

pub fn load(matrix_path: &Path, threshold: f64) -> Result<(IndexSet, Table<f64>), MrioError> {
    let index_path = index_file_path(matrix_path);
    let pairs = read_index_file(&index_path)?;

    let mut index_set = IndexSet::new();
    let mut row_ids = Vec::with_capacity(pairs.len());
    for (region_name, sector_name) in &pairs {
        let sector = index_set.add_sector(sector_name)?;
        let region = index_set.add_region(region_name)?;
        if index_set.at(SectorId::Super(sector), RegionId::Super(region)).is_none() {
            // add_index is idempotent-unfriendly (errors on duplicate), so
            // only call it the first time this exact pair is seen.
            let already = index_set
                .supersector(sector)
                .regions
                .contains(&region);
            if !already {
                index_set.add_index(sector, region)?;
            }
        }
        row_ids.push((sector, region));
    }
    index_set.finalize_load();

    let n = row_ids.len();
    let dense_of_row: Vec<usize> = row_ids
        .iter()
        .map(|&(sector, region)| {
            index_set
                .at(SectorId::Super(sector), RegionId::Super(region))
                .expect("every registered pair resolves to a dense index")
        })
        .collect();

    let mut table = Table::zeros(&index_set);
    let matrix_path_str = matrix_path.display().to_string();
    let file = File::open(matrix_path).map_err(|source| StorageError::Io {
        path: matrix_path_str.clone(),
        source,
    })?;
    let mut row_num = 0usize;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| StorageError::Io {
            path: matrix_path_str.clone(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split(',').map(str::trim).collect();
        if cols.len() != n {
            return Err(StorageError::ColumnCountMismatch {
                path: matrix_path_str.clone(),
                row: row_num,
                expected: n,
                got: cols.len(),
            }
            .into());
        }
        if row_num >= n {
            return Err(StorageError::DimensionMismatch {
                path: matrix_path_str.clone(),
                index_len: n,
                matrix_dim: row_num + 1,
            }
            .into());
        }
        for (col_num, raw) in cols.iter().enumerate() {
            let mut value: f64 = raw.parse().map_err(|_| StorageError::NumberParse {
                path: matrix_path_str.clone(),
                row: row_num,
                value: (*raw).to_string(),
            })?;
            if value.abs() <= threshold {
                value = 0.0;
            }
            let dense_row = dense_of_row[row_num];
            let dense_col = dense_of_row[col_num];
            table.set_raw(dense_row * n + dense_col, value);
        }
        row_num += 1;
    }
    if row_num != n {
        return Err(StorageError::DimensionMismatch {
            path: matrix_path_str,
            index_len: n,
            matrix_dim: row_num,
        }
        .into());
    }

    Ok((index_set, table))
}

fn read_index_file(path: &Path) -> Result<Vec<(String, String)>, MrioError> {
    let path_str = path.display().to_string();
    let file = File::open(path).map_err(|source| StorageError::Io {
        path: path_str.clone(),
        source,
    })?;
    let mut lines = BufReader::new(file).lines();
    lines.next().ok_or_else(|| StorageError::MissingHeader { path: path_str.clone() })?;

    let mut pairs = Vec::new();
    for (row_idx, line) in lines.enumerate() {
        let line = line.map_err(|source| StorageError::Io {
            path: path_str.clone(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split(',').map(str::trim).collect();
        if cols.len() != 2 {
            return Err(StorageError::ColumnCountMismatch {
                path: path_str.clone(),
                row: row_idx + 1,
                expected: 2,
                got: cols.len(),
            }
            .into());
        }
        pairs.push((cols[0].to_string(), cols[1].to_string()));
    }
    Ok(pairs)
}

pub fn write(matrix_path: &Path, index_set: &IndexSet, table: &Table<f64>) -> Result<(), MrioError> {
    let index_path = index_file_path(matrix_path);
    let leaves = index_set.iterate_total();
    let mut ordered = leaves.clone();
    ordered.sort_by_key(|&(_, _, idx)| idx);

    let index_path_str = index_path.display().to_string();
    let mut index_file = BufWriter::new(File::create(&index_path).map_err(|source| StorageError::Io {
        path: index_path_str.clone(),
        source,
    })?);
    writeln!(index_file, "region,sector").map_err(|source| StorageError::Io {
        path: index_path_str.clone(),
        source,
    })?;
    for &(sector, region, _) in &ordered {
        writeln!(index_file, "{},{}", index_set.region_name(region), index_set.sector_name(sector)).map_err(
            |source| StorageError::Io {
                path: index_path_str.clone(),
                source,
            },
        )?;
    }

    let matrix_path_str = matrix_path.display().to_string();
    let mut matrix_file = BufWriter::new(File::create(matrix_path).map_err(|source| StorageError::Io {
        path: matrix_path_str.clone(),
        source,
    })?);
    let n = ordered.len();
    for row in 0..n {
        let mut fields = Vec::with_capacity(n);
        for col in 0..n {
            fields.push(table.get_raw(row * n + col).to_string());
        }
        writeln!(matrix_file, "{}", fields.join(",")).map_err(|source| StorageError::Io {
            path: matrix_path_str.clone(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_small_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let matrix_path = dir.path().join("base.csv");
        let index_path = index_file_path(&matrix_path);

        std::fs::write(&index_path, "region,sector\nA,S\nB,S\n").unwrap();
        std::fs::write(&matrix_path, "10,20\n30,40\n").unwrap();

        let (index_set, table) = load(&matrix_path, 0.0).unwrap();
        assert_eq!(index_set.size(), 2);
        assert_eq!(table.raw().iter().sum::<f64>(), 100.0);

        let out_path = dir.path().join("out.csv");
        write(&out_path, &index_set, &table).unwrap();
        let (index_set2, table2) = load(&out_path, 0.0).unwrap();
        assert_eq!(index_set2.size(), 2);
        assert_eq!(table2.raw().iter().sum::<f64>(), 100.0);
    }

    #[test]
    fn rejects_malformed_column_count() {
        let dir = tempfile::tempdir().unwrap();
        let matrix_path = dir.path().join("base.csv");
        let index_path = index_file_path(&matrix_path);
        std::fs::write(&index_path, "region,sector\nA,S\n").unwrap();
        std::fs::write(&matrix_path, "10,20\n").unwrap();

        let err = load(&matrix_path, 0.0);
        assert!(err.is_err());
    }

    #[test]
    fn threshold_coerces_small_values_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let matrix_path = dir.path().join("base.csv");
        let index_path = index_file_path(&matrix_path);
        std::fs::write(&index_path, "region,sector\nA,S\n").unwrap();
        std::fs::write(&matrix_path, "0.0001\n").unwrap();

        let (_, table) = load(&matrix_path, 0.001).unwrap();
        assert_eq!(table.get_raw(0), 0.0);
    }
}
