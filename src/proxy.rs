//! Proxy evidence store (component C3).
//!
//! Holds up to 18 proxy slots, one per refinement level. Each slot is a
//! dense array over a fixed arity and index signature (Table 4.3-A); levels
//! whose rule divides by a parent-level aggregate (1-4) additionally carry a
//! parent-sum array, filled explicitly from the proxy file where given and
//! computed by summing children everywhere else (per parent, not per file).
//! Levels 15-17 are derived purely from other levels' value arrays at
//! refinement time and own no storage of their own; level 18 is exact and
//! has no parent-sum companion since its rule never normalizes by one.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::entities::{SubRegionId, SubSectorId, SuperRegionId, SuperSectorId};
use crate::error::{ProxyError, StorageError};
use crate::index_set::IndexSet;

/// One axis of a proxy signature.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Axis {
    SubSector,
    SubRegion,
    SuperSector,
    SuperRegion,
}

/// A dense array of arbitrary rank, row-major, NaN-initialized.
#[derive(Clone, Debug)]
struct Grid {
    dims: Vec<usize>,
    data: Vec<f64>,
}

impl Grid {
    fn new(dims: Vec<usize>) -> Self {
        let len = dims.iter().product::<usize>().max(1);
        Grid {
            data: vec![f64::NAN; len],
            dims,
        }
    }

    fn linear(&self, coords: &[usize]) -> usize {
        debug_assert_eq!(coords.len(), self.dims.len());
        let mut idx = 0usize;
        for (c, d) in coords.iter().zip(&self.dims) {
            debug_assert!(*c < *d);
            idx = idx * d + c;
        }
        idx
    }

    fn get(&self, coords: &[usize]) -> f64 {
        self.data[self.linear(coords)]
    }

    fn set(&mut self, coords: &[usize], value: f64) {
        let i = self.linear(coords);
        self.data[i] = value;
    }
}

/// One loaded proxy level: its value array and, for levels 1-4, the
/// parent-sum array used as the rule's denominator.
#[derive(Clone, Debug)]
struct ProxyLevel {
    signature: Vec<Axis>,
    value: Grid,
    parent_sum: Option<Grid>,
}

/// The full collection of proxy evidence, indexed by level (1-18).
#[derive(Clone, Debug, Default)]
pub struct ProxyStore {
    levels: [Option<ProxyLevel>; 19], // 1-indexed; slot 0 unused
}

fn signature_for(level: u8) -> Option<Vec<Axis>> {
    use Axis::*;
    Some(match level {
        1 | 2 => vec![SubRegion],
        3 | 5 => vec![SubSector, SuperRegion],
        4 | 7 | 8 => vec![SubSector, SubRegion],
        6 => vec![SuperSector, SubRegion],
        9 => vec![SubSector, SuperSector, SuperRegion],
        10 => vec![SuperSector, SuperRegion, SubRegion],
        11 => vec![SubSector, SubSector, SubRegion],
        12 => vec![SubSector, SubRegion, SuperRegion],
        13 => vec![SuperSector, SubSector, SubRegion],
        14 => vec![SubSector, SubRegion, SubRegion],
        18 => vec![SubSector, SubRegion, SubSector, SubRegion],
        _ => return None,
    })
}

fn has_parent_sum(level: u8) -> bool {
    (1..=4).contains(&level)
}

fn dim_size(index_set: &IndexSet, axis: Axis) -> usize {
    match axis {
        Axis::SubSector => index_set.num_subsectors(),
        Axis::SubRegion => index_set.num_subregions(),
        Axis::SuperSector => index_set.num_supersectors(),
        Axis::SuperRegion => index_set.num_superregions(),
    }
}

fn parent_axis(axis: Axis) -> Axis {
    match axis {
        Axis::SubSector => Axis::SuperSector,
        Axis::SubRegion => Axis::SuperRegion,
        other => other,
    }
}

fn parent_coord(index_set: &IndexSet, axis: Axis, coord: usize) -> usize {
    match axis {
        Axis::SubSector => index_set.subsector(SubSectorId(coord as u32)).parent.0 as usize,
        Axis::SubRegion => index_set.subregion(SubRegionId(coord as u32)).parent.0 as usize,
        _ => coord,
    }
}

impl ProxyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_present(&self, level: u8) -> bool {
        (level as usize) < self.levels.len() && self.levels[level as usize].is_some()
    }

    /// Loads one proxy level from a `year, <keys...>, value[, parent_sum]`
    /// CSV file. Key columns are resolved to dense coordinates against
    /// `index_set` in the order dictated by the level's signature.
    pub fn load_level_csv(
        &mut self,
        index_set: &IndexSet,
        level: u8,
        path: impl AsRef<Path>,
        year: &str,
    ) -> Result<(), crate::error::MrioError> {
        let signature = signature_for(level).ok_or(ProxyError::LevelOutOfRange(level))?;
        if (15..=17).contains(&level) {
            return Err(ProxyError::DerivedLevelHasFile(level).into());
        }
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let file = File::open(path).map_err(|source| StorageError::Io {
            path: path_str.clone(),
            source,
        })?;
        let mut lines = BufReader::new(file).lines();

        let header = lines
            .next()
            .ok_or_else(|| StorageError::MissingHeader {
                path: path_str.clone(),
            })?
            .map_err(|source| StorageError::Io {
                path: path_str.clone(),
                source,
            })?;
        let expected_cols = 1 + signature.len() + 1; // year + keys + value
        let has_parent_sum_col = has_parent_sum(level);

        let dims: Vec<usize> = signature.iter().map(|a| dim_size(index_set, *a)).collect();
        let mut value_grid = Grid::new(dims.clone());

        let parent_dims: Vec<usize> = signature.iter().map(|a| dim_size(index_set, parent_axis(*a))).collect();
        let mut parent_grid = has_parent_sum_col.then(|| Grid::new(parent_dims));
        // Tracks which parent-sum cells were set explicitly, so finalize()
        // only fills in the rest.
        let mut parent_explicit = vec![false; parent_grid.as_ref().map_or(0, |g| g.data.len())];

        for (row_idx, line) in lines.enumerate() {
            let row = row_idx + 1; // header was row 0
            let line = line.map_err(|source| StorageError::Io {
                path: path_str.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.split(',').map(str::trim).collect();
            let min_cols = expected_cols;
            if cols.len() < min_cols || cols.len() > min_cols + 1 {
                return Err(StorageError::ColumnCountMismatch {
                    path: path_str.clone(),
                    row,
                    expected: expected_cols,
                    got: cols.len(),
                }
                .into());
            }
            if cols[0] != year {
                continue;
            }

            let mut coords = Vec::with_capacity(signature.len());
            for (i, axis) in signature.iter().enumerate() {
                let name = cols[1 + i];
                let coord = resolve_axis_name(index_set, *axis, name)?;
                coords.push(coord);
            }

            let value_col = 1 + signature.len();
            let value: f64 = cols[value_col].parse().map_err(|_| StorageError::NumberParse {
                path: path_str.clone(),
                row,
                value: cols[value_col].to_string(),
            })?;
            value_grid.set(&coords, value);

            if has_parent_sum_col && cols.len() == min_cols + 1 {
                let raw = cols[min_cols];
                if !raw.is_empty() {
                    let parent_value: f64 = raw.parse().map_err(|_| StorageError::NumberParse {
                        path: path_str.clone(),
                        row,
                        value: raw.to_string(),
                    })?;
                    let p_coords: Vec<usize> = signature
                        .iter()
                        .zip(&coords)
                        .map(|(axis, &c)| parent_coord(index_set, *axis, c))
                        .collect();
                    if let Some(grid) = parent_grid.as_mut() {
                        let lin = grid.linear(&p_coords);
                        grid.set(&p_coords, parent_value);
                        parent_explicit[lin] = true;
                    }
                }
            }
        }

        if let Some(grid) = parent_grid.as_mut() {
            fill_computed_parent_sums(index_set, &signature, &value_grid, grid, &parent_explicit);
        }

        self.levels[level as usize] = Some(ProxyLevel {
            signature,
            value: value_grid,
            parent_sum: parent_grid,
        });
        Ok(())
    }

    fn value(&self, level: u8, coords: &[usize]) -> f64 {
        match &self.levels[level as usize] {
            Some(l) => l.value.get(coords),
            None => f64::NAN,
        }
    }

    fn sum(&self, level: u8, coords: &[usize]) -> f64 {
        match &self.levels[level as usize] {
            Some(l) => l.parent_sum.as_ref().map_or(f64::NAN, |g| g.get(coords)),
            None => f64::NAN,
        }
    }

    // ---- typed accessors used by the refinement engine -----------------

    pub fn value1(&self, r: SubRegionId) -> f64 {
        self.value(1, &[r.0 as usize])
    }
    pub fn sum1(&self, r: SuperRegionId) -> f64 {
        self.sum(1, &[r.0 as usize])
    }
    pub fn value2(&self, r: SubRegionId) -> f64 {
        self.value(2, &[r.0 as usize])
    }
    pub fn sum2(&self, r: SuperRegionId) -> f64 {
        self.sum(2, &[r.0 as usize])
    }
    pub fn value3(&self, i: SubSectorId, r: SuperRegionId) -> f64 {
        self.value(3, &[i.0 as usize, r.0 as usize])
    }
    pub fn sum3(&self, i: SuperSectorId, r: SuperRegionId) -> f64 {
        self.sum(3, &[i.0 as usize, r.0 as usize])
    }
    pub fn value4(&self, i: SubSectorId, r: SubRegionId) -> f64 {
        self.value(4, &[i.0 as usize, r.0 as usize])
    }
    pub fn sum4(&self, i: SuperSectorId, r: SuperRegionId) -> f64 {
        self.sum(4, &[i.0 as usize, r.0 as usize])
    }
    pub fn value5(&self, i: SubSectorId, s: SuperRegionId) -> f64 {
        self.value(5, &[i.0 as usize, s.0 as usize])
    }
    pub fn value6(&self, j: SuperSectorId, s: SubRegionId) -> f64 {
        self.value(6, &[j.0 as usize, s.0 as usize])
    }
    pub fn value7(&self, i: SubSectorId, s: SubRegionId) -> f64 {
        self.value(7, &[i.0 as usize, s.0 as usize])
    }
    pub fn value8(&self, i: SubSectorId, r: SubRegionId) -> f64 {
        self.value(8, &[i.0 as usize, r.0 as usize])
    }
    pub fn value9(&self, i: SubSectorId, j: SuperSectorId, s: SuperRegionId) -> f64 {
        self.value(9, &[i.0 as usize, j.0 as usize, s.0 as usize])
    }
    pub fn value10(&self, j: SuperSectorId, s: SuperRegionId, r: SubRegionId) -> f64 {
        self.value(10, &[j.0 as usize, s.0 as usize, r.0 as usize])
    }
    pub fn value11(&self, i: SubSectorId, j: SubSectorId, s: SubRegionId) -> f64 {
        self.value(11, &[i.0 as usize, j.0 as usize, s.0 as usize])
    }
    pub fn value12(&self, i: SubSectorId, r: SubRegionId, s: SuperRegionId) -> f64 {
        self.value(12, &[i.0 as usize, r.0 as usize, s.0 as usize])
    }
    pub fn value13(&self, j: SuperSectorId, i: SubSectorId, s: SubRegionId) -> f64 {
        self.value(13, &[j.0 as usize, i.0 as usize, s.0 as usize])
    }
    pub fn value14(&self, i: SubSectorId, r: SubRegionId, s: SubRegionId) -> f64 {
        self.value(14, &[i.0 as usize, r.0 as usize, s.0 as usize])
    }
    pub fn value18(&self, i: SubSectorId, r: SubRegionId, j: SubSectorId, s: SubRegionId) -> f64 {
        self.value(18, &[i.0 as usize, r.0 as usize, j.0 as usize, s.0 as usize])
    }
}

fn resolve_axis_name(index_set: &IndexSet, axis: Axis, name: &str) -> Result<usize, crate::error::MrioError> {
    Ok(match axis {
        Axis::SubSector => {
            let id = index_set
                .subsector_by_name(name)
                .ok_or_else(|| crate::error::IndexError::UnknownSector(name.to_string()))?;
            id.0 as usize
        }
        Axis::SubRegion => {
            let id = index_set
                .subregion_by_name(name)
                .ok_or_else(|| crate::error::IndexError::UnknownRegion(name.to_string()))?;
            id.0 as usize
        }
        Axis::SuperSector => index_set.sector_by_name(name)?.0 as usize,
        Axis::SuperRegion => index_set.region_by_name(name)?.0 as usize,
    })
}

/// Fills every non-explicit cell of `parent_grid` by summing `value_grid`
/// over the children sharing that parent on each sub-axis. Cells explicitly
/// supplied in the file are left untouched (decided open question: explicit
/// wins, applied per-parent).
fn fill_computed_parent_sums(
    index_set: &IndexSet,
    signature: &[Axis],
    value_grid: &Grid,
    parent_grid: &mut Grid,
    explicit: &[bool],
) {
    let mut computed = vec![0.0f64; parent_grid.data.len()];
    let mut touched = vec![false; parent_grid.data.len()];

    let total: usize = value_grid.dims.iter().product();
    let mut coords = vec![0usize; value_grid.dims.len()];
    for flat in 0..total {
        let mut rem = flat;
        for d in (0..value_grid.dims.len()).rev() {
            coords[d] = rem % value_grid.dims[d];
            rem /= value_grid.dims[d];
        }
        let v = value_grid.get(&coords);
        if v.is_nan() {
            continue;
        }
        let p_coords: Vec<usize> = signature
            .iter()
            .zip(&coords)
            .map(|(axis, &c)| parent_coord(index_set, *axis, c))
            .collect();
        let lin = parent_grid.linear(&p_coords);
        computed[lin] += v;
        touched[lin] = true;
    }

    for (i, slot) in parent_grid.data.iter_mut().enumerate() {
        if !explicit[i] && touched[i] {
            *slot = computed[i];
        }
    }
}
