//! Dense square flow table over an [`IndexSet`] (component C2).
//!
//! A `Table<T>` holds one value per `(origin, destination)` pair of leaf
//! `(sector, region)` endpoints, where both endpoints are addressed by the
//! *same* [`IndexSet`]: `table[row(i_sector,i_region), col(j_sector,j_region)]`.
//! Splitting a sector or region enlarges the table: every row/column that
//! belonged to the split entity is replicated across its new leaves, scaled
//! by `1 / S` so the super-cell sum (and, transitively, the frozen base sum)
//! is conserved.

use crate::entities::{RegionId, SectorId, SuperRegionId, SuperSectorId};
use crate::index_set::IndexSet;

/// A dense N×N table of values addressed by leaf `(sector, region)` endpoints
/// on both axes, `N = index_set.size()`.
#[derive(Clone, Debug)]
pub struct Table<T> {
    values: Vec<T>,
    n: usize,
}

impl<T: Copy + Default> Table<T> {
    /// Builds an `N×N` table over the current size of `index_set`, all
    /// default-initialized (zero for `f64`, zero for `u8`).
    pub fn zeros(index_set: &IndexSet) -> Self {
        let n = index_set.size();
        Table {
            values: vec![T::default(); n * n],
            n,
        }
    }

    pub fn from_values(values: Vec<T>, n: usize) -> Self {
        assert_eq!(values.len(), n * n);
        Table { values, n }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn raw(&self) -> &[T] {
        &self.values
    }

    pub fn raw_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    fn cell(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.n && col < self.n);
        row * self.n + col
    }

    pub fn get_raw(&self, cell: usize) -> T {
        self.values[cell]
    }

    pub fn set_raw(&mut self, cell: usize, value: T) {
        self.values[cell] = value;
    }

    /// Element access by leaf identity on both axes. Returns the default
    /// value if either endpoint is absent from `index_set`.
    pub fn at(
        &self,
        index_set: &IndexSet,
        i_sector: SectorId,
        i_region: RegionId,
        j_sector: SectorId,
        j_region: RegionId,
    ) -> T {
        match (
            index_set.at(i_sector, i_region),
            index_set.at(j_sector, j_region),
        ) {
            (Some(row), Some(col)) => self.values[self.cell(row, col)],
            _ => T::default(),
        }
    }

    pub fn set(
        &mut self,
        index_set: &IndexSet,
        i_sector: SectorId,
        i_region: RegionId,
        j_sector: SectorId,
        j_region: RegionId,
        value: T,
    ) {
        if let (Some(row), Some(col)) = (
            index_set.at(i_sector, i_region),
            index_set.at(j_sector, j_region),
        ) {
            let cell = self.cell(row, col);
            self.values[cell] = value;
        }
    }
}

/// Selector for one sector axis of a hierarchical sum: match every stored
/// leaf (`All`), every leaf under a given super (`Super`), or exactly one
/// leaf (`Leaf`).
#[derive(Clone, Copy, Debug)]
pub enum SectorSel {
    All,
    Super(SuperSectorId),
    Leaf(SectorId),
}

/// Selector for one region axis, symmetric to [`SectorSel`].
#[derive(Clone, Copy, Debug)]
pub enum RegionSel {
    All,
    Super(SuperRegionId),
    Leaf(RegionId),
}

/// Selector for one axis of a base-table (pre-split, super-only) sum.
#[derive(Clone, Copy, Debug)]
pub enum BaseSel<T> {
    All,
    Fixed(T),
}

impl Table<f64> {
    fn sector_matches(index_set: &IndexSet, leaf: SectorId, sel: SectorSel) -> bool {
        match sel {
            SectorSel::All => true,
            SectorSel::Super(sup) => index_set.sector_super(leaf) == sup,
            SectorSel::Leaf(l) => leaf == l,
        }
    }

    fn region_matches(index_set: &IndexSet, leaf: RegionId, sel: RegionSel) -> bool {
        match sel {
            RegionSel::All => true,
            RegionSel::Super(sup) => index_set.region_super(leaf) == sup,
            RegionSel::Leaf(l) => leaf == l,
        }
    }

    /// Hierarchical sum over every stored leaf pair matching the four axis
    /// selectors, using a precomputed snapshot of `index_set.iterate_total()`
    /// so the engine can reuse one snapshot across many calls within a
    /// single refinement level instead of rebuilding it per call.
    #[allow(clippy::too_many_arguments)]
    pub fn sum_keyed(
        &self,
        index_set: &IndexSet,
        leaves: &[(SectorId, RegionId, usize)],
        i_sector: SectorSel,
        i_region: RegionSel,
        j_sector: SectorSel,
        j_region: RegionSel,
    ) -> f64 {
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        for &(s, r, idx) in leaves {
            if Self::sector_matches(index_set, s, i_sector) && Self::region_matches(index_set, r, i_region) {
                rows.push(idx);
            }
            if Self::sector_matches(index_set, s, j_sector) && Self::region_matches(index_set, r, j_region) {
                cols.push(idx);
            }
        }
        let mut total = 0.0;
        for &row in &rows {
            for &col in &cols {
                total += self.values[row * self.n + col];
            }
        }
        total
    }

    /// Hierarchical sum over every leaf combination whose super-ancestors
    /// match the given super ids on each axis, rebuilding the leaf snapshot
    /// internally. Convenience wrapper over [`Table::sum_keyed`] for callers
    /// outside the engine's hot loop.
    #[allow(clippy::too_many_arguments)]
    pub fn sum(
        &self,
        index_set: &IndexSet,
        i_sector: SuperSectorId,
        i_region: SuperRegionId,
        j_sector: SuperSectorId,
        j_region: SuperRegionId,
    ) -> f64 {
        let leaves = index_set.iterate_total();
        self.sum_keyed(
            index_set,
            &leaves,
            SectorSel::Super(i_sector),
            RegionSel::Super(i_region),
            SectorSel::Super(j_sector),
            RegionSel::Super(j_region),
        )
    }

    /// Sum read from the frozen base (pre-split) table, matching the four
    /// axis selectors against `index_set.base_pairs()`.
    #[allow(clippy::too_many_arguments)]
    pub fn basesum_keyed(
        &self,
        base_pairs: &[(SuperSectorId, SuperRegionId, usize)],
        i_sector: BaseSel<SuperSectorId>,
        i_region: BaseSel<SuperRegionId>,
        j_sector: BaseSel<SuperSectorId>,
        j_region: BaseSel<SuperRegionId>,
    ) -> f64 {
        let matches_sector = |s: SuperSectorId, sel: BaseSel<SuperSectorId>| match sel {
            BaseSel::All => true,
            BaseSel::Fixed(f) => s == f,
        };
        let matches_region = |r: SuperRegionId, sel: BaseSel<SuperRegionId>| match sel {
            BaseSel::All => true,
            BaseSel::Fixed(f) => r == f,
        };
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        for &(s, r, idx) in base_pairs {
            if matches_sector(s, i_sector) && matches_region(r, i_region) {
                rows.push(idx);
            }
            if matches_sector(s, j_sector) && matches_region(r, j_region) {
                cols.push(idx);
            }
        }
        let mut total = 0.0;
        for &row in &rows {
            for &col in &cols {
                total += self.values[row * self.n + col];
            }
        }
        total
    }

    /// Sum read from the frozen base (pre-split) table at the super-cell
    /// addressed directly by the four super ids -- the original, unrefined
    /// flow between two super (sector, region) pairs.
    #[allow(clippy::too_many_arguments)]
    pub fn basesum(
        &self,
        index_set: &IndexSet,
        base: &Table<f64>,
        i_sector: SuperSectorId,
        i_region: SuperRegionId,
        j_sector: SuperSectorId,
        j_region: SuperRegionId,
    ) -> f64 {
        match (
            index_set.base_at_super(i_sector, i_region),
            index_set.base_at_super(j_sector, j_region),
        ) {
            (Some(row), Some(col)) => base.get_raw(row * base.n + col),
            _ => 0.0,
        }
    }

    /// Expands the table for a sector split: every row/column that belonged
    /// to the split sector is replicated across its new subsectors, each
    /// holding `1/S` of the original value (by `S²` where both row and
    /// column fall inside the split sector). `old_leaves` is the snapshot of
    /// `index_set.iterate_total()` taken *before*
    /// `index_set.insert_subsectors` mutated the index set; `old` is the
    /// table over that prior index set.
    pub fn expand_for_sector_split(
        old_leaves: &[(SectorId, RegionId, usize)],
        old: &Table<f64>,
        new_index_set: &IndexSet,
        split_sector: SuperSectorId,
        num_subs: usize,
    ) -> Self {
        let new_n = new_index_set.size();
        let mut values = vec![0.0; new_n * new_n];

        let row_targets = |sector: SectorId, region: RegionId| -> Vec<usize> {
            if !sector.is_sub() && new_index_set.sector_super(sector) == split_sector {
                new_index_set
                    .sector_leaves(split_sector)
                    .into_iter()
                    .filter_map(|s| new_index_set.at(s, region))
                    .collect()
            } else {
                new_index_set.at(sector, region).into_iter().collect()
            }
        };

        for &(i_sector, i_region, old_row) in old_leaves {
            for &(j_sector, j_region, old_col) in old_leaves {
                let old_value = old.get_raw(old_row * old.n + old_col);
                if old_value == 0.0 {
                    continue;
                }
                let i_split = !i_sector.is_sub() && new_index_set.sector_super(i_sector) == split_sector;
                let j_split = !j_sector.is_sub() && new_index_set.sector_super(j_sector) == split_sector;
                let scale = match (i_split, j_split) {
                    (true, true) => 1.0 / (num_subs * num_subs) as f64,
                    (true, false) | (false, true) => 1.0 / num_subs as f64,
                    (false, false) => 1.0,
                };
                for new_row in row_targets(i_sector, i_region) {
                    for new_col in row_targets(j_sector, j_region) {
                        values[new_row * new_n + new_col] = old_value * scale;
                    }
                }
            }
        }
        Table { values, n: new_n }
    }

    /// Expands the table for a region split, symmetric to
    /// [`Table::expand_for_sector_split`].
    pub fn expand_for_region_split(
        old_leaves: &[(SectorId, RegionId, usize)],
        old: &Table<f64>,
        new_index_set: &IndexSet,
        split_region: SuperRegionId,
        num_subs: usize,
    ) -> Self {
        let new_n = new_index_set.size();
        let mut values = vec![0.0; new_n * new_n];

        let col_targets = |sector: SectorId, region: RegionId| -> Vec<usize> {
            if !region.is_sub() && new_index_set.region_super(region) == split_region {
                new_index_set
                    .region_leaves(split_region)
                    .into_iter()
                    .filter_map(|r| new_index_set.at(sector, r))
                    .collect()
            } else {
                new_index_set.at(sector, region).into_iter().collect()
            }
        };

        for &(i_sector, i_region, old_row) in old_leaves {
            for &(j_sector, j_region, old_col) in old_leaves {
                let old_value = old.get_raw(old_row * old.n + old_col);
                if old_value == 0.0 {
                    continue;
                }
                let i_split = !i_region.is_sub() && new_index_set.region_super(i_region) == split_region;
                let j_split = !j_region.is_sub() && new_index_set.region_super(j_region) == split_region;
                let scale = match (i_split, j_split) {
                    (true, true) => 1.0 / (num_subs * num_subs) as f64,
                    (true, false) | (false, true) => 1.0 / num_subs as f64,
                    (false, false) => 1.0,
                };
                for new_row in col_targets(i_sector, i_region) {
                    for new_col in col_targets(j_sector, j_region) {
                        values[new_row * new_n + new_col] = old_value * scale;
                    }
                }
            }
        }
        Table { values, n: new_n }
    }
}
