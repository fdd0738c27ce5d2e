//! The hierarchical index set (component C1).
//!
//! Maps every stored `(sector, region)` pair -- expanded to the cartesian
//! product of its leaves once either side has been split -- to a dense,
//! contiguous row/column index usable by [`crate::table::Table`].

use std::collections::HashMap;

use crate::entities::{
    RegionId, SectorId, SubRegion, SubRegionId, SubSector, SubSectorId, SuperRegion,
    SuperRegionId, SuperSector, SuperSectorId,
};
use crate::error::IndexError;

/// The hierarchical index set.
#[derive(Clone, Debug)]
pub struct IndexSet {
    supersectors: Vec<SuperSector>,
    subsectors: Vec<SubSector>,
    superregions: Vec<SuperRegion>,
    subregions: Vec<SubRegion>,

    sector_names: HashMap<String, SuperSectorId>,
    region_names: HashMap<String, SuperRegionId>,
    subsector_names: HashMap<String, SubSectorId>,
    subregion_names: HashMap<String, SubRegionId>,

    /// Dense lookup: `indices[sector.total_index() * total_regions_count + region.total_index()] -> leaf index`.
    indices: Vec<i64>,
    total_sectors_count: usize,
    total_regions_count: usize,
    size: usize,

    /// Snapshot of `indices`, addressed by `level_index`, frozen at the end
    /// of the load phase (before any split). Used to address the original
    /// base table from any later leaf.
    base_indices: Vec<i64>,
    base_super_sectors_count: usize,
    base_super_regions_count: usize,
    base_frozen: bool,
    /// Every (super-sector, super-region, dense base index) triple as it
    /// stood right after `finalize_load`, before any split. Used to walk the
    /// base table by marginal (wildcard) selectors in `adjust`.
    base_pairs: Vec<(SuperSectorId, SuperRegionId, usize)>,

    /// Set once any split has been applied; blocks further `add_sector`/
    /// `add_region` calls per the "splits finalized" invariant.
    any_split_applied: bool,
}

impl IndexSet {
    pub fn new() -> Self {
        IndexSet {
            supersectors: Vec::new(),
            subsectors: Vec::new(),
            superregions: Vec::new(),
            subregions: Vec::new(),
            sector_names: HashMap::new(),
            region_names: HashMap::new(),
            subsector_names: HashMap::new(),
            subregion_names: HashMap::new(),
            indices: Vec::new(),
            total_sectors_count: 0,
            total_regions_count: 0,
            size: 0,
            base_indices: Vec::new(),
            base_super_sectors_count: 0,
            base_super_regions_count: 0,
            base_frozen: false,
            base_pairs: Vec::new(),
            any_split_applied: false,
        }
    }

    // ---- load phase -----------------------------------------------------

    pub fn add_sector(&mut self, name: &str) -> Result<SuperSectorId, IndexError> {
        if let Some(&id) = self.sector_names.get(name) {
            return Ok(id);
        }
        if self.any_split_applied {
            return Err(IndexError::SectorAlreadySplit(name.to_string()));
        }
        let id = SuperSectorId(self.supersectors.len() as u32);
        self.supersectors.push(SuperSector {
            name: name.to_string(),
            subs: Vec::new(),
            regions: Vec::new(),
        });
        self.sector_names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn add_region(&mut self, name: &str) -> Result<SuperRegionId, IndexError> {
        if let Some(&id) = self.region_names.get(name) {
            return Ok(id);
        }
        if self.any_split_applied {
            return Err(IndexError::RegionAlreadySplit(name.to_string()));
        }
        let id = SuperRegionId(self.superregions.len() as u32);
        self.superregions.push(SuperRegion {
            name: name.to_string(),
            subs: Vec::new(),
            sectors: Vec::new(),
        });
        self.region_names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn add_index(&mut self, sector: SuperSectorId, region: SuperRegionId) -> Result<(), IndexError> {
        let sector_name = self.supersectors[sector.0 as usize].name.clone();
        let region_name = self.superregions[region.0 as usize].name.clone();
        if self.superregions[region.0 as usize].sectors.contains(&sector) {
            return Err(IndexError::DuplicateIndex(sector_name, region_name));
        }
        self.superregions[region.0 as usize].sectors.push(sector);
        self.supersectors[sector.0 as usize].regions.push(region);
        Ok(())
    }

    /// Ends the load phase: builds the initial dense lookup and freezes the
    /// base (pre-split) addressing used by `basesum`.
    pub fn finalize_load(&mut self) {
        self.rebuild_indices();
        self.base_indices = self.indices.clone();
        self.base_super_sectors_count = self.supersectors.len();
        self.base_super_regions_count = self.superregions.len();
        self.base_pairs = self
            .iterate_total()
            .into_iter()
            .map(|(s, r, idx)| match (s, r) {
                (SectorId::Super(s), RegionId::Super(r)) => (s, r, idx),
                _ => unreachable!("finalize_load runs before any split"),
            })
            .collect();
        self.base_frozen = true;
    }

    /// Every base (super-sector, super-region, dense-index) triple, frozen
    /// before any split was applied.
    pub fn base_pairs(&self) -> &[(SuperSectorId, SuperRegionId, usize)] {
        &self.base_pairs
    }

    // ---- lookups ----------------------------------------------------------

    pub fn sector_by_name(&self, name: &str) -> Result<SuperSectorId, IndexError> {
        self.sector_names
            .get(name)
            .copied()
            .ok_or_else(|| IndexError::UnknownSector(name.to_string()))
    }

    pub fn region_by_name(&self, name: &str) -> Result<SuperRegionId, IndexError> {
        self.region_names
            .get(name)
            .copied()
            .ok_or_else(|| IndexError::UnknownRegion(name.to_string()))
    }

    pub fn subsector_by_name(&self, name: &str) -> Option<SubSectorId> {
        self.subsector_names.get(name).copied()
    }

    pub fn subregion_by_name(&self, name: &str) -> Option<SubRegionId> {
        self.subregion_names.get(name).copied()
    }

    pub fn supersector(&self, id: SuperSectorId) -> &SuperSector {
        &self.supersectors[id.0 as usize]
    }

    pub fn subsector(&self, id: SubSectorId) -> &SubSector {
        &self.subsectors[id.0 as usize]
    }

    pub fn superregion(&self, id: SuperRegionId) -> &SuperRegion {
        &self.superregions[id.0 as usize]
    }

    pub fn subregion(&self, id: SubRegionId) -> &SubRegion {
        &self.subregions[id.0 as usize]
    }

    pub fn num_supersectors(&self) -> usize {
        self.supersectors.len()
    }

    pub fn num_superregions(&self) -> usize {
        self.superregions.len()
    }

    pub fn num_subsectors(&self) -> usize {
        self.subsectors.len()
    }

    pub fn num_subregions(&self) -> usize {
        self.subregions.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Sector-leaves of an entity: its subs if split, else itself.
    pub fn sector_leaves(&self, sector: SuperSectorId) -> Vec<SectorId> {
        let s = self.supersector(sector);
        if s.subs.is_empty() {
            vec![SectorId::Super(sector)]
        } else {
            s.subs.iter().copied().map(SectorId::Sub).collect()
        }
    }

    /// Region-leaves of an entity: its subs if split, else itself.
    pub fn region_leaves(&self, region: SuperRegionId) -> Vec<RegionId> {
        let r = self.superregion(region);
        if r.subs.is_empty() {
            vec![RegionId::Super(region)]
        } else {
            r.subs.iter().copied().map(RegionId::Sub).collect()
        }
    }

    pub fn sector_name(&self, id: SectorId) -> &str {
        match id {
            SectorId::Super(s) => &self.supersector(s).name,
            SectorId::Sub(s) => &self.subsector(s).name,
        }
    }

    pub fn region_name(&self, id: RegionId) -> &str {
        match id {
            RegionId::Super(r) => &self.superregion(r).name,
            RegionId::Sub(r) => &self.subregion(r).name,
        }
    }

    pub fn sector_super(&self, id: SectorId) -> SuperSectorId {
        match id {
            SectorId::Super(s) => s,
            SectorId::Sub(s) => self.subsector(s).parent,
        }
    }

    pub fn region_super(&self, id: RegionId) -> SuperRegionId {
        match id {
            RegionId::Super(r) => r,
            RegionId::Sub(r) => self.subregion(r).parent,
        }
    }

    // ---- total-index bookkeeping -------------------------------------

    /// Start offset (in the hypothetical fully-flattened listing) of every
    /// super sector, plus a trailing total count.
    fn sector_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.supersectors.len() + 1);
        let mut running = 0usize;
        for s in &self.supersectors {
            offsets.push(running);
            running += s.subs.len().max(1);
        }
        offsets.push(running);
        offsets
    }

    fn region_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.superregions.len() + 1);
        let mut running = 0usize;
        for r in &self.superregions {
            offsets.push(running);
            running += r.subs.len().max(1);
        }
        offsets.push(running);
        offsets
    }

    fn sector_total_index(&self, id: SectorId, sector_offsets: &[usize]) -> usize {
        match id {
            SectorId::Super(s) => sector_offsets[s.0 as usize],
            SectorId::Sub(s) => {
                let sub = self.subsector(s);
                sector_offsets[sub.parent.0 as usize] + sub.pos
            }
        }
    }

    fn region_total_index(&self, id: RegionId, region_offsets: &[usize]) -> usize {
        match id {
            RegionId::Super(r) => region_offsets[r.0 as usize],
            RegionId::Sub(r) => {
                let sub = self.subregion(r);
                region_offsets[sub.parent.0 as usize] + sub.pos
            }
        }
    }

    /// Rebuilds the dense `indices` lookup. Must be called after every
    /// structural change (initial load, each split).
    pub fn rebuild_indices(&mut self) {
        let sector_offsets = self.sector_offsets();
        let region_offsets = self.region_offsets();
        self.total_sectors_count = *sector_offsets.last().unwrap();
        self.total_regions_count = *region_offsets.last().unwrap();

        self.indices = vec![-1; self.total_sectors_count * self.total_regions_count];

        let mut next = 0i64;
        for region in &self.superregions {
            let region_leaves = if region.subs.is_empty() {
                vec![RegionId::Super(self.region_by_name(&region.name).unwrap())]
            } else {
                region.subs.iter().copied().map(RegionId::Sub).collect()
            };
            for r_leaf in region_leaves {
                for &sector_id in &region.sectors {
                    let sector = self.supersector(sector_id);
                    let sector_leaves = if sector.subs.is_empty() {
                        vec![SectorId::Super(sector_id)]
                    } else {
                        sector.subs.iter().copied().map(SectorId::Sub).collect()
                    };
                    for s_leaf in sector_leaves {
                        let si = self.sector_total_index(s_leaf, &sector_offsets);
                        let ri = self.region_total_index(r_leaf, &region_offsets);
                        let key = si * self.total_regions_count + ri;
                        self.indices[key] = next;
                        next += 1;
                    }
                }
            }
        }
        self.size = next as usize;
    }

    /// Dense row/column index of a stored leaf pair, or `None` if absent.
    pub fn at(&self, sector: SectorId, region: RegionId) -> Option<usize> {
        let sector_offsets = self.sector_offsets();
        let region_offsets = self.region_offsets();
        let si = self.sector_total_index(sector, &sector_offsets);
        let ri = self.region_total_index(region, &region_offsets);
        let key = si * self.total_regions_count + ri;
        match self.indices.get(key) {
            Some(&v) if v >= 0 => Some(v as usize),
            _ => None,
        }
    }

    /// Index into the original (pre-split) base table for any leaf pair.
    pub fn base_at(&self, sector: SectorId, region: RegionId) -> Option<usize> {
        debug_assert!(self.base_frozen, "finalize_load() was never called");
        self.base_at_super(self.sector_super(sector), self.region_super(region))
    }

    /// Index into the original base table addressed directly by super ids.
    pub fn base_at_super(&self, sector: SuperSectorId, region: SuperRegionId) -> Option<usize> {
        debug_assert!(self.base_frozen, "finalize_load() was never called");
        let key = sector.0 as usize * self.base_super_regions_count + region.0 as usize;
        match self.base_indices.get(key) {
            Some(&v) if v >= 0 => Some(v as usize),
            _ => None,
        }
    }

    pub fn base_super_sectors_count(&self) -> usize {
        self.base_super_sectors_count
    }

    pub fn base_super_regions_count(&self) -> usize {
        self.base_super_regions_count
    }

    /// Every leaf `(sector, region)` pair actually stored, with its dense
    /// index. Iteration order matches the canonical dense-index order.
    pub fn iterate_total(&self) -> Vec<(SectorId, RegionId, usize)> {
        let mut out = Vec::with_capacity(self.size);
        for region in &self.superregions {
            let region_id = self.region_by_name(&region.name).unwrap();
            let region_leaves = self.region_leaves(region_id);
            for r_leaf in region_leaves {
                for &sector_id in &region.sectors {
                    let sector_leaves = self.sector_leaves(sector_id);
                    for s_leaf in sector_leaves {
                        if let Some(idx) = self.at(s_leaf, r_leaf) {
                            out.push((s_leaf, r_leaf, idx));
                        }
                    }
                }
            }
        }
        out
    }

    /// Every stored `(super-sector, super-region)` pair.
    pub fn iterate_super(&self) -> Vec<(SuperSectorId, SuperRegionId)> {
        let mut out = Vec::new();
        for (ridx, region) in self.superregions.iter().enumerate() {
            for &sector_id in &region.sectors {
                out.push((sector_id, SuperRegionId(ridx as u32)));
            }
        }
        out
    }

    // ---- split phase ------------------------------------------------------

    /// Splits `name` into the given subsectors and rebuilds the dense index.
    pub fn insert_subsectors(&mut self, name: &str, names: &[String]) -> Result<(), IndexError> {
        let id = self.sector_by_name(name).map_err(|err| {
            if self.subsector_by_name(name).is_some() {
                IndexError::NotASuperSector(name.to_string())
            } else {
                err
            }
        })?;
        let sector = &self.supersectors[id.0 as usize];
        if sector.has_sub() {
            return Err(IndexError::SectorAlreadySplit(name.to_string()));
        }
        let mut new_ids = Vec::with_capacity(names.len());
        for (pos, sub_name) in names.iter().enumerate() {
            let sub_id = SubSectorId(self.subsectors.len() as u32);
            self.subsectors.push(SubSector {
                name: sub_name.clone(),
                parent: id,
                pos,
            });
            self.subsector_names.insert(sub_name.clone(), sub_id);
            new_ids.push(sub_id);
        }
        self.supersectors[id.0 as usize].subs = new_ids;
        self.any_split_applied = true;
        self.rebuild_indices();
        Ok(())
    }

    /// Splits `name` into the given subregions and rebuilds the dense index.
    pub fn insert_subregions(&mut self, name: &str, names: &[String]) -> Result<(), IndexError> {
        let id = self.region_by_name(name).map_err(|err| {
            if self.subregion_by_name(name).is_some() {
                IndexError::NotASuperRegion(name.to_string())
            } else {
                err
            }
        })?;
        let region = &self.superregions[id.0 as usize];
        if region.has_sub() {
            return Err(IndexError::RegionAlreadySplit(name.to_string()));
        }
        let mut new_ids = Vec::with_capacity(names.len());
        for (pos, sub_name) in names.iter().enumerate() {
            let sub_id = SubRegionId(self.subregions.len() as u32);
            self.subregions.push(SubRegion {
                name: sub_name.clone(),
                parent: id,
                pos,
            });
            self.subregion_names.insert(sub_name.clone(), sub_id);
            new_ids.push(sub_id);
        }
        self.superregions[id.0 as usize].subs = new_ids;
        self.any_split_applied = true;
        self.rebuild_indices();
        Ok(())
    }
}

impl Default for IndexSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_index_set() -> IndexSet {
        let mut idx = IndexSet::new();
        let s = idx.add_sector("S").unwrap();
        let a = idx.add_region("A").unwrap();
        let b = idx.add_region("B").unwrap();
        idx.add_index(s, a).unwrap();
        idx.add_index(s, b).unwrap();
        idx.finalize_load();
        idx
    }

    #[test]
    fn finalize_load_builds_dense_lookup() {
        let idx = simple_index_set();
        assert_eq!(idx.size(), 2);
        let s = idx.sector_by_name("S").unwrap();
        let a = idx.region_by_name("A").unwrap();
        let b = idx.region_by_name("B").unwrap();
        assert_eq!(idx.at(SectorId::Super(s), RegionId::Super(a)), Some(0));
        assert_eq!(idx.at(SectorId::Super(s), RegionId::Super(b)), Some(1));
    }

    #[test]
    fn missing_pair_is_absent() {
        let mut idx = IndexSet::new();
        let s1 = idx.add_sector("S1").unwrap();
        idx.add_sector("S2").unwrap();
        let a = idx.add_region("A").unwrap();
        idx.add_index(s1, a).unwrap();
        idx.finalize_load();

        let s2 = idx.sector_by_name("S2").unwrap();
        assert_eq!(idx.at(SectorId::Super(s2), RegionId::Super(a)), None);
    }

    #[test]
    fn duplicate_index_rejected() {
        let mut idx = IndexSet::new();
        let s = idx.add_sector("S").unwrap();
        let a = idx.add_region("A").unwrap();
        idx.add_index(s, a).unwrap();
        assert!(idx.add_index(s, a).is_err());
    }

    #[test]
    fn split_expands_dense_index() {
        let mut idx = simple_index_set();
        idx.insert_subregions("A", &["A1".to_string(), "A2".to_string()])
            .unwrap();
        assert_eq!(idx.size(), 3); // A1,B ; A2,B -- wait region B unaffected, A -> A1,A2
    }

    #[test]
    fn split_already_split_fails() {
        let mut idx = simple_index_set();
        idx.insert_subregions("A", &["A1".to_string(), "A2".to_string()])
            .unwrap();
        assert!(idx
            .insert_subregions("A", &["A3".to_string()])
            .is_err());
    }

    #[test]
    fn split_unknown_name_reports_unknown() {
        let mut idx = simple_index_set();
        let err = idx.insert_subregions("Nowhere", &["X".to_string()]).unwrap_err();
        assert!(matches!(err, IndexError::UnknownRegion(_)));

        let err = idx.insert_subsectors("Nowhere", &["X".to_string()]).unwrap_err();
        assert!(matches!(err, IndexError::UnknownSector(_)));
    }

    #[test]
    fn split_on_existing_sub_reports_not_a_super() {
        let mut idx = simple_index_set();
        idx.insert_subregions("A", &["A1".to_string(), "A2".to_string()])
            .unwrap();

        let err = idx.insert_subregions("A1", &["A1a".to_string()]).unwrap_err();
        assert!(matches!(err, IndexError::NotASuperRegion(n) if n == "A1"));

        idx.insert_subsectors("S", &["S1".to_string(), "S2".to_string()])
            .unwrap();
        let err = idx.insert_subsectors("S1", &["S1a".to_string()]).unwrap_err();
        assert!(matches!(err, IndexError::NotASuperSector(n) if n == "S1"));
    }

    #[test]
    fn add_sector_after_split_fails() {
        let mut idx = simple_index_set();
        idx.insert_subregions("A", &["A1".to_string(), "A2".to_string()])
            .unwrap();
        assert!(idx.add_sector("NewSector").is_err());
    }

    #[test]
    fn base_at_resolves_through_split() {
        let mut idx = simple_index_set();
        let s = idx.sector_by_name("S").unwrap();
        let a = idx.region_by_name("A").unwrap();
        idx.insert_subregions("A", &["A1".to_string(), "A2".to_string()])
            .unwrap();
        let a1 = idx.superregion(a).subs[0];
        let base_a = idx.base_at(SectorId::Super(s), RegionId::Super(a)).unwrap();
        let base_a1 = idx.base_at(SectorId::Super(s), RegionId::Sub(a1)).unwrap();
        assert_eq!(base_a, base_a1);
    }
}
