//! Level-ordered refinement engine (component C4).
//!
//! Applies the eighteen fixed proxy levels in order. Each applicable level
//! first produces candidate leaf values from the proxies and the previous
//! iteration's table (`approximate`), then rescales them so every super-cell
//! with a positive base value keeps its original sum (`adjust`).

use tracing::{debug, trace};

use crate::entities::{RegionId, SectorId, SubRegionId, SubSectorId, SuperRegionId, SuperSectorId};
use crate::index_set::IndexSet;
use crate::proxy::ProxyStore;
use crate::table::{BaseSel, RegionSel, SectorSel, Table};

fn sub_sector(id: SectorId) -> SubSectorId {
    match id {
        SectorId::Sub(s) => s,
        SectorId::Super(_) => unreachable!("caller must gate on is_sub() first"),
    }
}

fn sub_region(id: RegionId) -> SubRegionId {
    match id {
        RegionId::Sub(r) => r,
        RegionId::Super(_) => unreachable!("caller must gate on is_sub() first"),
    }
}

/// Drives the level 1..18 refinement of a working [`Table`] in place.
pub struct Disaggregation<'a> {
    index_set: &'a IndexSet,
    proxies: &'a ProxyStore,
    base: &'a Table<f64>,
    table: Table<f64>,
    quality: Table<u8>,
}

impl<'a> Disaggregation<'a> {
    /// `table` is the working table, already expanded to the final index set
    /// by the splits; `base` is the frozen pre-split table.
    pub fn new(index_set: &'a IndexSet, proxies: &'a ProxyStore, base: &'a Table<f64>, table: Table<f64>) -> Self {
        let quality = Table::zeros(index_set);
        Disaggregation {
            index_set,
            proxies,
            base,
            table,
            quality,
        }
    }

    pub fn table(&self) -> &Table<f64> {
        &self.table
    }

    pub fn quality(&self) -> &Table<u8> {
        &self.quality
    }

    pub fn into_table(self) -> Table<f64> {
        self.table
    }

    fn applicable(&self, d: u8) -> bool {
        match d {
            15 => self.proxies.is_present(5) && self.proxies.is_present(9) && self.proxies.is_present(12),
            16 => self.proxies.is_present(6) && self.proxies.is_present(10) && self.proxies.is_present(13),
            17 => self.proxies.is_present(7) && self.proxies.is_present(11) && self.proxies.is_present(14),
            _ => self.proxies.is_present(d),
        }
    }

    /// Runs the full level 1..18 refinement, each applicable level followed
    /// by its `adjust` normalization pass.
    pub fn refine(&mut self) {
        for d in 1..=18u8 {
            if !self.applicable(d) {
                trace!(level = d, "skipping level: proxies not present");
                continue;
            }
            debug!(level = d, "applying refinement level");
            let last = self.table.clone();
            let leaves = self.index_set.iterate_total();
            self.approximate(d, &last, &leaves);
            self.adjust(d, &leaves);
        }
    }

    /// Overwrites candidate leaf cells for level `d`, reading from `last`
    /// (the table snapshot at the start of this level) and the proxies.
    fn approximate(&mut self, d: u8, last: &Table<f64>, leaves: &[(SectorId, RegionId, usize)]) {
        let supers = self.index_set.iterate_super();
        for &(i_sector_super, i_region_super) in &supers {
            for &(j_sector_super, j_region_super) in &supers {
                for i_sector in self.index_set.sector_leaves(i_sector_super) {
                    for i_region in self.index_set.region_leaves(i_region_super) {
                        for j_sector in self.index_set.sector_leaves(j_sector_super) {
                            for j_region in self.index_set.region_leaves(j_region_super) {
                                let Some(new_value) = self.rule(
                                    d,
                                    last,
                                    leaves,
                                    i_sector,
                                    i_region,
                                    j_sector,
                                    j_region,
                                    i_sector_super,
                                    i_region_super,
                                    j_sector_super,
                                    j_region_super,
                                ) else {
                                    continue;
                                };
                                if let (Some(row), Some(col)) =
                                    (self.index_set.at(i_sector, i_region), self.index_set.at(j_sector, j_region))
                                {
                                    let cell = row * self.table.n() + col;
                                    self.table.set_raw(cell, new_value);
                                    self.quality.set_raw(cell, d);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rule(
        &self,
        d: u8,
        last: &Table<f64>,
        leaves: &[(SectorId, RegionId, usize)],
        i: SectorId,
        r: RegionId,
        j: SectorId,
        s: RegionId,
        i_super: SuperSectorId,
        r_super: SuperRegionId,
        j_super: SuperSectorId,
        s_super: SuperRegionId,
    ) -> Option<f64> {
        let i_sub = i.is_sub();
        let r_sub = r.is_sub();
        let j_sub = j.is_sub();
        let s_sub = s.is_sub();
        let idx = self.index_set;
        let proxies = self.proxies;

        match d {
            1 | 2 => {
                if !r_sub && !s_sub {
                    return None;
                }
                let (vr, sr) = if r_sub {
                    let rr = sub_region(r);
                    let v = if d == 1 { proxies.value1(rr) } else { proxies.value2(rr) };
                    let sum = if d == 1 { proxies.sum1(r_super) } else { proxies.sum2(r_super) };
                    (v, sum)
                } else {
                    (1.0, 1.0)
                };
                let (vs, ss) = if s_sub {
                    let ss_id = sub_region(s);
                    let v = if d == 1 { proxies.value1(ss_id) } else { proxies.value2(ss_id) };
                    let sum = if d == 1 { proxies.sum1(s_super) } else { proxies.sum2(s_super) };
                    (v, sum)
                } else {
                    (1.0, 1.0)
                };
                if vr.is_nan() || sr.is_nan() || vs.is_nan() || ss.is_nan() || sr <= 0.0 || ss <= 0.0 {
                    return None;
                }
                let base = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Leaf(i),
                    RegionSel::Super(r_super),
                    SectorSel::Leaf(j),
                    RegionSel::Super(s_super),
                );
                Some(base * vr * vs / (sr * ss))
            }
            3 => {
                if !i_sub && !j_sub {
                    return None;
                }
                let (vi, si) = if i_sub {
                    (proxies.value3(sub_sector(i), r_super), proxies.sum3(i_super, r_super))
                } else {
                    (1.0, 1.0)
                };
                let (vj, sj) = if j_sub {
                    (proxies.value3(sub_sector(j), s_super), proxies.sum3(j_super, s_super))
                } else {
                    (1.0, 1.0)
                };
                if vi.is_nan() || si.is_nan() || vj.is_nan() || sj.is_nan() || si <= 0.0 || sj <= 0.0 {
                    return None;
                }
                let base = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::Leaf(r),
                    SectorSel::Super(j_super),
                    RegionSel::Leaf(s),
                );
                Some(base * vi * vj / (si * sj))
            }
            4 => {
                let ir_gated = i_sub && r_sub;
                let js_gated = j_sub && s_sub;
                if !ir_gated && !js_gated {
                    return None;
                }
                let (v_ir, s_ir) = if ir_gated {
                    (
                        proxies.value4(sub_sector(i), sub_region(r)),
                        proxies.sum4(i_super, r_super),
                    )
                } else {
                    (1.0, 1.0)
                };
                let (v_js, s_js) = if js_gated {
                    (
                        proxies.value4(sub_sector(j), sub_region(s)),
                        proxies.sum4(j_super, s_super),
                    )
                } else {
                    (1.0, 1.0)
                };
                if v_ir.is_nan() || s_ir.is_nan() || v_js.is_nan() || s_js.is_nan() || s_ir <= 0.0 || s_js <= 0.0 {
                    return None;
                }
                let base = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::Super(r_super),
                    SectorSel::Super(j_super),
                    RegionSel::Super(s_super),
                );
                Some(base * v_ir * v_js / (s_ir * s_js))
            }
            5 => {
                if !i_sub {
                    return None;
                }
                let v5 = proxies.value5(sub_sector(i), s_super);
                if v5.is_nan() {
                    return None;
                }
                let denom = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::All,
                    SectorSel::All,
                    RegionSel::Super(s_super),
                );
                if denom <= 0.0 {
                    return None;
                }
                let num = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::Leaf(r),
                    SectorSel::Leaf(j),
                    RegionSel::Leaf(s),
                );
                Some(num * v5 / denom)
            }
            6 => {
                if !s_sub {
                    return None;
                }
                let v6 = proxies.value6(i_super, sub_region(s));
                if v6.is_nan() {
                    return None;
                }
                let denom = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::All,
                    SectorSel::All,
                    RegionSel::Super(s_super),
                );
                if denom <= 0.0 {
                    return None;
                }
                let num = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Leaf(i),
                    RegionSel::Leaf(r),
                    SectorSel::Leaf(j),
                    RegionSel::Super(s_super),
                );
                Some(num * v6 / denom)
            }
            7 => {
                if !(i_sub && s_sub) {
                    return None;
                }
                let v7 = proxies.value7(sub_sector(i), sub_region(s));
                if v7.is_nan() {
                    return None;
                }
                let denom = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::All,
                    SectorSel::All,
                    RegionSel::Super(s_super),
                );
                if denom <= 0.0 {
                    return None;
                }
                let num = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::Leaf(r),
                    SectorSel::Leaf(j),
                    RegionSel::Super(s_super),
                );
                Some(num * v7 / denom)
            }
            8 => {
                if !(i_sub && r_sub) || (j_sub != s_sub) {
                    return None;
                }
                let v8 = proxies.value8(sub_sector(i), sub_region(r));
                if v8.is_nan() {
                    return None;
                }
                let base_pairs = idx.base_pairs();
                let denom = self.base.basesum_keyed(
                    base_pairs,
                    BaseSel::Fixed(i_super),
                    BaseSel::Fixed(r_super),
                    BaseSel::All,
                    BaseSel::All,
                );
                if denom <= 0.0 {
                    return None;
                }
                let num = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::Super(r_super),
                    SectorSel::Leaf(j),
                    RegionSel::Leaf(s),
                );
                Some(num * v8 / denom)
            }
            9 => {
                if !i_sub {
                    return None;
                }
                let v9 = proxies.value9(sub_sector(i), j_super, s_super);
                if v9.is_nan() {
                    return None;
                }
                let denom = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::All,
                    SectorSel::Super(j_super),
                    RegionSel::Super(s_super),
                );
                if denom <= 0.0 {
                    return None;
                }
                let num = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::Leaf(r),
                    SectorSel::Leaf(j),
                    RegionSel::Leaf(s),
                );
                Some(num * v9 / denom)
            }
            10 => {
                if !s_sub {
                    return None;
                }
                let v10 = proxies.value10(i_super, r_super, sub_region(s));
                if v10.is_nan() {
                    return None;
                }
                let denom = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::Super(r_super),
                    SectorSel::All,
                    RegionSel::Super(s_super),
                );
                if denom <= 0.0 {
                    return None;
                }
                let num = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Leaf(i),
                    RegionSel::Leaf(r),
                    SectorSel::Leaf(j),
                    RegionSel::Super(s_super),
                );
                Some(num * v10 / denom)
            }
            11 => {
                if !(i_sub && j_sub && s_sub) {
                    return None;
                }
                let v11 = proxies.value11(sub_sector(i), sub_sector(j), sub_region(s));
                if v11.is_nan() {
                    return None;
                }
                let denom = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::All,
                    SectorSel::Super(j_super),
                    RegionSel::Super(s_super),
                );
                if denom <= 0.0 {
                    return None;
                }
                let num = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::Leaf(r),
                    SectorSel::Super(j_super),
                    RegionSel::Super(s_super),
                );
                Some(num * v11 / denom)
            }
            12 => {
                if !(i_sub && r_sub) {
                    return None;
                }
                let v12 = proxies.value12(sub_sector(i), sub_region(r), s_super);
                if v12.is_nan() {
                    return None;
                }
                let denom = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::Super(r_super),
                    SectorSel::All,
                    RegionSel::Super(s_super),
                );
                if denom <= 0.0 {
                    return None;
                }
                let num = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::Super(r_super),
                    SectorSel::Leaf(j),
                    RegionSel::Leaf(s),
                );
                Some(num * v12 / denom)
            }
            13 => {
                if !(j_sub && s_sub) {
                    return None;
                }
                let v13 = proxies.value13(i_super, sub_sector(j), sub_region(s));
                if v13.is_nan() {
                    return None;
                }
                let denom = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::All,
                    SectorSel::Super(j_super),
                    RegionSel::Super(s_super),
                );
                if denom <= 0.0 {
                    return None;
                }
                let num = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Leaf(i),
                    RegionSel::Leaf(r),
                    SectorSel::Super(j_super),
                    RegionSel::Super(s_super),
                );
                Some(num * v13 / denom)
            }
            14 => {
                if !(i_sub && r_sub && s_sub) {
                    return None;
                }
                let v14 = proxies.value14(sub_sector(i), sub_region(r), sub_region(s));
                if v14.is_nan() {
                    return None;
                }
                let denom = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::Super(r_super),
                    SectorSel::All,
                    RegionSel::Super(s_super),
                );
                if denom <= 0.0 {
                    return None;
                }
                let num = last.sum_keyed(
                    idx,
                    leaves,
                    SectorSel::Super(i_super),
                    RegionSel::Super(r_super),
                    SectorSel::Leaf(j),
                    RegionSel::Super(s_super),
                );
                Some(num * v14 / denom)
            }
            15 => {
                if !(i_sub && r_sub) {
                    return None;
                }
                let v9 = proxies.value9(sub_sector(i), j_super, s_super);
                let v12 = proxies.value12(sub_sector(i), sub_region(r), s_super);
                let v5 = proxies.value5(sub_sector(i), s_super);
                if v9.is_nan() || v12.is_nan() || v5.is_nan() || v9 == 0.0 || v12 == 0.0 || v5 <= 0.0 {
                    return None;
                }
                Some(v9 * v12 / v5)
            }
            16 => {
                if !(j_sub && s_sub) {
                    return None;
                }
                let v13 = proxies.value13(i_super, sub_sector(j), sub_region(s));
                let v10 = proxies.value10(i_super, r_super, sub_region(s));
                let v6 = proxies.value6(i_super, sub_region(s));
                if v13.is_nan() || v10.is_nan() || v6.is_nan() || v13 == 0.0 || v10 == 0.0 || v6 <= 0.0 {
                    return None;
                }
                Some(v13 * v10 / v6)
            }
            17 => {
                if !(i_sub && j_sub && s_sub) {
                    return None;
                }
                let v11 = proxies.value11(sub_sector(i), sub_sector(j), sub_region(s));
                let v14 = proxies.value14(sub_sector(i), sub_region(r), sub_region(s));
                let v7 = proxies.value7(sub_sector(i), sub_region(s));
                if v11.is_nan() || v14.is_nan() || v7.is_nan() || v11 == 0.0 || v14 == 0.0 || v7 <= 0.0 {
                    return None;
                }
                Some(v11 * v14 / v7)
            }
            18 => {
                if !(i_sub && r_sub && j_sub && s_sub) {
                    return None;
                }
                let v18 = proxies.value18(sub_sector(i), sub_region(r), sub_sector(j), sub_region(s));
                if v18.is_nan() {
                    return None;
                }
                Some(v18)
            }
            _ => None,
        }
    }

    /// Rescales level-`d` leaves of every super-cell with a positive base
    /// value so the super-cell's leaf sum conserves its base sum.
    fn adjust(&mut self, d: u8, leaves: &[(SectorId, RegionId, usize)]) {
        let supers = self.index_set.iterate_super();
        for &(i_sector_super, i_region_super) in &supers {
            for &(j_sector_super, j_region_super) in &supers {
                let base_value = match (
                    self.index_set.base_at_super(i_sector_super, i_region_super),
                    self.index_set.base_at_super(j_sector_super, j_region_super),
                ) {
                    (Some(row), Some(col)) => self.base.get_raw(row * self.base.n() + col),
                    _ => 0.0,
                };
                if base_value <= 0.0 {
                    continue;
                }

                let mut cells = Vec::new();
                for i_sector in self.index_set.sector_leaves(i_sector_super) {
                    for i_region in self.index_set.region_leaves(i_region_super) {
                        for j_sector in self.index_set.sector_leaves(j_sector_super) {
                            for j_region in self.index_set.region_leaves(j_region_super) {
                                if let (Some(row), Some(col)) = (
                                    self.index_set.at(i_sector, i_region),
                                    self.index_set.at(j_sector, j_region),
                                ) {
                                    cells.push(row * self.table.n() + col);
                                }
                            }
                        }
                    }
                }
                let _ = leaves;

                let mut exact_sum = 0.0;
                let mut other_sum = 0.0;
                for &cell in &cells {
                    let v = self.table.get_raw(cell);
                    if self.quality.get_raw(cell) == d {
                        exact_sum += v;
                    } else {
                        other_sum += v;
                    }
                }

                if base_value > exact_sum && other_sum > 0.0 {
                    let factor = (base_value - exact_sum) / other_sum;
                    for &cell in &cells {
                        if self.quality.get_raw(cell) != d {
                            let v = self.table.get_raw(cell);
                            self.table.set_raw(cell, v * factor);
                        }
                    }
                } else {
                    let total = exact_sum + other_sum;
                    if total > 0.0 {
                        let correction = base_value / total;
                        if (correction - 1.0).abs() > 1e-12 {
                            for &cell in &cells {
                                let v = self.table.get_raw(cell);
                                self.table.set_raw(cell, v * correction);
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{RegionId, SectorId};

    fn base_index_set() -> IndexSet {
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
    fn refine_with_no_proxies_is_a_no_op() {
        let idx = base_index_set();
        let proxies = ProxyStore::new();
        let mut table = Table::zeros(&idx);
        let s = idx.sector_by_name("S").unwrap();
        let a = idx.region_by_name("A").unwrap();
        let b = idx.region_by_name("B").unwrap();
        table.set(&idx, SectorId::Super(s), RegionId::Super(a), SectorId::Super(s), RegionId::Super(b), 20.0);
        let base = table.clone();

        let mut engine = Disaggregation::new(&idx, &proxies, &base, table.clone());
        engine.refine();
        assert_eq!(engine.table().raw(), table.raw());
    }

    #[test]
    fn region_split_with_population_proxy_conserves_supercell() {
        let mut idx = base_index_set();
        let s = idx.sector_by_name("S").unwrap();
        let a = idx.region_by_name("A").unwrap();
        let b = idx.region_by_name("B").unwrap();

        let mut base = Table::zeros(&idx);
        base.set(&idx, SectorId::Super(s), RegionId::Super(a), SectorId::Super(s), RegionId::Super(b), 20.0);

        let old_leaves = idx.iterate_total();
        idx.insert_subregions("A", &["A1".to_string(), "A2".to_string()]).unwrap();
        let expanded = Table::expand_for_region_split(&old_leaves, &base, &idx, a, 2);

        let mut proxies = ProxyStore::new();
        let a1 = idx.subregion_by_name("A1").unwrap();
        let a2 = idx.subregion_by_name("A2").unwrap();
        // Hand-load a 50/50 population split without going through the CSV path.
        proxies
            .load_level_csv(&idx, 1, write_fixture(&[
                "year,region,value",
                &format!("2020,A1,{}", 1.0),
                &format!("2020,A2,{}", 1.0),
            ]), "2020")
            .unwrap();
        let _ = (a1, a2);

        let mut engine = Disaggregation::new(&idx, &proxies, &expanded, expanded.clone());
        engine.refine();

        let b_super = b;
        let total = engine.table().sum(&idx, s, a, s, b_super);
        assert!((total - 20.0).abs() < 1e-9);
    }

    fn write_fixture(lines: &[&str]) -> std::path::PathBuf {
        use std::io::Write;
        let path = std::env::temp_dir().join(format!("mrio_engine_test_{:p}.csv", lines.as_ptr()));
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        path
    }
}
