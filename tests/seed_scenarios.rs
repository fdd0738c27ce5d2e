//! End-to-end seed scenarios exercising the full splits -> proxies ->
//! refine pipeline through the public API.

use std::io::Write;

use mrio_disagg::entities::{RegionId, SectorId};
use mrio_disagg::{apply_split, Disaggregation, IndexSet, ProxyStore, Table};
use mrio_disagg::split_config::{SplitEntry, SplitKind};

fn write_csv(lines: &[String]) -> std::path::PathBuf {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("mrio_seed_test_{}_{}.csv", std::process::id(), n));
    let mut f = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(f, "{line}").unwrap();
    }
    path
}

fn two_by_two() -> (IndexSet, Table<f64>) {
    let mut idx = IndexSet::new();
    let s = idx.add_sector("S").unwrap();
    let a = idx.add_region("A").unwrap();
    let b = idx.add_region("B").unwrap();
    idx.add_index(s, a).unwrap();
    idx.add_index(s, b).unwrap();
    idx.finalize_load();

    let mut t = Table::zeros(&idx);
    let sa = SectorId::Super(s);
    let ra = RegionId::Super(a);
    let rb = RegionId::Super(b);
    t.set(&idx, sa, ra, sa, ra, 10.0);
    t.set(&idx, sa, ra, sa, rb, 20.0);
    t.set(&idx, sa, rb, sa, ra, 30.0);
    t.set(&idx, sa, rb, sa, rb, 40.0);
    (idx, t)
}

#[test]
fn no_splits_no_proxies_is_identity() {
    let (idx, table) = two_by_two();
    let proxies = ProxyStore::new();
    let mut engine = Disaggregation::new(&idx, &proxies, &table, table.clone());
    engine.refine();
    assert_eq!(engine.table().raw(), table.raw());
}

#[test]
fn region_split_with_population_proxy_halves_flows() {
    let (mut idx, base) = two_by_two();
    let entry = SplitEntry {
        kind: SplitKind::Region,
        id: "A".to_string(),
        into: vec!["A1".to_string(), "A2".to_string()],
        proxies: Vec::new(),
    };
    let expanded = apply_split(&mut idx, &base, &entry).unwrap();

    let mut proxies = ProxyStore::new();
    let path = write_csv(&[
        "year,region,value".to_string(),
        "2020,A1,1".to_string(),
        "2020,A2,1".to_string(),
    ]);
    proxies.load_level_csv(&idx, 1, &path, "2020").unwrap();

    let mut engine = Disaggregation::new(&idx, &proxies, &expanded, expanded.clone());
    engine.refine();

    let s = idx.sector_by_name("S").unwrap();
    let a1 = idx.subregion_by_name("A1").unwrap();
    let b = idx.region_by_name("B").unwrap();
    let value = engine.table().at(
        &idx,
        SectorId::Super(s),
        RegionId::Sub(a1),
        SectorId::Super(s),
        RegionId::Super(b),
    );
    assert!((value - 10.0).abs() < 1e-9);
}

#[test]
fn sector_split_with_gdp_proxy_follows_three_to_one_ratio() {
    let (mut idx, base) = two_by_two();
    let entry = SplitEntry {
        kind: SplitKind::Sector,
        id: "S".to_string(),
        into: vec!["S1".to_string(), "S2".to_string()],
        proxies: Vec::new(),
    };
    let expanded = apply_split(&mut idx, &base, &entry).unwrap();

    let mut proxies = ProxyStore::new();
    let path = write_csv(&[
        "year,sector,region,value".to_string(),
        "2020,S1,A,3".to_string(),
        "2020,S2,A,1".to_string(),
        "2020,S1,B,1".to_string(),
        "2020,S2,B,1".to_string(),
    ]);
    proxies.load_level_csv(&idx, 3, &path, "2020").unwrap();

    let mut engine = Disaggregation::new(&idx, &proxies, &expanded, expanded.clone());
    engine.refine();

    let s1 = idx.subsector_by_name("S1").unwrap();
    let a = idx.region_by_name("A").unwrap();
    let b = idx.region_by_name("B").unwrap();
    let row_sum = engine.table().sum_keyed(
        &idx,
        &idx.iterate_total(),
        mrio_disagg::table::SectorSel::Leaf(SectorId::Sub(s1)),
        mrio_disagg::table::RegionSel::Super(a),
        mrio_disagg::table::SectorSel::All,
        mrio_disagg::table::RegionSel::All,
    );
    let base_row_sum = base.sum_keyed(
        &idx,
        &idx.iterate_total(),
        mrio_disagg::table::SectorSel::Super(idx.sector_by_name("S").unwrap()),
        mrio_disagg::table::RegionSel::Super(a),
        mrio_disagg::table::SectorSel::All,
        mrio_disagg::table::RegionSel::All,
    );
    let _ = b;
    assert!((row_sum - base_row_sum * 0.75).abs() < 1e-6);
}

#[test]
fn exact_level_18_matches_explicit_values_after_adjust() {
    let (mut idx, base) = two_by_two();
    let region_entry = SplitEntry {
        kind: SplitKind::Region,
        id: "A".to_string(),
        into: vec!["A1".to_string(), "A2".to_string()],
        proxies: Vec::new(),
    };
    let expanded = apply_split(&mut idx, &base, &region_entry).unwrap();
    let region_entry_b = SplitEntry {
        kind: SplitKind::Region,
        id: "B".to_string(),
        into: vec!["B1".to_string(), "B2".to_string()],
        proxies: Vec::new(),
    };
    let expanded = apply_split(&mut idx, &expanded, &region_entry_b).unwrap();
    let sector_entry = SplitEntry {
        kind: SplitKind::Sector,
        id: "S".to_string(),
        into: vec!["S1".to_string(), "S2".to_string()],
        proxies: Vec::new(),
    };
    let expanded = apply_split(&mut idx, &expanded, &sector_entry).unwrap();

    let mut proxies = ProxyStore::new();
    let mut lines = vec!["year,sector,region,sector2,region2,value".to_string()];
    for i_sector in ["S1", "S2"] {
        for i_region in ["A1", "A2"] {
            for j_sector in ["S1", "S2"] {
                for j_region in ["B1", "B2"] {
                    lines.push(format!("2020,{i_sector},{i_region},{j_sector},{j_region},5"));
                }
            }
        }
    }
    let path = write_csv(&lines);
    proxies.load_level_csv(&idx, 18, &path, "2020").unwrap();

    let mut engine = Disaggregation::new(&idx, &proxies, &expanded, expanded.clone());
    engine.refine();

    let s1 = idx.subsector_by_name("S1").unwrap();
    let a1 = idx.subregion_by_name("A1").unwrap();
    let s2 = idx.subsector_by_name("S2").unwrap();
    let b1 = idx.subregion_by_name("B1").unwrap();
    let value = engine.table().at(
        &idx,
        SectorId::Sub(s1),
        RegionId::Sub(a1),
        SectorId::Sub(s2),
        RegionId::Sub(b1),
    );
    // base (S,A,S,B) = 20 split across 16 equal-weight leaves -> 1.25 each,
    // but level 18's uniform-correction rescales every leaf to match the
    // proxy's relative shape (here: all equal) while conserving the sum.
    assert!((value - 1.25).abs() < 1e-6);
}

#[test]
fn peters_1_level_15_matches_v9_times_v12_over_v5() {
    let (mut idx, base) = two_by_two();
    let region_entry = SplitEntry {
        kind: SplitKind::Region,
        id: "A".to_string(),
        into: vec!["A1".to_string(), "A2".to_string()],
        proxies: Vec::new(),
    };
    let expanded = apply_split(&mut idx, &base, &region_entry).unwrap();
    let sector_entry = SplitEntry {
        kind: SplitKind::Sector,
        id: "S".to_string(),
        into: vec!["S1".to_string(), "S2".to_string()],
        proxies: Vec::new(),
    };
    let expanded = apply_split(&mut idx, &expanded, &sector_entry).unwrap();

    let mut proxies = ProxyStore::new();
    let level5 = write_csv(&[
        "year,sector,region,value".to_string(),
        "2020,S1,B,2".to_string(),
        "2020,S2,B,2".to_string(),
    ]);
    proxies.load_level_csv(&idx, 5, &level5, "2020").unwrap();
    let level9 = write_csv(&[
        "year,sector,sector2,region,value".to_string(),
        "2020,S1,S,B,3".to_string(),
        "2020,S2,S,B,3".to_string(),
    ]);
    proxies.load_level_csv(&idx, 9, &level9, "2020").unwrap();
    let level12 = write_csv(&[
        "year,sector,region,region2,value".to_string(),
        "2020,S1,A1,B,4".to_string(),
        "2020,S1,A2,B,4".to_string(),
        "2020,S2,A1,B,4".to_string(),
        "2020,S2,A2,B,4".to_string(),
    ]);
    proxies.load_level_csv(&idx, 12, &level12, "2020").unwrap();

    let mut engine = Disaggregation::new(&idx, &proxies, &expanded, expanded.clone());
    engine.refine();

    // Peters-1 derives leaf = v9*v12/v5 = 3*4/2 = 6 for every (sub, sub, *, B)
    // cell, then adjust's uniform-correction branch rescales all eight cells
    // in the (S,A,S,B) super-block (base value 20) by 20/48.
    let s1 = idx.subsector_by_name("S1").unwrap();
    let a1 = idx.subregion_by_name("A1").unwrap();
    let b = idx.region_by_name("B").unwrap();
    let value = engine.table().at(
        &idx,
        SectorId::Sub(s1),
        RegionId::Sub(a1),
        SectorId::Sub(s1),
        RegionId::Super(b),
    );
    assert!((value - 2.5).abs() < 1e-9);

    let total = engine.table().sum(&idx, idx.sector_by_name("S").unwrap(), idx.region_by_name("A").unwrap(), idx.sector_by_name("S").unwrap(), b);
    assert!((total - 20.0).abs() < 1e-9);
}

#[test]
fn idempotent_single_sub_split_leaves_table_numerically_unchanged() {
    let (mut idx, base) = two_by_two();
    let before_sum: f64 = base.raw().iter().sum();
    let entry = SplitEntry {
        kind: SplitKind::Region,
        id: "A".to_string(),
        into: vec!["A".to_string()],
        proxies: Vec::new(),
    };
    let expanded = apply_split(&mut idx, &base, &entry).unwrap();
    assert_eq!(idx.size(), 2);
    assert_eq!(expanded.raw().iter().sum::<f64>(), before_sum);
}
