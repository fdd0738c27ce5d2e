//! Benchmarks the level-ordered refinement over a synthetic table with
//! several hundred leaves, to catch asymptotic regressions in `approximate`
//! and `adjust`.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mrio_disagg::{Disaggregation, IndexSet, ProxyStore, Table};

fn synthetic_index_set(num_sectors: usize, num_regions: usize) -> IndexSet {
    let mut idx = IndexSet::new();
    let sectors: Vec<_> = (0..num_sectors)
        .map(|i| idx.add_sector(&format!("S{i}")).unwrap())
        .collect();
    let regions: Vec<_> = (0..num_regions)
        .map(|i| idx.add_region(&format!("R{i}")).unwrap())
        .collect();
    for &sector in &sectors {
        for &region in &regions {
            idx.add_index(sector, region).unwrap();
        }
    }
    idx.finalize_load();
    idx
}

fn synthetic_table(idx: &IndexSet) -> Table<f64> {
    let mut table = Table::zeros(idx);
    let leaves = idx.iterate_total();
    for &(i_sector, i_region, _) in &leaves {
        for &(j_sector, j_region, _) in &leaves {
            table.set(idx, i_sector, i_region, j_sector, j_region, 1.0);
        }
    }
    table
}

fn refine_benchmark(c: &mut Criterion) {
    let idx = synthetic_index_set(20, 20);
    let base = synthetic_table(&idx);
    let proxies = ProxyStore::new();

    c.bench_function("refine_400_leaves_no_proxies", |b| {
        b.iter(|| {
            let mut engine = Disaggregation::new(&idx, &proxies, &base, base.clone());
            engine.refine();
            black_box(engine.into_table());
        });
    });
}

fn split_and_refine_benchmark(c: &mut Criterion) {
    let mut idx = synthetic_index_set(10, 10);
    let base = synthetic_table(&idx);
    let old_leaves = idx.iterate_total();
    idx.insert_subregions("R0", &["R0a".to_string(), "R0b".to_string()]).unwrap();
    let expanded = Table::expand_for_region_split(
        &old_leaves,
        &base,
        &idx,
        idx.region_by_name("R0").unwrap(),
        2,
    );
    let proxies = ProxyStore::new();

    c.bench_function("refine_after_region_split", |b| {
        b.iter(|| {
            let mut engine = Disaggregation::new(&idx, &proxies, &expanded, expanded.clone());
            engine.refine();
            black_box(engine.into_table());
        });
    });
}

criterion_group!(benches, refine_benchmark, split_and_refine_benchmark);
criterion_main!(benches);
