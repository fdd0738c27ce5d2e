//! # mrio-disagg
//!
//! Hierarchical disaggregation of multi-regional input-output (MRIO)
//! tables.
//!
//! A base table maps a flow from an origin `(sector, region)` pair to a
//! destination `(sector, region)` pair, at the coarse granularity the data
//! was collected at. Splitting a sector or region into finer subs without
//! losing the original totals requires distributing each super-cell's flow
//! across its new leaf cells using whatever auxiliary evidence (population,
//! GDP share, trade weights, ...) is available -- that is what this crate
//! does.
//!
//! ## Pipeline
//!
//! ```text
//! base table (index_set::IndexSet + table::Table<f64>)
//!     |
//!     v
//! declarative splits (split_config::SplitEntry)  -> enlarged IndexSet + Table
//!     |
//!     v
//! proxy evidence (proxy::ProxyStore)              <- proxy CSV files
//!     |
//!     v
//! engine::Disaggregation::refine()                -> refined Table<f64>
//!     |
//!     v
//! output table (storage::write_table)
//! ```
//!
//! ## Module organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`entities`] | Sector/region id types and the super/sub entity model |
//! | [`index_set`] | Dense hierarchical (sector, region) -> row/column index |
//! | [`table`] | The dense flow matrix and its hierarchical sum operators |
//! | [`proxy`] | The eighteen-level proxy evidence store |
//! | [`engine`] | The level-ordered refinement algorithm |
//! | [`config`] | Figment-based configuration loading |
//! | [`split_config`] | Declarative split/proxy TOML schema |
//! | [`storage`] | Tabular and binary table I/O |
//! | [`error`] | Unified error taxonomy |

pub mod config;
pub mod engine;
pub mod entities;
pub mod error;
pub mod index_set;
pub mod proxy;
pub mod split_config;
pub mod storage;
pub mod table;

pub use config::Config;
pub use engine::Disaggregation;
pub use error::{MrioError, MrioResult};
pub use index_set::IndexSet;
pub use proxy::ProxyStore;
pub use table::Table;

use entities::{SuperRegionId, SuperSectorId};
use error::MrioError as Error;
use split_config::{SplitEntry, SplitKind};

/// Applies one declarative split to the working index set and table,
/// returning the enlarged table. Proxy files named by the entry are left
/// for the caller to load afterward (via [`ProxyStore::load_level_csv`]) so
/// that a proxy referencing a sub created by a *later* split entry still
/// resolves correctly.
pub fn apply_split(index_set: &mut IndexSet, table: &Table<f64>, entry: &SplitEntry) -> Result<Table<f64>, Error> {
    let old_leaves = index_set.iterate_total();
    match entry.kind {
        SplitKind::Sector => {
            let id: SuperSectorId = index_set.sector_by_name(&entry.id)?;
            index_set.insert_subsectors(&entry.id, &entry.into)?;
            Ok(Table::expand_for_sector_split(&old_leaves, table, index_set, id, entry.into.len()))
        }
        SplitKind::Region => {
            let id: SuperRegionId = index_set.region_by_name(&entry.id)?;
            index_set.insert_subregions(&entry.id, &entry.into)?;
            Ok(Table::expand_for_region_split(&old_leaves, table, index_set, id, entry.into.len()))
        }
    }
}
