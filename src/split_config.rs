//! Declarative split / proxy configuration (external interface, §6).
//!
//! An ordered sequence of split entries, each naming a super sector or
//! region to split, the names of its new subs, and the proxy files to load
//! for it. All splits are applied first, in declaration order; all proxies
//! are loaded afterward, so a proxy file may reference any sub created by
//! any split regardless of declaration order.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which kind of entity a [`SplitEntry`] divides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitKind {
    Sector,
    Region,
}

impl std::str::FromStr for SplitKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sector" => Ok(SplitKind::Sector),
            "region" => Ok(SplitKind::Region),
            other => Err(ConfigError::UnknownSplitKind(other.to_string())),
        }
    }
}

/// One proxy file declaration attached to a split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyDecl {
    /// Refinement level this file supplies evidence for (1-14 or 18).
    pub level: u8,
    pub file: std::path::PathBuf,
    /// Only rows whose `year` column matches this value are read.
    pub year: String,
}

/// One declarative split: which super to divide, into which subs, backed by
/// which proxy files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitEntry {
    pub kind: SplitKind,
    /// Name of the super sector/region being split.
    pub id: String,
    /// Names of the new subs, in order.
    pub into: Vec<String>,
    #[serde(default)]
    pub proxies: Vec<ProxyDecl>,
}
