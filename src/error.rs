//! Error Taxonomy
//!
//! All fatal failure paths in the crate resolve to one variant of [`MrioError`].
//! Per-cell numeric dead-ends (NaN or non-positive divisors during a
//! refinement rule) are never represented here -- they are `Option::None`
//! returns from the rule evaluators in [`crate::engine`] and are silently
//! skipped, per the specification.

use thiserror::Error;

/// Configuration loading/parsing errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("failed to parse split configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unknown split kind '{0}' (expected 'sector' or 'region')")]
    UnknownSplitKind(String),
}

/// Reference errors: unknown names, duplicate entries, illegal splits.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("sector '{0}' is already split into subsectors")]
    SectorAlreadySplit(String),

    #[error("region '{0}' is already split into subregions")]
    RegionAlreadySplit(String),

    #[error("'{0}' is a subsector, not a super sector")]
    NotASuperSector(String),

    #[error("'{0}' is a subregion, not a super region")]
    NotASuperRegion(String),

    #[error("unknown sector '{0}'")]
    UnknownSector(String),

    #[error("unknown region '{0}'")]
    UnknownRegion(String),

    #[error("duplicate (sector, region) pair: ({0}, {1})")]
    DuplicateIndex(String, String),

    #[error("sector/region pair ({0}, {1}) is not present in the index set")]
    MissingIndex(String, String),
}

/// File I/O and parsing errors for base-table and proxy input.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed row {row} in '{path}': expected {expected} columns, got {got}")]
    ColumnCountMismatch {
        path: String,
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("could not parse numeric value '{value}' at row {row} in '{path}'")]
    NumberParse {
        path: String,
        row: usize,
        value: String,
    },

    #[error("'{path}' has no header row")]
    MissingHeader { path: String },

    #[error("index file and matrix file in '{path}' disagree on dimension ({index_len} vs {matrix_dim})")]
    DimensionMismatch {
        path: String,
        index_len: usize,
        matrix_dim: usize,
    },

    #[error("malformed binary dump '{path}': {reason}")]
    MalformedBinary { path: String, reason: String },
}

/// Proxy-level specific errors: wrong level, wrong arity, fatal per §4.4.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("proxy level {0} is out of range (expected 1..=18)")]
    LevelOutOfRange(u8),

    #[error("proxy level {0} is derived (Peters rule) and cannot be loaded from a file")]
    DerivedLevelHasFile(u8),

    #[error("proxy file '{path}' declares level {declared} but was registered for level {expected}")]
    LevelMismatch {
        path: String,
        declared: u8,
        expected: u8,
    },
}

/// Top-level error type all fatal paths unify into.
#[derive(Error, Debug)]
pub enum MrioError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("{0}")]
    Other(String),
}

/// Result type used throughout the crate.
pub type MrioResult<T> = Result<T, MrioError>;
