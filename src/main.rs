//! `mrio-disagg` CLI: load a base table, apply declarative splits, load
//! proxy evidence, refine, and write the output table.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use mrio_disagg::config::Config;
use mrio_disagg::storage;
use mrio_disagg::{apply_split, Disaggregation, MrioError, ProxyStore};

#[derive(Parser, Debug)]
#[command(name = "mrio-disagg", about = "Hierarchical MRIO table disaggregation")]
struct Cli {
    /// Path to the TOML configuration file. Defaults to the standard
    /// `config.toml` / `config.local.toml` / `MRIO_*` env search.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => Config::from_file(&path.to_string_lossy()),
        None => Config::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.logging.level);

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal error during disaggregation");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(config: Config) -> Result<(), MrioError> {
    info!(path = %config.storage.base_table.display(), "loading base table");
    let (mut index_set, base) =
        storage::load_table(config.storage.format, &config.storage.base_table, config.storage.threshold)?;

    let mut table = base.clone();
    for entry in &config.splits {
        info!(kind = ?entry.kind, id = %entry.id, into = ?entry.into, "applying split");
        table = apply_split(&mut index_set, &table, entry)?;
    }

    let mut proxies = ProxyStore::new();
    for entry in &config.splits {
        for decl in &entry.proxies {
            info!(level = decl.level, file = %decl.file.display(), "loading proxy level");
            proxies.load_level_csv(&index_set, decl.level, &decl.file, &decl.year)?;
        }
    }

    info!("running refinement");
    let mut engine = Disaggregation::new(&index_set, &proxies, &base, table);
    engine.refine();

    info!(path = %config.storage.output_table.display(), "writing output table");
    storage::write_table(config.storage.format, &config.storage.output_table, &index_set, engine.table())?;

    Ok(())
}
