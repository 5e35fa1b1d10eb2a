use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use streamlog_server::catalog_client::SpotifyCatalogClient;
use streamlog_server::config::{AppConfig, CliConfig, FileConfig};
use streamlog_server::library_store::{LibraryStore, SqliteLibraryStore};
use streamlog_server::populator::populate;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the extended-streaming-history JSON exports.
    #[clap(value_parser = parse_path)]
    pub input_dir: PathBuf,

    /// Path to the SQLite library database file (created if missing).
    #[clap(value_parser = parse_path)]
    pub db_path: PathBuf,

    /// Path to an optional TOML config file.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Market (ISO country code) passed through to catalog lookups.
    #[clap(long)]
    pub market: Option<String>,
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    info!("streamlog-server {}", env!("CARGO_PKG_VERSION"));

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let config = AppConfig::resolve(
        &CliConfig {
            input_dir: Some(cli_args.input_dir),
            db_path: Some(cli_args.db_path),
            market: cli_args.market,
        },
        file_config,
    )?;

    info!("Opening library database at {:?}...", config.db_path);
    let store = SqliteLibraryStore::new(&config.db_path)?;

    let catalog = SpotifyCatalogClient::new(
        &config.catalog.client_id,
        &config.catalog.client_secret,
        config.market.clone(),
    )?;

    let summary = populate(&store, &catalog, &config.input_dir)?;

    let counts = store.counts()?;
    info!(
        "Library now holds {} tracks, {} albums, {} artists, {} labels, {} genres, {} aliases, {} plays",
        counts.tracks,
        counts.albums,
        counts.artists,
        counts.labels,
        counts.genres,
        counts.aliases,
        counts.plays
    );
    info!(
        "This run: {} records loaded, {} plays created, {} duplicates, {} dropped",
        summary.records_loaded,
        summary.plays.created,
        summary.plays.duplicates,
        summary.plays.dropped
    );

    Ok(())
}
