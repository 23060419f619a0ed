//! smugmug-backup — back up a SmugMug account to local storage.
//!
//! Walks the authenticated user's albums through the paginated SmugMug v2
//! API, skips items that already exist locally with the expected size, and
//! streams the rest to one folder per album. File naming is template-driven,
//! with a collision-resistant fallback name per item.

#![warn(clippy::all)]

mod api;
mod auth;
mod backup;
mod cli;
mod config;
mod download;
mod files;
mod names;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let mut conf = config::Conf::load(cli.config.as_deref())?.with_env_overrides();
    if let Some(destination) = cli.destination {
        conf.store.destination = destination;
    }
    conf.validate()?;

    let mut backup = backup::Backup::new(conf, cli.dry_run)?;
    backup.run().await?;
    Ok(())
}
