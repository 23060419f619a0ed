use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "smugmug-backup",
    about = "Back up a SmugMug account's albums, photos and videos to local storage",
    version
)]
pub struct Cli {
    /// Path to the TOML configuration file
    /// (default: ./config.toml or ~/.smgmg/config.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Override the configured backup destination folder
    #[arg(short = 'd', long)]
    pub destination: Option<String>,

    /// Decide and log what would be downloaded without writing any file
    #[arg(long)]
    pub dry_run: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
