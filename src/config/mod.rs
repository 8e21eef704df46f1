pub mod toml_config;

pub use toml_config::AppConfig;

#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use crate::domain::model::TravelMode;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "nearest-amenity")]
#[command(about = "Find the nearest amenity of a category for many origins")]
pub struct CliConfig {
    /// Path to a TOML configuration file; built-in defaults are used when absent
    #[arg(short, long)]
    pub config: Option<String>,

    /// JSON array of origins: [{"id", "displayName", "location": [lon, lat]}]
    #[arg(long)]
    pub origins: String,

    /// Category key, e.g. market, clinic, hospital
    #[arg(long, default_value = "market")]
    pub category: String,

    #[arg(long, default_value = "driving")]
    pub mode: TravelMode,

    /// Overrides persistence.output_path
    #[arg(long)]
    pub output: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(long, help = "Log per-batch timing and process stats")]
    pub monitor: bool,

    /// Validate configuration and origins without calling any backend
    #[arg(long)]
    pub dry_run: bool,
}
