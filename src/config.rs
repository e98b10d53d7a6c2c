//! Command line arguments, with environment fallbacks where it makes sense.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const DEFAULT_CRED_PATH: &str = "credentials/snowflake_credential.json";
pub const DEFAULT_LIMIT: u32 = 5;
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Quickly view Snowflake tables
#[derive(Debug, Clone, Parser)]
#[command(name = "snowflake-preview", version, about, long_about = None)]
pub struct Config {
    /// Path to snowflake_credential.json
    #[arg(long = "cred_path", env = "SNOWFLAKE_CREDENTIALS", default_value = DEFAULT_CRED_PATH)]
    pub cred_path: PathBuf,

    /// Database name, e.g. ADVENTUREWORKS
    #[arg(long)]
    pub database: String,

    /// Schema name, e.g. ADVENTUREWORKS
    #[arg(long)]
    pub schema: String,

    /// Table name, e.g. CURRENCYRATE
    #[arg(long)]
    pub table: String,

    /// Number of rows to preview
    #[arg(long, default_value_t = DEFAULT_LIMIT, value_parser = clap::value_parser!(u32).range(1..))]
    pub limit: u32,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, env = "LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,
}

/// Logs go to stderr so stdout only carries the preview.
pub fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
