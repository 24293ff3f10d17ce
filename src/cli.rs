// src/cli.rs

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "credpool",
    version,
    about = "Credential pool manager for rate-limited upstream APIs",
    long_about = "Manages a pool of upstream API keys: hands out eligible keys, counts usage \
against per-key ceilings, rotates away from exhausted or rejected keys, and reactivates rested \
keys after a cooldown window."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "CREDPOOL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server bind address (overrides config)
    #[arg(long, env = "CREDPOOL_HOST")]
    pub host: Option<String>,

    /// Server port (overrides config)
    #[arg(short, long, env = "CREDPOOL_PORT")]
    pub port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "CREDPOOL_JSON_LOGS")]
    pub json_logs: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
