use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    ENV_CONFIG, ENV_OFFLINE_CRITICAL_POINT_DAYS, ENV_SUPPORT_OFFLINE, ENV_TIMEZONE,
    ENV_TRAVERSE_CONCURRENCY, ENV_TRAVERSE_QUERY_TIMEOUT_SECS,
};

#[derive(Parser)]
#[command(name = "loopmetrics")]
#[command(version, about = "Trace metrics engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Route queries older than the critical point to the offline store
    #[arg(long, global = true, env = ENV_SUPPORT_OFFLINE)]
    pub support_offline: Option<bool>,

    /// Days before today from which queries are served offline
    #[arg(long, global = true, env = ENV_OFFLINE_CRITICAL_POINT_DAYS)]
    pub offline_critical_point_days: Option<u32>,

    /// IANA timezone for day boundaries (e.g. Asia/Shanghai)
    #[arg(long, global = true, env = ENV_TIMEZONE)]
    pub timezone: Option<String>,

    /// Metrics traversed concurrently (1 = sequential)
    #[arg(long, global = true, env = ENV_TRAVERSE_CONCURRENCY)]
    pub traverse_concurrency: Option<usize>,

    /// Per-attempt traversal query timeout in seconds
    #[arg(long, global = true, env = ENV_TRAVERSE_QUERY_TIMEOUT_SECS)]
    pub traverse_query_timeout: Option<u64>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// List platforms, metric groups and metrics of the loaded catalog (default command)
    Catalog {
        /// Only list this platform
        #[arg(long)]
        platform: Option<String>,
    },
    /// Build and validate the metric registry, exiting non-zero on error
    Check,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub support_offline: Option<bool>,
    pub offline_critical_point_days: Option<u32>,
    pub timezone: Option<String>,
    pub traverse_concurrency: Option<usize>,
    pub traverse_query_timeout: Option<u64>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        support_offline: cli.support_offline,
        offline_critical_point_days: cli.offline_critical_point_days,
        timezone: cli.timezone,
        traverse_concurrency: cli.traverse_concurrency,
        traverse_query_timeout: cli.traverse_query_timeout,
    };
    (config, cli.command)
}
