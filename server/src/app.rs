//! Core application

use anyhow::{Context, Result};

use crate::core::cli::{self, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_CRATE_TARGET, ENV_LOG};
use crate::domain::metrics::drilldown::build_drill_down_fields;
use crate::domain::metrics::{MetricRegistry, PlatformMetrics, library};

pub struct CoreApp {
    pub config: AppConfig,
    pub registry: MetricRegistry,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let config = AppConfig::load(&cli_config).context("Failed to load configuration")?;
        let app = Self::init(config)?;

        match command {
            Some(Commands::Check) => app.check(),
            Some(Commands::Catalog { platform }) => app.print_catalog(platform.as_deref()),
            None => app.print_catalog(None),
        }
    }

    /// Resolve the configured catalog against the built-in metric library
    pub fn init(config: AppConfig) -> Result<Self> {
        let catalog = PlatformMetrics::from_config(&config.catalog, &library::builtin_metrics())
            .context("Invalid metric catalog")?;
        let registry = MetricRegistry::new(catalog).context("Invalid metric registry")?;
        Ok(Self { config, registry })
    }

    fn check(&self) -> Result<()> {
        let query = self.config.query_config();
        let settings = self.config.metrics_settings();
        println!(
            "ok: {} metrics across {} platforms",
            self.registry.len(),
            self.registry.catalog().platforms().len()
        );
        println!(
            "  timezone={} support_offline={} critical_point_days={} disabled_workspaces={}",
            settings.timezone,
            query.support_offline,
            query.offline_critical_point_days,
            query.disabled_workspaces.len()
        );
        println!(
            "  traverse: concurrency={} max_attempts={} max_drill_down_dimensions={}",
            settings.traverse.concurrency,
            settings.traverse.retry.max_attempts,
            settings.traverse.max_drill_down_dimensions
        );
        Ok(())
    }

    fn print_catalog(&self, only: Option<&str>) -> Result<()> {
        let catalog = self.registry.catalog();
        if let Some(name) = only
            && !catalog.platform_metric_defs.contains_key(name)
        {
            anyhow::bail!("Unknown platform: {}", name);
        }

        let max_dimensions = self.config.traverse.max_drill_down_dimensions;
        for (platform_type, platform) in &catalog.platform_metric_defs {
            if only.is_some_and(|name| name != platform_type) {
                continue;
            }
            println!("{platform_type}");
            for group_name in &platform.metric_groups {
                let Some(group) = catalog.metric_groups.get(group_name) else {
                    continue;
                };
                println!("  {group_name}");
                for def in &group.metric_definitions {
                    let aggr = def
                        .o_expression()
                        .aggr_type
                        .map(|a| a.as_str())
                        .unwrap_or("-");
                    let combinations = if def.compound().is_some() || def.is_const() {
                        "-".to_string()
                    } else {
                        match build_drill_down_fields(
                            catalog,
                            platform,
                            group,
                            def.as_ref(),
                            max_dimensions,
                        ) {
                            Ok(fields) => fields.len().to_string(),
                            Err(e) => format!("error: {e}"),
                        }
                    };
                    println!(
                        "    {:<40} {:<12} offline={:<6} drill_down={}",
                        def.name(),
                        def.metric_type().as_str(),
                        aggr,
                        combinations
                    );
                }
            }
        }
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_CRATE_TARGET);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }
}
