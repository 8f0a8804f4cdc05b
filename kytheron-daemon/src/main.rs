//! kytheron daemon entry point.

use anyhow::{Context, Result};
use clap::Parser;

use kytheron_core::config::KytheronConfig;
use kytheron_daemon::cli::DaemonCli;
use kytheron_daemon::logging;
use kytheron_daemon::orchestrator::{self, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    let args = DaemonCli::parse();

    let mut config = KytheronConfig::load(&args.config)
        .await
        .with_context(|| format!("failed to load config {}", args.config.display()))?;

    // CLI overrides take precedence over the config file
    if let Some(log_level) = args.log_level {
        config.general.log_level = log_level;
    }
    if let Some(log_format) = args.log_format {
        config.general.log_format = log_format;
    }

    logging::init_tracing(&config.general)?;

    if args.validate {
        let policies = orchestrator::load_policies(&config).await?;
        tracing::info!(
            policies = policies.len(),
            plugins = config.plugins.len(),
            "configuration and policies are valid"
        );
        return Ok(());
    }

    tracing::info!(config = %args.config.display(), "kytheron starting");

    let mut orchestrator = Orchestrator::build(config).await?;
    orchestrator.run().await?;

    tracing::info!("kytheron shut down");
    Ok(())
}
