use anyhow::Result;
use clap::Parser;

use libtrail_core::config::LibtrailConfig;
use libtrail_daemon::cli::{DaemonCli, DaemonCommand};
use libtrail_daemon::logging;
use libtrail_daemon::orchestrator::Orchestrator;
use libtrail_pipeline::feed;
use libtrail_store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = LibtrailConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;

    // CLI 인자가 최우선
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    if let Some(pid_file) = cli.pid_file {
        config.general.pid_file = pid_file;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;

    match cli.command {
        Some(DaemonCommand::ImportCves { file }) => {
            let mut store = Store::from_config(&config.store)?;
            let imported = feed::import_file(&mut store, &file)?;
            tracing::info!(path = %file.display(), imported, "CVE feed imported");
            println!("imported {} CVE records from {}", imported, file.display());
        }
        Some(DaemonCommand::RunOnce) => {
            let orchestrator = Orchestrator::build_from_config(config).await?;
            let report = orchestrator.run_once().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        None => {
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "libtrail-daemon starting");
            let mut orchestrator = Orchestrator::build_from_config(config).await?;
            orchestrator.run().await?;
        }
    }

    Ok(())
}
