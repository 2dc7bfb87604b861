//! Vigil Daemon - periodic log scanning, reporting and investigations.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use vigil_common::VigilConfig;
use vigild::{logging, PipelineContext, RealBackends, Scheduler, VigilService};

#[derive(Parser)]
#[command(name = "vigild")]
#[command(about = "Vigil - log anomaly detection and diagnostic investigation daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default /etc/vigil/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run one scan-then-report cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = VigilConfig::load(cli.config.as_deref());
    logging::init(&config.logging.level);

    info!("Vigil Daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let factory = Arc::new(RealBackends::new(config.llm.clone(), config.search.clone()));
    let context = PipelineContext::new(config.storage.clone(), config.probes.clone());
    let scheduler = Arc::new(Scheduler::new(config.scheduler.clone(), context, factory)?);
    let service = VigilService::new(Arc::clone(&scheduler), config.llm.model.clone());

    if cli.once {
        let envelope = service.trigger_scan().await;
        info!("Scan: {}", serde_json::to_string(&envelope)?);
        let envelope = service.generate_report(None, None).await;
        info!("Report: {:?}", envelope.status);
        return Ok(());
    }

    scheduler.start().await;
    info!("Vigil Daemon ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully");
    scheduler.stop().await;

    Ok(())
}
