use clap::Parser;
use device_transfer::config::TransferConfig;
use device_transfer::infrastructure::{device, storage};
use device_transfer::services::pipeline::{TransferPipeline, write_report};
use device_transfer::services::trigger::ProcessTrigger;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Load configuration from this file instead of ./.env
    #[arg(short, long)]
    env_file: Option<PathBuf>,

    /// Write the JSON run report here (overrides REPORT_PATH)
    #[arg(short, long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & Logging Setup
    let args = Args::parse();
    match &args.env_file {
        Some(path) => {
            dotenvy::from_path(path)?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "device_transfer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting device transfer...");

    // 2. Configuration
    let mut config = TransferConfig::from_env()?;
    if args.report.is_some() {
        config.report_path = args.report;
    }
    info!(
        "🛠️  Config: Staging={:?}, Destination={}, Bridge={}",
        config.staging_root, config.device_destination, config.adb_path
    );

    // 3. Collaborators
    let source = storage::setup_source(&config.storage).await;
    let bridge = device::setup_bridge(&config.adb_path).await;
    let trigger = Arc::new(ProcessTrigger::new(config.trigger.clone()));
    let report_path = config.report_path.clone();

    // 4. Run
    let pipeline = TransferPipeline::new(config, source, bridge, trigger);
    let report = match pipeline.run().await {
        Ok(report) => report,
        Err(e) => {
            error!("❌ Transfer aborted: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "📊 Run finished: {} pushed, {} failed, {} skipped, downstream exit code {:?}",
        report.pushed().count(),
        report.failed().count(),
        report.skipped().count(),
        report.trigger_exit_code
    );
    for path in report.retained_staging() {
        info!("📌 Retained for manual recovery: {:?}", path);
    }
    for path in &report.stray_staging {
        warn!("🧹 Pushed but not cleaned up: {:?}", path);
    }

    if let Some(path) = report_path {
        if let Err(e) = write_report(&report, &path).await {
            error!("❌ Failed to write run report to {:?}: {}", path, e);
        }
    }

    info!("👋 Device transfer exited.");
    Ok(())
}
