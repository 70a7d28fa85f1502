use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use devis_sync::activity::ActivityMonitor;
use devis_sync::api::ApiClient;
use devis_sync::bus::SignalHub;
use devis_sync::config;
use devis_sync::notifier::LogSink;
use devis_sync::session::Session;
use devis_sync::views::QuoteDetailView;

#[derive(Debug, Parser)]
#[command(author, version, about = "Keep a local view of quotes in sync with the backend")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch recent quotes and log status changes until Ctrl-C
    Watch,
    /// Watch one quote until the signer acts on it or Ctrl-C
    Quote { id: String },
    /// Print an example configuration
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::PrintConfig = args.command {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    let backend = Arc::new(ApiClient::from_config(&cfg)?);
    let hub = SignalHub::new();
    let session = Session::start(
        backend,
        hub.open(&cfg.sync.channel),
        cfg.sync.clone(),
        Arc::new(LogSink),
    );

    match args.command {
        Command::Watch => {
            let monitor = ActivityMonitor::start(session.clone());
            info!("watching quote activity");
            tokio::signal::ctrl_c().await?;
            info!(last_update = ?monitor.last_update(), "stopping");
        }
        Command::Quote { id } => {
            let view = QuoteDetailView::open(session.clone(), &id)
                .await
                .map_err(|err| anyhow!("failed to load quote {}: {}", id, err))?;
            let mut shown = view.watch();
            info!(quote = %id, status = view.quote().status.as_str(), "watching quote");
            if view.quote().status.awaits_external_action() {
                loop {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => break,
                        res = shown.changed() => {
                            if res.is_err() {
                                break;
                            }
                            let status = shown.borrow_and_update().status;
                            info!(quote = %id, status = status.as_str(), "quote updated");
                            if !status.awaits_external_action() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        Command::PrintConfig => {}
    }

    session.shutdown();
    Ok(())
}
