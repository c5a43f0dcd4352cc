use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use relay_daemon::config::{Args, Config};
use relay_daemon::{Daemon, http, scheduler};
use relay_stats::Timestamp;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load(&args.config)?;
    config.apply_args(&args);

    let default_filter = config.log_level.clone().unwrap_or_else(|| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&default_filter))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if !args.config.exists() {
        tracing::warn!("Config file {} not found, using defaults", args.config.display());
    }
    config.validate()?;

    tracing::info!("Media relay statistics daemon");
    tracing::info!(
        "{} interface address(es), interval {}s",
        config.interfaces.len(),
        config.interval_seconds
    );

    let daemon = Arc::new(Daemon::new(&config, Timestamp::now()));
    scheduler::spawn(Arc::clone(&daemon));

    // Serve until Ctrl+C
    tokio::select! {
        result = http::serve(Arc::clone(&daemon), config.listen) => {
            if let Err(e) = result {
                tracing::error!("Server error: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down...");
        }
    }

    daemon.shutdown();
    Ok(())
}
