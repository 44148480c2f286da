mod config;
mod demo;

use std::path::PathBuf;
use std::time::Duration;

use cadence_core::{AppBuilder, JobKind};
use cadence_core::domain::Schedule;
use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use demo::{Heartbeat, HeartbeatHandler, SendReport, SendReportHandler};

/// cadence - durable job scheduler running on in-memory adapters
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "cadence.toml")]
    config: PathBuf,

    /// Number of worker tasks (overrides config file)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    run_for: Option<u64>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,cadence=debug".into()),
        )
        .init();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = config::load(&args.config)?;
    if let Some(concurrency) = args.concurrency {
        config.worker.concurrency = concurrency;
    }

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let app = AppBuilder::new(config)
        .register::<Heartbeat, _>(HeartbeatHandler::default())?
        .register::<SendReport, _>(SendReportHandler)?
        .expect_job_types(&[Heartbeat::TYPE, SendReport::TYPE])
        .build()?;

    let heartbeat = app
        .schedule(
            &Heartbeat {
                source: "cadence-cli".to_string(),
            },
            Schedule::cron("*/5 * * * * *"),
        )
        .await?;
    let report = app
        .schedule(
            &SendReport {
                recipient: "ops@example.com".to_string(),
                fail_first: 1,
            },
            Schedule::once(Utc::now()),
        )
        .await?;
    info!(%heartbeat, %report, "seeded demo jobs");

    let handle = app.start().await?;

    match args.run_for {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => shutdown_signal().await,
    }

    info!("shutting down");
    handle.shutdown_and_join().await;

    let counts = app.status_counts().await?;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
