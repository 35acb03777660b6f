//! Entry point: wires the tailer, pipeline coordinator, scheduler, and
//! admin surface into one long-running daemon, grounded in
//! `original_source/main.py::FirewallSystem.run` (load config, connect
//! store, start background jobs, serve requests, shut down on signal).

mod admin;
mod pipeline;
mod rule_engine;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use security_common::config::AppConfig;
use security_common::parsers::LogFormat;
use security_common::sinks::{AlertSink, AuditSink, FileSink};
use security_common::store::Store;
use security_firewall::Executor;
use security_tailer::Tailer;

#[derive(Parser, Debug)]
#[command(name = "security-api", about = "log-driven adaptive firewall daemon")]
struct Cli {
    /// Path to the YAML configuration document.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Address the admin HTTP surface binds to.
    #[arg(long, default_value = "0.0.0.0:3000")]
    bind: String,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let cfg = match AppConfig::load(&cli.config) {
        Ok(cfg) => Arc::new(cfg),
        Err(err) => {
            tracing::error!(%err, path = %cli.config.display(), "failed to load configuration");
            std::process::exit(1);
        }
    };

    let store = match Store::connect(&cfg.store.database_url, cfg.store.max_connections).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!(%err, "failed to connect to the store, cannot start");
            std::process::exit(1);
        }
    };

    let allow_seed: Vec<(String, String, String)> = cfg
        .lists
        .allow
        .iter()
        .map(|e| (e.cidr.clone(), e.description.clone(), e.reason.clone()))
        .collect();
    let deny_seed: Vec<(String, String, String)> = cfg
        .lists
        .deny
        .iter()
        .map(|e| (e.cidr.clone(), e.description.clone(), e.reason.clone()))
        .collect();
    if let Err(err) = store.seed_lists(&allow_seed, &deny_seed).await {
        tracing::warn!(%err, "failed to seed allow/deny lists from configuration");
    }

    let backend = security_firewall::backend_from_config(&cfg.firewall).await;
    let executor = Arc::new(Executor::new(store.clone(), backend, cfg.scoring.clone()));

    let audit: Arc<dyn AuditSink> = Arc::new(FileSink::new("audit.log"));
    let alert: Arc<dyn AlertSink> = Arc::new(FileSink::new("alert.log"));

    let cancel = CancellationToken::new();

    let (pipeline, mut workers) =
        pipeline::spawn(store.clone(), executor.clone(), cfg.clone(), audit, alert, cancel.clone());

    let format = LogFormat::from_profile_name(&cfg.log_source.profile).unwrap_or_else(|| {
        tracing::warn!(profile = %cfg.log_source.profile, "unknown log profile, defaulting to combined");
        LogFormat::Combined
    });

    let tailer = Tailer::new(cfg.log_source.path.clone(), format, cancel.clone());
    let (record_tx, mut record_rx) = mpsc::channel(cfg.concurrency.queue_capacity.max(1));
    let tailer_handle = tokio::spawn(async move {
        if let Err(err) = tailer.run(record_tx).await {
            tracing::error!(%err, "tailer stopped");
        }
    });
    let bridge_handle = tokio::spawn(async move {
        while let Some(record) = record_rx.recv().await {
            pipeline.submit(record).await;
        }
    });

    let scheduler = match scheduler::Scheduler::start(store.clone(), executor.clone(), cfg.clone()).await {
        Ok(scheduler) => scheduler,
        Err(err) => {
            tracing::error!(%err, "failed to start scheduler");
            std::process::exit(1);
        }
    };

    let app = admin::router(admin::AdminState { executor: executor.clone() });
    let listener = match tokio::net::TcpListener::bind(&cli.bind).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, addr = %cli.bind, "failed to bind admin surface");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %cli.bind, "admin surface listening");

    let shutdown_cancel = cancel.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_cancel.cancelled().await;
    });

    tokio::select! {
        result = server => {
            if let Err(err) = result {
                tracing::error!(%err, "admin surface exited with an error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    cancel.cancel();
    let _ = tailer_handle.await;
    let _ = bridge_handle.await;
    while workers.join_next().await.is_some() {}
    if let Err(err) = scheduler.shutdown().await {
        tracing::error!(%err, "scheduler shutdown reported an error");
    }
    tracing::info!("shutdown complete");
}
