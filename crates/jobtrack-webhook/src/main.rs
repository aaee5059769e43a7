//! jobtrack webhook
//!
//! Tracks how many jobs a pod is running through a counter label, so a
//! disruption controller can tell busy pods from idle ones.
//! - `POST /increment?pod_name=...` / `POST /decrement?pod_name=...`
//! - Optimistic-concurrency retry on write conflicts
//! - Graceful shutdown on SIGINT/SIGTERM

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobtrack_webhook::{app_state::AppState, config, router};

#[derive(Debug, Parser)]
#[command(
    name = "jobtrack-webhook",
    about = "Track job execution in Kubernetes pods through a counter label"
)]
struct Cli {
    /// YAML config file; defaults apply when it does not exist.
    #[arg(long, default_value = "jobtrack.yaml")]
    config: PathBuf,

    /// Namespace holding the target pods.
    #[arg(long)]
    namespace: Option<String>,

    /// Label selector restricting which pods may be mutated.
    #[arg(long)]
    label_selector: Option<String>,

    /// Address to listen on for incoming webhook requests.
    #[arg(long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut cfg = config::load_or_default(&cli.config).context("failed to load config")?;
    if let Some(ns) = cli.namespace {
        cfg.target.namespace = ns;
    }
    if let Some(sel) = cli.label_selector {
        cfg.target.label_selector = sel;
    }
    if let Some(addr) = cli.address {
        cfg.webhook.listen = addr;
    }
    cfg.validate().context("invalid configuration")?;

    let listen = cfg.webhook.listen_addr()?;
    let drain = Duration::from_millis(cfg.webhook.shutdown_timeout_ms);

    let (state, _store) = AppState::in_memory(&cfg).context("failed to build app state")?;
    let app = router::build_router(state.clone());

    tracing::info!(
        %listen,
        namespace = %cfg.target.namespace,
        selector = %cfg.target.label_selector,
        label = %cfg.counter.label,
        "starting webhook server"
    );
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;

    let signal_state = state.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        signal_state.begin_shutdown();
    });
    let server = tokio::spawn(async move { server.await });

    tokio::select! {
        res = server => {
            res.context("server task panicked")?.context("webhook server failed")?;
        }
        _ = drain_deadline(&state, drain) => {
            tracing::warn!(timeout_ms = drain.as_millis() as u64, "drain timed out, exiting");
        }
    }

    tracing::info!("webhook server stopped");
    Ok(())
}

/// Resolves `drain` after shutdown has begun; never resolves otherwise.
async fn drain_deadline(state: &AppState, drain: Duration) {
    state.shutdown_token().cancelled().await;
    tokio::time::sleep(drain).await;
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
            Ok(mut sig) => {
                sig.recv().await;
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
    tracing::info!("signal received, starting graceful shutdown");
}
