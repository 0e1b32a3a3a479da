// Copyright 2026 The Spindles Project
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use spindles::config::{self, ConfigSource, FileSource, Overrides, StringSource};
use spindles::hub::BroadcastHub;
use spindles::journal::{ActivitySink, JsonlWriter};
use spindles::proxy::{self, AppState};
use spindles::session::SessionStore;
use spindles::tap::ActivityPublisher;
use spindles::upstream::ReqwestUpstream;
use spindles::ws;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "spindles", about = "Passive activity tap for a streaming LLM API proxy")]
struct Cli {
    /// Path to a spindles.yaml config file (defaults apply when omitted)
    #[arg(long, env = "SPINDLES_CONFIG")]
    config: Option<PathBuf>,

    /// Port for the proxy, health and session routes
    #[arg(long)]
    port: Option<u16>,

    /// Port for the WebSocket activity feed
    #[arg(long)]
    ws_port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let overrides = Overrides {
        http_port: cli.port,
        ws_port: cli.ws_port,
    };

    let source: Box<dyn ConfigSource> = match cli.config {
        Some(path) => Box::new(FileSource { path }),
        None => Box::new(StringSource::default()),
    };
    let config = match config::load_config(source.as_ref(), &overrides) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        http_port = config.http_port,
        ws_port = config.ws_port,
        ws_path = %config.ws_path,
        upstream = %config.upstream_url,
        log_file = %config.log_file.display(),
        "config loaded"
    );

    let hub = BroadcastHub::new();
    let journal = Arc::new(JsonlWriter::spawn(config.log_file.clone()));
    let sink: Arc<dyn ActivitySink> = journal.clone();
    let publisher = ActivityPublisher::new(hub.clone(), Some(sink));

    let upstream = ReqwestUpstream::new(
        reqwest::Client::new(),
        config.upstream_url.clone(),
        config.upstream_timeout_ms,
    );
    let state = AppState {
        upstream: Arc::new(upstream),
        sessions: Arc::new(SessionStore::new()),
        publisher,
        max_body_bytes: config.max_body_bytes,
    };

    let http_addr = SocketAddr::from(([127, 0, 0, 1], config.http_port));
    let ws_addr = SocketAddr::from(([127, 0, 0, 1], config.ws_port));
    let http_listener = bind(http_addr).await;
    let ws_listener = bind(ws_addr).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let http = serve(
        "http",
        http_listener,
        proxy::build_router(state),
        shutdown_rx.clone(),
    );
    let feed = serve(
        "ws",
        ws_listener,
        ws::ws_router(hub.clone(), &config.ws_path),
        shutdown_rx,
    );

    tracing::info!(%http_addr, "proxy listening");
    tracing::info!(%ws_addr, path = %config.ws_path, "activity feed listening");

    shutdown_signal().await;
    tracing::info!("shutdown signal received");

    hub.close();
    let _ = shutdown_tx.send(true);
    for (name, server) in [("http", http), ("ws", feed)] {
        match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(server = name, error = %e, "server task failed"),
            Err(_) => tracing::warn!(server = name, "server did not stop within grace period"),
        }
    }
    journal.close().await;

    tracing::info!("spindles stopped");
}

async fn bind(addr: SocketAddr) -> TcpListener {
    match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    }
}

fn serve(
    name: &'static str,
    listener: TcpListener,
    app: axum::Router,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(server = name, error = %e, "server error");
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
