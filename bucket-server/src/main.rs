#![forbid(unsafe_code)]

use std::sync::Arc;

use bucket_limit::Limiter;
use bucket_server::app;
use bucket_server::config::Cli;
use bucket_server::spawn_sweeper;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let config = match cli.limiter_config() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid rate limiter configuration");
            std::process::exit(1);
        }
    };

    let limiter = Arc::new(Limiter::new(config));
    let _sweeper = spawn_sweeper(Arc::clone(&limiter), cli.sweep_interval);

    let listener = match TcpListener::bind(cli.listen).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, listen = %cli.listen, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(listen = %cli.listen, algorithm = %config.algorithm(), "listening");

    if let Err(err) = axum::serve(listener, app(limiter))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(%err, "server exited with error");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}
