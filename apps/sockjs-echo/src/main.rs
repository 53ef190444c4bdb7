mod cli;
mod config;
mod telemetry;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use sockjs::{Conn, Handler};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::{cli::Cli, config::AppConfig, telemetry::init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().apply_cli(&cli);
    init_tracing(&config.log_filter);
    anyhow::ensure!(
        config.prefix != "/close",
        "prefix /close is reserved for the close endpoint"
    );

    let options = config.options();
    info!(
        addr = %config.bind_addr,
        prefix = %config.prefix,
        websocket = options.websocket,
        heartbeat_secs = options.heartbeat_delay.as_secs(),
        disconnect_secs = options.disconnect_delay.as_secs(),
        response_limit = options.response_limit,
        "starting sockjs echo server"
    );

    let echo = Handler::new(options.clone(), echo);
    let close = Handler::new(options, close_immediately);
    let app = Router::new()
        .nest(&config.prefix, echo.router())
        .nest("/close", close.router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "sockjs echo listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn echo(conn: Conn) {
    debug!(session = %conn.id(), "echo session opened");
    while let Ok(message) = conn.recv().await {
        if conn.send(message).is_err() {
            break;
        }
    }
    debug!(session = %conn.id(), "echo session finished");
}

async fn close_immediately(conn: Conn) {
    let _ = conn.close(3000, "Go away!");
}
