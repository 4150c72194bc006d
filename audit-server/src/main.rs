//! audit-server binary
//!
//! Serves the realtime gateway and admin API, records its own lifecycle as
//! system audit entries, and drains the audit queue on Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use audit_server::gateway::RealtimeGateway;
use audit_server::tasks::{BackgroundTasks, TaskKind};
use audit_server::{AppState, BoxError, Config, Outcome, api, logger};
use shared::Details;
use shared::audit::SystemAction;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    logger::init_logger(&config.log_level, config.log_json, config.log_dir.as_deref())?;

    tracing::info!("Starting audit-server (env: {})", config.environment);

    let state = AppState::from_config(&config).await?;

    let mut tasks = BackgroundTasks::new();
    let recorder = state.recorder.clone();
    let token = tasks.shutdown_token();
    tasks.spawn("audit_periodic_flush", TaskKind::Periodic, async move {
        recorder.run_periodic_flush(token).await;
    });
    tasks.log_summary();

    record_lifecycle(&state, SystemAction::Startup, &config).await;

    let app = api::create_router(state.clone());
    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("audit-server HTTP listening on {http_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state.gateway.clone()))
    .await?;

    let stopped_early = tasks.check_health();
    if stopped_early > 0 {
        tracing::warn!(stopped_early, "Background tasks ended before shutdown");
    }

    record_lifecycle(&state, SystemAction::Shutdown, &config).await;
    state.recorder.shutdown().await;
    tasks.shutdown().await;

    tracing::info!("audit-server stopped");
    Ok(())
}

/// Wait for Ctrl-C, then close every realtime connection so the server can drain
async fn shutdown_signal(gateway: Arc<RealtimeGateway>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    gateway.shutdown();
}

async fn record_lifecycle(state: &AppState, action: SystemAction, config: &Config) {
    let mut details = Details::new();
    details.insert("version".into(), env!("CARGO_PKG_VERSION").into());
    details.insert("environment".into(), config.environment.clone().into());
    if let Err(e) = state.recorder.system(action, details, Outcome::success()).await {
        tracing::warn!(error = %e, "Failed to record lifecycle event");
    }
}
