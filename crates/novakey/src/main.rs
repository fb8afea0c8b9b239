//! NovaKey gateway - HTTP front end for PostgreSQL procedures.

mod config;
mod routes;
mod server;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use novakey_core::logging::{init_logging, log_dir, LogConfig};
use novakey_core::{EndpointConfig, Gateway, GatewayContext};

use crate::config::ServerConfig;
use crate::server::{create_router, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    let _logging_guard = init_logging(LogConfig::new(log_dir()));

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "NovaKey stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let endpoint = EndpointConfig::from_env().context("Failed to load endpoint configuration")?;
    let server_config = ServerConfig::from_env()?;

    tracing::info!(
        environment = %endpoint.environment,
        mode = endpoint.mode.as_str(),
        database = %endpoint.database.display_url(),
        "Starting NovaKey"
    );

    let context = Arc::new(GatewayContext::new(endpoint));

    // Bring up the tunnel and pool before accepting requests
    if let Err(e) = context.connect().await {
        if let Some(hint) = e.hint() {
            tracing::error!(category = e.category(), hint, "Data access bootstrap failed");
        }
        return Err(e).context("Failed to connect to the database");
    }
    if let Some(tunnel) = context.tunnel() {
        tracing::info!(
            local = %tunnel.local_addr(),
            remote = %format!("{}:{}", tunnel.remote_host(), tunnel.remote_port()),
            "Database tunnel ready"
        );
    }

    match context.remote_settings().await {
        Ok(settings) => tracing::debug!(keys = settings.len(), "Remote settings available"),
        Err(e) => tracing::warn!(error = %e, "Remote settings unavailable; will retry on next use"),
    }

    let state = Arc::new(AppState { gateway: Gateway::postgres(Arc::clone(&context)) });
    let app = create_router(state, &server_config)?;

    let listener = tokio::net::TcpListener::bind(server_config.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", server_config.listen))?;
    tracing::info!(address = %server_config.listen, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    if let Some(tunnel) = context.tunnel() {
        let stats = tunnel.stats();
        tracing::info!(
            accepted = stats.accepted,
            failed = stats.failed,
            active = stats.active,
            "Tunnel totals at shutdown"
        );
    }
    tracing::info!("NovaKey stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
