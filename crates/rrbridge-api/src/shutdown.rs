//! Graceful shutdown handling for the control server.

use std::time::Duration;

use crate::server::ServerState;

/// Upper bound on closing all sessions during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Close every session before the process exits.
pub async fn cleanup_resources(state: &ServerState) {
    tracing::info!("Cleaning up resources...");

    let service = state.service.clone();
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, service.shutdown()).await {
        Ok(closed) => tracing::info!("Closed {} session(s)", closed),
        Err(_) => tracing::warn!(
            "Session teardown did not finish within {}s",
            SHUTDOWN_TIMEOUT.as_secs()
        ),
    }

    let uptime = chrono::Utc::now().timestamp() - state.started_at;
    tracing::info!("Server uptime: {} seconds", uptime);
}
