//! HTTP server for the bridge control surface.

pub mod router;
pub mod state;

pub use router::{create_router, MAX_REQUEST_BODY_SIZE};
pub use state::ServerState;

use std::sync::Arc;

use rrbridge_core::BridgeConfig;
use rrbridge_devices::BridgeService;

/// Bind the control surface and serve until a signal or `/shutdown` arrives.
///
/// Every session is closed before this returns. Failing to bind is the only
/// error.
pub async fn run(config: &BridgeConfig, service: Arc<BridgeService>) -> anyhow::Result<()> {
    let state = ServerState::new(service);
    let app = create_router(state.clone());

    let bind = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Bridge listening on http://{}", listener.local_addr()?);

    let stop = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = crate::shutdown::shutdown_signal() => {}
                _ = stop.wait_for_shutdown() => {
                    tracing::info!("Shutdown requested over HTTP");
                }
            }
        })
        .await?;

    crate::shutdown::cleanup_resources(&state).await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
