//! Shared state handed to every handler.

use std::sync::Arc;

use rrbridge_devices::BridgeService;
use tokio::sync::watch;

#[derive(Clone)]
pub struct ServerState {
    pub service: Arc<BridgeService>,
    /// Flipped to `true` by `/shutdown`
    shutdown: Arc<watch::Sender<bool>>,
    /// Unix timestamp of server start
    pub started_at: i64,
}

impl ServerState {
    pub fn new(service: Arc<BridgeService>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            service,
            shutdown: Arc::new(shutdown),
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Ask the server to stop accepting requests and exit.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once [`ServerState::request_shutdown`] has been called.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown.subscribe();
        // The sender lives as long as `self`, so this only ends on `true`.
        let _ = rx.wait_for(|requested| *requested).await;
    }
}
