//! Common test utilities for API tests.

use std::sync::Arc;
use std::time::Duration;

use rrbridge_api::ServerState;
use rrbridge_testing::{bridge_service, SimulatedConnector};

/// Command window used by API tests; short so timeouts stay fast.
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(200);

/// Server state over a fresh simulated fleet.
pub fn create_test_server_state() -> (ServerState, SimulatedConnector) {
    let connector = SimulatedConnector::new();
    let service = bridge_service(&connector, COMMAND_TIMEOUT, COMMAND_TIMEOUT);
    (ServerState::new(Arc::new(service)), connector)
}
