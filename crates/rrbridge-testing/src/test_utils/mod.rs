//! Helpers for building isolated bridge fixtures.
//!
//! Ids are unique per process so tests can share one fleet and still run in
//! parallel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rrbridge_core::{RriotCredentials, RriotReference};
use rrbridge_devices::{BridgeService, V1Codec};
use serde_json::{json, Value};

use crate::fleet::SimulatedConnector;

/// Global counter for generating unique test ids
static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 16-byte device key accepted by the wire codec.
pub const LOCAL_KEY: &str = "abcdefghijklmnop";

/// Get a unique test id for this test run
pub fn test_id() -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_{}", id)
}

pub fn unique_user_id() -> String {
    format!("user_{}", test_id())
}

pub fn unique_device_id() -> String {
    format!("device_{}", test_id())
}

/// Credentials for a simulated account. `account` becomes the channel realm.
pub fn sample_credentials(account: &str) -> RriotCredentials {
    RriotCredentials {
        u: account.to_string(),
        s: format!("{account}-secret"),
        h: format!("{account}-hmac"),
        k: format!("{account}-key"),
        r: RriotReference {
            a: "https://api.example.com".to_string(),
            m: Some("ssl://mqtt.example.com:8883".to_string()),
            l: Some("eu".to_string()),
        },
    }
}

/// The same credentials as loosely-typed JSON, as clients send them.
pub fn sample_credentials_json(account: &str) -> Value {
    json!({
        "u": account,
        "s": format!("{account}-secret"),
        "h": format!("{account}-hmac"),
        "k": format!("{account}-key"),
        "r": {
            "a": "https://api.example.com",
            "m": "ssl://mqtt.example.com:8883",
            "l": "eu"
        }
    })
}

/// A bridge over `connector` with the real codec and the given timeouts.
pub fn bridge_service(
    connector: &SimulatedConnector,
    command_timeout: Duration,
    status_timeout: Duration,
) -> BridgeService {
    BridgeService::with_timeouts(
        Arc::new(connector.clone()),
        Arc::new(V1Codec::new()),
        command_timeout,
        status_timeout,
    )
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
