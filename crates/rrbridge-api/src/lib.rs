//! HTTP control surface for the device bridge.
//!
//! Endpoints:
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | POST | `/init` | `{user_id, rriot}` |
//! | POST | `/command` | `{user_id, device_id, local_key, command, params?}` |
//! | GET | `/health` | |
//! | POST | `/disconnect` | `{user_id}` |
//! | POST | `/shutdown` | |
//!
//! Every handler answers with JSON; input problems are HTTP 400, core
//! failures are HTTP 200 with `success: false`.

pub mod handlers;
pub mod models;
pub mod server;
pub mod shutdown;

pub use server::{create_router, run, ServerState};
