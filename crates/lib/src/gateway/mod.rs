//! Gateway: liveness endpoint, Telegram webhook route, and process wiring.
//!
//! Single port serves `GET /` (static alive text for host health checks) and
//! `POST /telegram/webhook` (used only when a webhook URL is configured).

mod server;

pub use server::{router, run_gateway, GatewayState, LIVENESS_TEXT};
