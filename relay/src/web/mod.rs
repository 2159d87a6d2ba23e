//! Web server module for handling Looker webhooks.
//!
//! This module provides:
//! - Header-based webhook authentication
//! - The delivery endpoint and a health check
//! - Router construction shared by the binary and the integration tests

pub mod auth;
pub mod handlers;

pub use auth::verify_looker_headers;
pub use handlers::{health, looker_webhook, router, AppState, HealthResponse, WebhookResponse};
