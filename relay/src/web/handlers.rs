//! Webhook endpoint handlers.
//!
//! The Looker handler runs the whole delivery inline:
//! 1. Verify the Looker headers
//! 2. Parse the JSON body
//! 3. Relay the attachment to storage
//! 4. Return the outcome

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::archive::ArchiveLimits;
use crate::dashboards::DashboardConfig;
use crate::delivery::deliver;
use crate::error::RelayError;
use crate::payload::LookerPayload;
use crate::storage::StorageClient;
use crate::web::auth::verify_looker_headers;
use crate::Settings;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub dashboards: Arc<DashboardConfig>,
    pub storage: StorageClient,
}

impl AppState {
    pub fn new(settings: Settings, dashboards: DashboardConfig, storage: StorageClient) -> Self {
        Self {
            settings: Arc::new(settings),
            dashboards: Arc::new(dashboards),
            storage,
        }
    }

    fn archive_limits(&self) -> ArchiveLimits {
        ArchiveLimits {
            max_entries: self.settings.max_archive_entries,
            max_total_bytes: self.settings.max_archive_bytes,
        }
    }
}

/// Build the relay router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.settings.max_body_bytes;

    Router::new()
        .route("/", post(looker_webhook))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Looker Webhook
// =============================================================================

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<usize>,
}

/// Looker webhook endpoint.
///
/// Responds 200 once every matching archive entry has been uploaded, 401 on
/// bad headers, 501 when no dashboard is configured for the plan title and
/// 400 for anything wrong with the payload or the uploads.
pub async fn looker_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>), RelayError> {
    if !verify_looker_headers(&state.settings.credentials, &headers) {
        return Err(RelayError::Unauthorized);
    }

    let payload: LookerPayload = serde_json::from_slice(&body)?;

    info!(
        dashboard = %payload.scheduled_plan.title,
        scheduled_plan_id = ?payload.scheduled_plan.scheduled_plan_id,
        extension = %payload.attachment.extension,
        mimetype = %payload.attachment.mimetype,
        data_length = payload.attachment.data.len(),
        "looker_webhook_received"
    );

    let report = deliver(
        &state.dashboards,
        &state.storage,
        state.archive_limits(),
        &payload,
    )
    .await?;

    Ok((
        StatusCode::OK,
        Json(WebhookResponse {
            status: "delivered",
            uploaded: Some(report.uploaded.len()),
        }),
    ))
}
