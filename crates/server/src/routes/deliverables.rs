use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use serde_json::json;
use services::services::deliverable_sync::DeliverableSyncError;
use tracing::instrument;
use uuid::Uuid;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/deliverables/trello-sync", post(sync_deliverables))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDeliverablesRequest {
    pub deliverable_ids: Vec<Uuid>,
    pub tax_season_id: Uuid,
}

#[instrument(
    name = "deliverables.trello_sync",
    skip(state, payload),
    fields(
        num_deliverables = payload.deliverable_ids.len(),
        tax_season_id = %payload.tax_season_id
    )
)]
pub async fn sync_deliverables(
    State(state): State<AppState>,
    Json(payload): Json<SyncDeliverablesRequest>,
) -> Response {
    match state
        .sync()
        .sync_deliverables(&payload.deliverable_ids, payload.tax_season_id)
        .await
    {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => sync_error_response(&error, "failed to sync deliverables"),
    }
}

// A batch-level failure (the board lookup itself) is the only error that
// reaches the caller; per-deliverable failures ride back in the summary.
fn sync_error_response(error: &DeliverableSyncError, context: &str) -> Response {
    tracing::error!(?error, "{context}");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": error.to_string() })),
    )
        .into_response()
}
