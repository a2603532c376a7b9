use axum::{Json, extract::State};
use tracing::{info, instrument};

use crate::AppState;
use crate::errors::ApiError;
use crate::services::sync::{self, SyncReport};

/// Handler for syncing the gallery with Immich
///
/// This function handles POST requests to `/sync` and waits for the scan to
/// finish.
///
/// ### Returns
///
/// The sync report, 409 if a sync is already running or 503 if Immich is
/// not configured
#[instrument(skip(state))]
pub async fn sync_handler(State(state): State<AppState>) -> Result<Json<SyncReport>, ApiError> {
    let report = sync::run_sync(&state).await?;
    info!(
        "Manual sync finished: {} scanned, {} created, {} removed",
        report.scanned, report.created, report.removed
    );
    Ok(Json(report))
}
