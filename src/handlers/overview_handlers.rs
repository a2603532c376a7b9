use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::AppState;
use crate::astro::{dec_to_dms, ra_to_hms};
use crate::db::DbPool;
use crate::dto::{SkyMapPoint, StatsDto};
use crate::errors::ApiError;
use crate::repo;

/// Handler for the sky map
///
/// This function handles GET requests to `/sky-map`. Every plate-solved image
/// becomes one point at its field centre.
#[instrument(skip(pool))]
pub async fn sky_map_handler(State(pool): State<Arc<DbPool>>) -> Result<Json<Vec<SkyMapPoint>>, ApiError> {
    let points: Vec<SkyMapPoint> = repo::list_solved_images(&pool)?
        .into_iter()
        .filter_map(|image| {
            let (ra, dec) = (image.ra?, image.dec?);
            Some(SkyMapPoint {
                image_id: image.id,
                title: image.title,
                object_name: image.object_name,
                ra,
                dec,
                field_radius: image.field_radius,
                ra_hms: ra_to_hms(ra),
                dec_dms: dec_to_dms(dec),
            })
        })
        .collect();
    debug!("Sky map has {} points", points.len());
    Ok(Json(points))
}

/// Handler for gallery statistics
///
/// This function handles GET requests to `/stats`.
#[instrument(skip(pool))]
pub async fn stats_handler(State(pool): State<Arc<DbPool>>) -> Result<Json<StatsDto>, ApiError> {
    let images = repo::count_image_stats(&pool)?;
    let jobs = repo::count_jobs_by_status(&pool)?;

    Ok(Json(StatsDto {
        total_images: images.total,
        plate_solved: images.plate_solved,
        favorites: images.favorites,
        equipment: repo::count_equipment(&pool)?,
        tags: repo::count_tags(&pool)?,
        jobs_pending: jobs.pending,
        jobs_processing: jobs.processing,
        jobs_success: jobs.success,
        jobs_failed: jobs.failed,
        latest_capture: images.latest_capture,
    }))
}

/// Liveness and database check
pub async fn health_handler(State(pool): State<Arc<DbPool>>) -> Response {
    match pool.get() {
        Ok(_) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => {
            warn!("Health check could not reach the database: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}

/// Server-sent event stream of sync, job and image changes
pub async fn events_handler(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Event subscriber connected");
    state.events.sse_response()
}
