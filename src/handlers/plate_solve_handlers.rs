use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::AppState;
use crate::db::DbPool;
use crate::dto::{BulkPlateSolveDto, BulkPlateSolveResult, JobQueryDto};
use crate::errors::ApiError;
use crate::handlers::image_handlers::require_image;
use crate::models::{JobStatus, PlateSolvingJob};
use crate::repo;
use crate::services::plate_solver;

/// Handler for queueing one image for plate solving
///
/// This function handles POST requests to `/images/{id}/plate-solve`.
///
/// ### Returns
///
/// 202 Accepted with the pending job; 404 for an unknown image, 503 when
/// plate solving is disabled and 409 when the image is already queued
#[instrument(skip(state))]
pub async fn enqueue_plate_solve_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<PlateSolvingJob>), ApiError> {
    let settings = state.settings()?;
    let job = plate_solver::enqueue_image(&state.pool, &settings, &state.events, &id)?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// Handler for queueing many images at once
///
/// This function handles POST requests to `/plate-solve/bulk`.
#[instrument(skip(state, payload), fields(count = payload.image_ids.len(), all_unsolved = payload.all_unsolved))]
pub async fn bulk_plate_solve_handler(
    State(state): State<AppState>,
    Json(payload): Json<BulkPlateSolveDto>,
) -> Result<(StatusCode, Json<BulkPlateSolveResult>), ApiError> {
    if payload.image_ids.is_empty() && !payload.all_unsolved {
        return Err(ApiError::BadRequest("Provide image_ids or set all_unsolved".to_string()));
    }
    let settings = state.settings()?;
    let result = plate_solver::enqueue_bulk(
        &state.pool,
        &settings,
        &state.events,
        &payload.image_ids,
        payload.all_unsolved,
    )?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}

/// Handler for listing jobs
///
/// This function handles GET requests to `/plate-solve/jobs?status=`.
#[instrument(skip(pool))]
pub async fn list_jobs_handler(
    State(pool): State<Arc<DbPool>>,
    Query(query): Query<JobQueryDto>,
) -> Result<Json<Vec<PlateSolvingJob>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let jobs = repo::list_jobs(&pool, status)?;
    debug!("Retrieved {} jobs", jobs.len());
    Ok(Json(jobs))
}

/// Handler for getting one job
///
/// This function handles GET requests to `/plate-solve/jobs/{id}`.
#[instrument(skip(pool))]
pub async fn get_job_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<Json<PlateSolvingJob>, ApiError> {
    let job = repo::get_job(&pool, &id)?.ok_or(ApiError::NotFound("Job"))?;
    Ok(Json(job))
}

/// Handler for retrying a failed job
///
/// This function handles POST requests to `/plate-solve/jobs/{id}/retry`.
/// Only failed jobs can be retried; the attempt count starts over.
#[instrument(skip(state))]
pub async fn retry_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlateSolvingJob>, ApiError> {
    let job = plate_solver::retry_job(&state.pool, &state.events, &id)?;
    Ok(Json(job))
}

/// Handler for listing the jobs of one image, newest first
///
/// This function handles GET requests to `/images/{id}/jobs`.
#[instrument(skip(pool))]
pub async fn list_image_jobs_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PlateSolvingJob>>, ApiError> {
    require_image(&pool, &id)?;
    Ok(Json(repo::list_jobs_for_image(&pool, &id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_app;
    use crate::models::SettingsUpdate;
    use crate::test_utils::{insert_test_image, setup_test_state};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn enable_solving(state: &AppState) {
        repo::save_settings(
            &state.pool,
            &SettingsUpdate {
                astrometry_api_key: Some("nova-key".to_string()),
                astrometry_enabled: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
    }

    fn post(uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().uri(uri).method("POST");
        match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_requires_astrometry() {
        let state = setup_test_state();
        let image = insert_test_image(&state.pool, "a1", "M42.jpg");

        let response = create_app(state)
            .oneshot(post(&format!("/images/{}/plate-solve", image.id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_key_saved_from_admin_panel_enables_enqueue() {
        let state = setup_test_state();
        let image = insert_test_image(&state.pool, "a1", "M42.jpg");
        let app = create_app(state);

        let request = Request::builder()
            .uri("/admin/settings")
            .method("PUT")
            .header("Content-Type", "application/json")
            .body(Body::from(json!({"astrometry_api_key": "nova-key-1234"}).to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["astrometry_enabled"], true);

        let response = app
            .oneshot(post(&format!("/images/{}/plate-solve", image.id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_enqueue_then_conflict() {
        let state = setup_test_state();
        enable_solving(&state);
        let image = insert_test_image(&state.pool, "a1", "M42.jpg");
        let app = create_app(state);
        let uri = format!("/images/{}/plate-solve", image.id);

        let response = app.clone().oneshot(post(&uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let job = body_json(response).await;
        assert_eq!(job["status"], "pending");
        assert_eq!(job["image_id"], image.id);

        let response = app.clone().oneshot(post(&uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app.oneshot(post("/images/missing/plate-solve", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bulk_enqueue() {
        let state = setup_test_state();
        enable_solving(&state);
        insert_test_image(&state.pool, "a1", "M42.jpg");
        insert_test_image(&state.pool, "a2", "M31.jpg");
        let app = create_app(state);

        let response = app
            .clone()
            .oneshot(post("/plate-solve/bulk", Some(json!({"all_unsolved": true}))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let result = body_json(response).await;
        assert_eq!(result["enqueued"].as_array().unwrap().len(), 2);

        let response = app.oneshot(post("/plate-solve/bulk", Some(json!({})))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_and_get_jobs() {
        let state = setup_test_state();
        let image = insert_test_image(&state.pool, "a1", "M42.jpg");
        let job = repo::create_job_if_idle(&state.pool, &image.id).unwrap().unwrap();
        let app = create_app(state);

        let request = Request::builder().uri("/plate-solve/jobs?status=pending").body(Body::empty()).unwrap();
        let jobs = body_json(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(jobs.as_array().unwrap().len(), 1);

        let request = Request::builder().uri("/plate-solve/jobs?status=failed").body(Body::empty()).unwrap();
        let jobs = body_json(app.clone().oneshot(request).await.unwrap()).await;
        assert!(jobs.as_array().unwrap().is_empty());

        let request = Request::builder().uri("/plate-solve/jobs?status=bogus").body(Body::empty()).unwrap();
        assert_eq!(app.clone().oneshot(request).await.unwrap().status(), StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .uri(format!("/plate-solve/jobs/{}", job.id))
            .body(Body::empty())
            .unwrap();
        let fetched = body_json(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(fetched["id"], job.id);

        let request = Request::builder()
            .uri(format!("/images/{}/jobs", image.id))
            .body(Body::empty())
            .unwrap();
        let jobs = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(jobs[0]["id"], job.id);
    }

    #[tokio::test]
    async fn test_retry_failed_job() {
        let state = setup_test_state();
        let image = insert_test_image(&state.pool, "a1", "M42.jpg");
        let job = repo::create_job_if_idle(&state.pool, &image.id).unwrap().unwrap();
        let app = create_app(state.clone());
        let uri = format!("/plate-solve/jobs/{}/retry", job.id);

        let response = app.clone().oneshot(post(&uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        repo::mark_failed(&state.pool, &job, "boom", true).unwrap();
        let response = app.oneshot(post(&uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let retried = body_json(response).await;
        assert_eq!(retried["status"], "pending");
        assert_eq!(retried["attempts"], 0);
    }
}
