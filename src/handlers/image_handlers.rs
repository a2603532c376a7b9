use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::Query as MultiQuery;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::AppState;
use crate::astro::{dec_to_dms, ra_to_hms};
use crate::db::DbPool;
use crate::dto::{ImageDetail, ImageQueryDto, PagedImages, ThumbnailQueryDto, UpdateImageDto};
use crate::errors::ApiError;
use crate::immich::ImmichClient;
use crate::models::{Image, JobStatus};
use crate::repo;
use crate::services::events::SkyEvent;
use crate::services::xmp;

/// Handler for listing images
///
/// This function handles GET requests to `/images`.
///
/// ### Arguments
///
/// * `pool` - The database connection pool
/// * `query` - Filters, sort order and page; `tag_ids` may repeat
///
/// ### Returns
///
/// One page of matching images and the total match count
#[instrument(skip(pool), fields(query = %query))]
pub async fn list_images_handler(
    State(pool): State<Arc<DbPool>>,
    MultiQuery(query): MultiQuery<ImageQueryDto>,
) -> Result<Json<PagedImages>, ApiError> {
    debug!("Listing images");

    if let (Some(after), Some(before)) = (query.captured_after, query.captured_before) {
        if after > before {
            return Err(ApiError::BadRequest("captured_after must not be later than captured_before".to_string()));
        }
    }

    let (images, total) = repo::list_images(&pool, &query).map_err(ApiError::Database)?;

    Ok(Json(PagedImages {
        images,
        total,
        page: query.page(),
        page_size: query.page_size(),
    }))
}

/// Loads an image or fails with 404
pub(crate) fn require_image(pool: &DbPool, image_id: &str) -> Result<Image, ApiError> {
    repo::get_image(pool, image_id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Image"))
}

/// Handler for getting one image with everything linked to it
///
/// This function handles GET requests to `/images/{id}`.
///
/// ### Returns
///
/// The image with its tags, equipment, latest plate-solve job and formatted
/// coordinates
#[instrument(skip(pool))]
pub async fn get_image_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<Json<ImageDetail>, ApiError> {
    let image = require_image(&pool, &id)?;

    let tags = repo::list_tags_for_image(&pool, &id)?;
    let equipment = repo::list_equipment_for_image(&pool, &id)?;
    let latest_job = repo::latest_job_for_image(&pool, &id)?;

    Ok(Json(ImageDetail {
        ra_hms: image.ra.map(ra_to_hms),
        dec_dms: image.dec.map(dec_to_dms),
        image,
        tags,
        equipment,
        latest_job,
    }))
}

/// Handler for editing an image's title, description, object name or favorite flag
///
/// This function handles PATCH requests to `/images/{id}`.
#[instrument(skip(state, payload))]
pub async fn update_image_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateImageDto>,
) -> Result<Json<Image>, ApiError> {
    require_image(&state.pool, &id)?;
    if payload.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }
    if payload.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("Title must not be blank".to_string()));
    }

    let image = repo::update_image(&state.pool, &id, payload)?;
    info!("Updated image {}", image.id);

    state.events.publish(SkyEvent::ImageUpdated { image: image.clone() });
    Ok(Json(image))
}

/// Handler for deleting an image
///
/// This function handles DELETE requests to `/images/{id}`. Only the local
/// record goes away; the asset stays in Immich and returns on the next sync.
///
/// ### Returns
///
/// 204 No Content, or 404 if the image does not exist
#[instrument(skip(pool))]
pub async fn delete_image_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if repo::delete_image(&pool, &id)? {
        info!("Deleted image {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Image"))
    }
}

/// Handler proxying an image thumbnail from Immich
///
/// This function handles GET requests to `/images/{id}/thumbnail?size=`.
#[instrument(skip(state))]
pub async fn image_thumbnail_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ThumbnailQueryDto>,
) -> Result<Response, ApiError> {
    let size = query.size.as_deref().unwrap_or("thumbnail");
    if !matches!(size, "thumbnail" | "preview") {
        return Err(ApiError::BadRequest(format!("Unknown thumbnail size: {}", size)));
    }

    let image = require_image(&state.pool, &id)?;
    let settings = state.settings()?;
    let client = ImmichClient::from_settings(state.http.clone(), &settings)
        .map_err(|_| ApiError::Unavailable("Immich is not configured".to_string()))?;

    let (content_type, bytes) = client.thumbnail(&image.immich_id, size).await?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "private, max-age=86400".to_string()),
        ],
        bytes,
    )
        .into_response())
}

/// Handler rendering the XMP sidecar of a plate-solved image
///
/// This function handles GET requests to `/images/{id}/sidecar`.
///
/// ### Returns
///
/// The XMP packet, or 404 if the image is unknown or not plate solved
#[instrument(skip(pool))]
pub async fn image_sidecar_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let image = require_image(&pool, &id)?;
    let tags = repo::list_tags_for_image(&pool, &id)?;
    let remote_job_id = repo::list_jobs_for_image(&pool, &id)?
        .into_iter()
        .find(|job| job.status == JobStatus::Success)
        .and_then(|job| job.remote_job_id);

    let packet = xmp::render_sidecar(&image, &tags, remote_job_id).ok_or(ApiError::NotFound("Plate solution"))?;
    Ok(([(header::CONTENT_TYPE, "application/rdf+xml")], packet).into_response())
}
