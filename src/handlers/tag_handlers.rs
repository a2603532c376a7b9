use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::db::DbPool;
use crate::dto::CreateTagDto;
use crate::errors::ApiError;
use crate::handlers::image_handlers::require_image;
use crate::models::{Tag, normalize_tag_name};
use crate::repo;

/// Handler for creating a new tag
///
/// This function handles POST requests to `/tags`.
///
/// ### Arguments
///
/// * `pool` - The database connection pool
/// * `payload` - The request payload containing the tag name
///
/// ### Returns
///
/// The newly created tag as JSON, 400 for a blank name or 409 if a tag with
/// the same name (ignoring case) exists
#[instrument(skip(pool), fields(name = %payload.name))]
pub async fn create_tag_handler(
    State(pool): State<Arc<DbPool>>,
    Json(payload): Json<CreateTagDto>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let name = normalize_tag_name(&payload.name)
        .ok_or_else(|| ApiError::BadRequest("Tag name must not be blank".to_string()))?;

    if repo::get_tag_by_name(&pool, &name)?.is_some() {
        return Err(ApiError::Conflict(format!("Tag '{}' already exists", name)));
    }

    let tag = repo::create_tag(&pool, name).map_err(ApiError::Database)?;
    info!("Created tag with id: {}", tag.get_id());

    Ok((StatusCode::CREATED, Json(tag)))
}

/// Handler for listing all tags
///
/// This function handles GET requests to `/tags`.
#[instrument(skip(pool))]
pub async fn list_tags_handler(State(pool): State<Arc<DbPool>>) -> Result<Json<Vec<Tag>>, ApiError> {
    let tags = repo::list_tags(&pool).map_err(ApiError::Database)?;
    debug!("Retrieved {} tags", tags.len());
    Ok(Json(tags))
}

/// Handler for listing the tags of an image
///
/// This function handles GET requests to `/images/{id}/tags`.
#[instrument(skip(pool))]
pub async fn list_image_tags_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Tag>>, ApiError> {
    require_image(&pool, &id)?;
    let tags = repo::list_tags_for_image(&pool, &id).map_err(ApiError::Database)?;
    Ok(Json(tags))
}

/// Handler for adding a tag to an image
///
/// This function handles PUT requests to `/images/{id}/tags/{tag_id}`.
/// Adding a tag the image already has is a no-op.
///
/// ### Returns
///
/// 204 No Content, or 404 if the image or the tag does not exist
#[instrument(skip(pool))]
pub async fn add_tag_to_image_handler(
    State(pool): State<Arc<DbPool>>,
    Path((image_id, tag_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    require_image(&pool, &image_id)?;
    repo::get_tag(&pool, &tag_id)?.ok_or(ApiError::NotFound("Tag"))?;

    repo::add_tag_to_image(&pool, &image_id, &tag_id).map_err(ApiError::Database)?;
    info!("Added tag {} to image {}", tag_id, image_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for removing a tag from an image
///
/// This function handles DELETE requests to `/images/{id}/tags/{tag_id}`.
///
/// ### Returns
///
/// 204 No Content, or 404 if the image does not carry the tag
#[instrument(skip(pool))]
pub async fn remove_tag_from_image_handler(
    State(pool): State<Arc<DbPool>>,
    Path((image_id, tag_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    if repo::remove_tag_from_image(&pool, &image_id, &tag_id)? {
        info!("Removed tag {} from image {}", tag_id, image_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Tag link"))
    }
}
