use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::db::DbPool;
use crate::dto::{AttachEquipmentDto, AttachedEquipment, CreateEquipmentDto, EquipmentQueryDto, UpdateEquipmentDto};
use crate::errors::ApiError;
use crate::handlers::image_handlers::require_image;
use crate::models::{Equipment, EquipmentKind, Image, JsonValue};
use crate::repo::{self, EquipmentChanges};

fn parse_kind(kind: &str) -> Result<EquipmentKind, ApiError> {
    kind.parse::<EquipmentKind>().map_err(ApiError::BadRequest)
}

fn valid_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Equipment name must not be blank".to_string()));
    }
    Ok(name.to_string())
}

fn valid_specifications(specifications: JsonValue) -> Result<JsonValue, ApiError> {
    if !specifications.0.is_object() {
        return Err(ApiError::BadRequest("Specifications must be a JSON object".to_string()));
    }
    Ok(specifications)
}

fn require_equipment(pool: &DbPool, equipment_id: &str) -> Result<Equipment, ApiError> {
    repo::get_equipment(pool, equipment_id)?.ok_or(ApiError::NotFound("Equipment"))
}

/// Handler for creating a catalog entry
///
/// This function handles POST requests to `/equipment`.
///
/// ### Arguments
///
/// * `pool` - The database connection pool
/// * `payload` - Name, kind, description and specifications
///
/// ### Returns
///
/// The new entry, or 400 if the name is blank, the kind unknown or the
/// specifications not an object
#[instrument(skip(pool, payload), fields(name = %payload.name, kind = %payload.kind))]
pub async fn create_equipment_handler(
    State(pool): State<Arc<DbPool>>,
    Json(payload): Json<CreateEquipmentDto>,
) -> Result<(StatusCode, Json<Equipment>), ApiError> {
    let name = valid_name(&payload.name)?;
    let kind = parse_kind(&payload.kind)?;
    let specifications = valid_specifications(payload.specifications.unwrap_or_default())?;
    let description = payload.description.filter(|d| !d.trim().is_empty());

    let equipment = repo::create_equipment(&pool, name, kind, description, specifications)?;
    Ok((StatusCode::CREATED, Json(equipment)))
}

/// Handler for listing the catalog
///
/// This function handles GET requests to `/equipment?kind=`.
#[instrument(skip(pool))]
pub async fn list_equipment_handler(
    State(pool): State<Arc<DbPool>>,
    Query(query): Query<EquipmentQueryDto>,
) -> Result<Json<Vec<Equipment>>, ApiError> {
    let kind = query.kind.as_deref().map(parse_kind).transpose()?;
    let entries = repo::list_equipment(&pool, kind)?;
    debug!("Retrieved {} equipment entries", entries.len());
    Ok(Json(entries))
}

/// Handler for getting one catalog entry
///
/// This function handles GET requests to `/equipment/{id}`.
#[instrument(skip(pool))]
pub async fn get_equipment_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<Json<Equipment>, ApiError> {
    Ok(Json(require_equipment(&pool, &id)?))
}

/// Handler for editing a catalog entry
///
/// This function handles PATCH requests to `/equipment/{id}`.
#[instrument(skip(pool, payload))]
pub async fn update_equipment_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateEquipmentDto>,
) -> Result<Json<Equipment>, ApiError> {
    require_equipment(&pool, &id)?;

    let changes = EquipmentChanges {
        name: payload.name.as_deref().map(valid_name).transpose()?,
        kind: payload.kind.as_deref().map(parse_kind).transpose()?,
        description: payload
            .description
            .map(|d| Some(d.trim().to_string()).filter(|d| !d.is_empty())),
        specifications: payload.specifications.map(valid_specifications).transpose()?,
    };

    let equipment = repo::update_equipment(&pool, &id, changes)?;
    info!("Updated equipment {}", equipment.get_id());
    Ok(Json(equipment))
}

/// Handler for deleting a catalog entry and its image links
///
/// This function handles DELETE requests to `/equipment/{id}`.
#[instrument(skip(pool))]
pub async fn delete_equipment_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if repo::delete_equipment(&pool, &id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Equipment"))
    }
}

/// Handler for listing the images taken with a piece of equipment
///
/// This function handles GET requests to `/equipment/{id}/images`.
#[instrument(skip(pool))]
pub async fn list_equipment_images_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Image>>, ApiError> {
    require_equipment(&pool, &id)?;
    Ok(Json(repo::list_images_for_equipment(&pool, &id)?))
}

/// Handler for attaching equipment to an image
///
/// This function handles PUT requests to `/images/{id}/equipment/{equipment_id}`.
/// The body is optional; sending it again replaces the notes.
///
/// ### Returns
///
/// The equipment as attached, with its notes
#[instrument(skip(pool, payload))]
pub async fn attach_equipment_handler(
    State(pool): State<Arc<DbPool>>,
    Path((image_id, equipment_id)): Path<(String, String)>,
    payload: Option<Json<AttachEquipmentDto>>,
) -> Result<Json<AttachedEquipment>, ApiError> {
    require_image(&pool, &image_id)?;
    let equipment = require_equipment(&pool, &equipment_id)?;
    let notes = payload
        .and_then(|Json(body)| body.notes)
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    repo::attach_equipment(&pool, &image_id, &equipment_id, notes.clone())?;
    info!("Attached equipment {} to image {}", equipment_id, image_id);
    Ok(Json(AttachedEquipment { equipment, notes }))
}

/// Handler for detaching equipment from an image
///
/// This function handles DELETE requests to `/images/{id}/equipment/{equipment_id}`.
#[instrument(skip(pool))]
pub async fn detach_equipment_handler(
    State(pool): State<Arc<DbPool>>,
    Path((image_id, equipment_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    if repo::detach_equipment(&pool, &image_id, &equipment_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Equipment link"))
    }
}
