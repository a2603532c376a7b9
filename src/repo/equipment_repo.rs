use crate::db::{DbPool, with_retry};
use crate::dto::AttachedEquipment;
use crate::models::{Equipment, EquipmentKind, Image, ImageEquipment, JsonValue};
use crate::schema::{equipment, image_equipment, images};
use anyhow::{Result, anyhow};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use tracing::{debug, info, instrument};

/// Changes applied by `PATCH /equipment/{id}`; `None` leaves a column alone
#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = equipment)]
pub struct EquipmentChanges {
    pub name: Option<String>,
    pub kind: Option<EquipmentKind>,
    pub description: Option<Option<String>>,
    pub specifications: Option<JsonValue>,
}

/// Creates a new catalog entry
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `name` - Display name, already validated as non-blank
/// * `kind` - Category of the equipment
/// * `description` - Optional description
/// * `specifications` - Kind-specific specification document
///
/// ### Returns
///
/// The newly created Equipment
#[instrument(skip(pool, description, specifications))]
pub fn create_equipment(
    pool: &DbPool,
    name: String,
    kind: EquipmentKind,
    description: Option<String>,
    specifications: JsonValue,
) -> Result<Equipment> {
    let conn = &mut pool.get()?;
    let new_equipment = Equipment::new(name, kind, description, specifications);
    with_retry(conn, |conn| {
        diesel::insert_into(equipment::table)
            .values(&new_equipment)
            .execute(conn)
    })?;
    info!("Created equipment {}", new_equipment.get_id());
    Ok(new_equipment)
}

/// Retrieves a catalog entry by its ID
pub fn get_equipment(pool: &DbPool, equipment_id: &str) -> Result<Option<Equipment>> {
    let conn = &mut pool.get()?;
    let found = equipment::table
        .find(equipment_id)
        .select(Equipment::as_select())
        .first(conn)
        .optional()?;
    Ok(found)
}

/// Lists the catalog, optionally restricted to one kind, by kind then name
pub fn list_equipment(pool: &DbPool, kind: Option<EquipmentKind>) -> Result<Vec<Equipment>> {
    let conn = &mut pool.get()?;
    let mut query = equipment::table.into_boxed();
    if let Some(kind) = kind {
        query = query.filter(equipment::kind.eq(kind));
    }
    let result = query
        .order((equipment::kind.asc(), equipment::name.asc()))
        .select(Equipment::as_select())
        .load(conn)?;
    Ok(result)
}

pub fn count_equipment(pool: &DbPool) -> Result<i64> {
    let conn = &mut pool.get()?;
    Ok(equipment::table.count().get_result(conn)?)
}

/// Updates a catalog entry
///
/// ### Errors
///
/// Returns an error if the entry does not exist or the update fails
#[instrument(skip(pool, changes))]
pub fn update_equipment(pool: &DbPool, equipment_id: &str, changes: EquipmentChanges) -> Result<Equipment> {
    let conn = &mut pool.get()?;
    let now: NaiveDateTime = Utc::now().naive_utc();
    let updated = with_retry(conn, |conn| {
        diesel::update(equipment::table.find(equipment_id))
            .set((&changes, equipment::updated_at.eq(now)))
            .returning(Equipment::as_returning())
            .get_result(conn)
    })
    .optional()?
    .ok_or_else(|| anyhow!("Equipment not found: {}", equipment_id))?;
    Ok(updated)
}

/// Deletes a catalog entry and its links to images
#[instrument(skip(pool))]
pub fn delete_equipment(pool: &DbPool, equipment_id: &str) -> Result<bool> {
    let conn = &mut pool.get()?;
    let deleted = with_retry(conn, |conn| diesel::delete(equipment::table.find(equipment_id)).execute(conn))?;
    Ok(deleted > 0)
}

/// Attaches equipment to an image, replacing the notes of an existing link
#[instrument(skip(pool, notes))]
pub fn attach_equipment(pool: &DbPool, image_id: &str, equipment_id: &str, notes: Option<String>) -> Result<()> {
    let conn = &mut pool.get()?;
    let link = ImageEquipment::new(image_id.to_string(), equipment_id.to_string(), notes);
    with_retry(conn, |conn| {
        diesel::insert_into(image_equipment::table)
            .values(&link)
            .on_conflict((image_equipment::image_id, image_equipment::equipment_id))
            .do_update()
            .set(image_equipment::notes.eq(&link.notes))
            .execute(conn)
    })?;
    debug!("Attached equipment {} to image {}", equipment_id, image_id);
    Ok(())
}

/// Detaches equipment from an image
///
/// ### Returns
///
/// Whether the link existed
#[instrument(skip(pool))]
pub fn detach_equipment(pool: &DbPool, image_id: &str, equipment_id: &str) -> Result<bool> {
    let conn = &mut pool.get()?;
    let removed = with_retry(conn, |conn| {
        diesel::delete(
            image_equipment::table
                .filter(image_equipment::image_id.eq(image_id))
                .filter(image_equipment::equipment_id.eq(equipment_id)),
        )
        .execute(conn)
    })?;
    Ok(removed > 0)
}

/// Lists the equipment used for an image, with usage notes
pub fn list_equipment_for_image(pool: &DbPool, image_id: &str) -> Result<Vec<AttachedEquipment>> {
    let conn = &mut pool.get()?;
    let rows: Vec<(Equipment, Option<String>)> = equipment::table
        .inner_join(image_equipment::table)
        .filter(image_equipment::image_id.eq(image_id))
        .order((equipment::kind.asc(), equipment::name.asc()))
        .select((Equipment::as_select(), image_equipment::notes))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|(equipment, notes)| AttachedEquipment { equipment, notes })
        .collect())
}

/// Lists images taken with a piece of equipment, newest capture first
pub fn list_images_for_equipment(pool: &DbPool, equipment_id: &str) -> Result<Vec<Image>> {
    let conn = &mut pool.get()?;
    let result = images::table
        .inner_join(image_equipment::table)
        .filter(image_equipment::equipment_id.eq(equipment_id))
        .order(images::capture_date.desc())
        .select(Image::as_select())
        .load(conn)?;
    Ok(result)
}
