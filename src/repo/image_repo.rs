use std::collections::HashSet;

use anyhow::{Result, anyhow};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use tracing::{debug, info, instrument};

use crate::db::{DbPool, with_retry};
use crate::dto::{ImageQueryDto, ImageSort, UpdateImageDto};
use crate::immich::ImmichAsset;
use crate::models::{Image, ImmichMetadata};
use crate::schema::{image_equipment, image_tags, images};

/// How an Immich asset was merged into the gallery
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(Image),
    Updated(Image),
}

impl UpsertOutcome {
    pub fn image(&self) -> &Image {
        match self {
            UpsertOutcome::Created(image) | UpsertOutcome::Updated(image) => image,
        }
    }
}

/// User edits applied by `PATCH /images/{id}`
///
/// The outer `Option` means "leave alone"; `Some(None)` writes NULL.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = images)]
struct ImageEdit {
    title: Option<String>,
    description: Option<Option<String>>,
    object_name: Option<Option<String>>,
    favorite: Option<bool>,
    favorite_set_locally: Option<bool>,
    updated_at: chrono::NaiveDateTime,
}

fn blank_to_none(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/// Inserts a new image
///
/// ### Errors
///
/// Returns an error if the `immich_id` is already present or the insert fails.
#[instrument(skip(pool, image), fields(immich_id = %image.immich_id))]
pub fn insert_image(pool: &DbPool, image: &Image) -> Result<()> {
    let conn = &mut pool.get()?;
    with_retry(conn, |conn| diesel::insert_into(images::table).values(image).execute(conn))?;
    debug!("Inserted image {}", image.id);
    Ok(())
}

/// Retrieves an image by its ID
///
/// ### Returns
///
/// `Ok(None)` if no image has that ID
pub fn get_image(pool: &DbPool, image_id: &str) -> Result<Option<Image>> {
    let conn = &mut pool.get()?;
    let image = images::table
        .find(image_id)
        .select(Image::as_select())
        .first(conn)
        .optional()?;
    Ok(image)
}

/// Retrieves an image by the id of its Immich asset
pub fn get_image_by_immich_id(pool: &DbPool, immich_id: &str) -> Result<Option<Image>> {
    let conn = &mut pool.get()?;
    let image = images::table
        .filter(images::immich_id.eq(immich_id))
        .select(Image::as_select())
        .first(conn)
        .optional()?;
    Ok(image)
}

/// Escapes `LIKE` wildcards so user input matches literally
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Builds the filtered (but unordered and unpaged) image query
fn filtered_images<'a>(query: &'a ImageQueryDto) -> images::BoxedQuery<'a, Sqlite> {
    let mut image_query = images::table.into_boxed();

    if let Some(term) = query.search_term() {
        let pattern = format!("%{}%", escape_like(term));
        image_query = image_query.filter(
            images::title
                .like(pattern.clone())
                .escape('\\')
                .or(images::filename.like(pattern.clone()).escape('\\'))
                .or(images::object_name.like(pattern.clone()).escape('\\'))
                .or(images::description.like(pattern).escape('\\')),
        );
    }

    // An image must carry every requested tag
    for tag_id in &query.tag_ids {
        image_query = image_query.filter(
            images::id.eq_any(
                image_tags::table
                    .filter(image_tags::tag_id.eq(tag_id))
                    .select(image_tags::image_id),
            ),
        );
    }

    if let Some(equipment_id) = &query.equipment_id {
        image_query = image_query.filter(
            images::id.eq_any(
                image_equipment::table
                    .filter(image_equipment::equipment_id.eq(equipment_id))
                    .select(image_equipment::image_id),
            ),
        );
    }

    if let Some(plate_solved) = query.plate_solved {
        image_query = image_query.filter(images::plate_solved.eq(plate_solved));
    }

    if let Some(favorite) = query.favorite {
        image_query = image_query.filter(images::favorite.eq(favorite));
    }

    if let Some(after) = query.captured_after {
        image_query = image_query.filter(images::capture_date.ge(after.naive_utc()));
    }

    if let Some(before) = query.captured_before {
        image_query = image_query.filter(images::capture_date.le(before.naive_utc()));
    }

    image_query
}

/// Lists one page of images matching the query
///
/// ### Returns
///
/// The images on the requested page and the number of matches across all pages
#[instrument(skip(pool), fields(query = %query))]
pub fn list_images(pool: &DbPool, query: &ImageQueryDto) -> Result<(Vec<Image>, i64)> {
    let conn = &mut pool.get()?;

    let total: i64 = filtered_images(query).count().get_result(conn)?;

    let page_query = filtered_images(query);
    let page_query = match query.sort {
        // SQLite sorts NULL lowest, so undated images fall to the end
        ImageSort::CaptureDate => page_query.order((images::capture_date.desc(), images::created_at.desc())),
        ImageSort::Title => page_query.order((images::title.asc(), images::id.asc())),
        ImageSort::CreatedAt => page_query.order((images::created_at.desc(), images::id.asc())),
    };

    let page = page_query
        .limit(query.page_size())
        .offset(query.offset())
        .select(Image::as_select())
        .load(conn)?;

    info!("Retrieved {} of {} matching images", page.len(), total);
    Ok((page, total))
}

/// Lists every plate-solved image with known coordinates
pub fn list_solved_images(pool: &DbPool) -> Result<Vec<Image>> {
    let conn = &mut pool.get()?;
    let solved = images::table
        .filter(images::plate_solved.eq(true))
        .filter(images::ra.is_not_null())
        .filter(images::dec.is_not_null())
        .order(images::ra.asc())
        .select(Image::as_select())
        .load(conn)?;
    Ok(solved)
}

/// Lists unsolved images, oldest capture first
pub fn list_unsolved_image_ids(pool: &DbPool) -> Result<Vec<String>> {
    let conn = &mut pool.get()?;
    let ids = images::table
        .filter(images::plate_solved.eq(false))
        .order(images::capture_date.asc())
        .select(images::id)
        .load(conn)?;
    Ok(ids)
}

pub fn count_images(pool: &DbPool) -> Result<i64> {
    let conn = &mut pool.get()?;
    Ok(images::table.count().get_result(conn)?)
}

/// Image counters shown on the stats page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageCounts {
    pub total: i64,
    pub plate_solved: i64,
    pub favorites: i64,
    /// Capture date of the most recently captured image
    pub latest_capture: Option<NaiveDateTime>,
}

pub fn count_image_stats(pool: &DbPool) -> Result<ImageCounts> {
    let conn = &mut pool.get()?;
    let total = images::table.count().get_result(conn)?;
    let plate_solved = images::table
        .filter(images::plate_solved.eq(true))
        .count()
        .get_result(conn)?;
    let favorites = images::table
        .filter(images::favorite.eq(true))
        .count()
        .get_result(conn)?;
    let latest_capture = images::table
        .select(diesel::dsl::max(images::capture_date))
        .first(conn)?;

    Ok(ImageCounts {
        total,
        plate_solved,
        favorites,
        latest_capture,
    })
}

/// Applies user edits to an image
///
/// ### Errors
///
/// Returns an error if the image does not exist or the update fails
#[instrument(skip(pool, edit))]
pub fn update_image(pool: &DbPool, image_id: &str, edit: UpdateImageDto) -> Result<Image> {
    let conn = &mut pool.get()?;

    let changes = ImageEdit {
        title: edit.title.and_then(blank_to_none),
        description: edit.description.map(blank_to_none),
        object_name: edit.object_name.map(blank_to_none),
        favorite: edit.favorite,
        favorite_set_locally: edit.favorite.map(|_| true),
        updated_at: Utc::now().naive_utc(),
    };

    let updated = with_retry(conn, |conn| {
        diesel::update(images::table.find(image_id))
            .set(&changes)
            .returning(Image::as_returning())
            .get_result(conn)
    })
    .optional()?
    .ok_or_else(|| anyhow!("Image not found: {}", image_id))?;

    info!("Updated image {}", image_id);
    Ok(updated)
}

/// Deletes an image; tag links, equipment links and jobs go with it
///
/// ### Returns
///
/// Whether an image was deleted
#[instrument(skip(pool))]
pub fn delete_image(pool: &DbPool, image_id: &str) -> Result<bool> {
    let conn = &mut pool.get()?;
    let deleted = with_retry(conn, |conn| diesel::delete(images::table.find(image_id)).execute(conn))?;
    Ok(deleted > 0)
}

/// Merges an Immich asset into the gallery
///
/// New assets are inserted. Known assets get their Immich-sourced metadata
/// refreshed while title, description and object name are kept, since those
/// may have been edited in the gallery. The favorite flag follows Immich until
/// it is edited locally.
#[instrument(skip(pool, asset), fields(immich_id = %asset.id))]
pub fn upsert_from_immich(pool: &DbPool, asset: &ImmichAsset) -> Result<UpsertOutcome> {
    let conn = &mut pool.get()?;
    let metadata: ImmichMetadata = asset.to_metadata();

    conn.transaction::<_, anyhow::Error, _>(|conn| {
        let existing: Option<(String, bool)> = images::table
            .filter(images::immich_id.eq(&asset.id))
            .select((images::id, images::favorite_set_locally))
            .first(conn)
            .optional()?;

        match existing {
            Some((image_id, favorite_set_locally)) => {
                let favorite = (!favorite_set_locally).then(|| images::favorite.eq(asset.is_favorite));
                let image = diesel::update(images::table.find(&image_id))
                    .set((&metadata, favorite, images::updated_at.eq(Utc::now().naive_utc())))
                    .returning(Image::as_returning())
                    .get_result(conn)?;
                Ok(UpsertOutcome::Updated(image))
            }
            None => {
                let image = Image::from_immich(asset.id.clone(), metadata.clone(), asset.description(), asset.is_favorite);
                diesel::insert_into(images::table).values(&image).execute(conn)?;
                Ok(UpsertOutcome::Created(image))
            }
        }
    })
}

/// Removes images whose Immich asset is no longer present
///
/// ### Arguments
///
/// * `seen_immich_ids` - Every asset id seen by a complete scan
///
/// ### Returns
///
/// The number of images removed
#[instrument(skip(pool, seen_immich_ids), fields(seen = seen_immich_ids.len()))]
pub fn remove_images_not_in(pool: &DbPool, seen_immich_ids: &HashSet<String>) -> Result<usize> {
    let conn = &mut pool.get()?;

    let known: Vec<(String, String)> = images::table.select((images::id, images::immich_id)).load(conn)?;
    let vanished: Vec<String> = known
        .into_iter()
        .filter(|(_, immich_id)| !seen_immich_ids.contains(immich_id))
        .map(|(id, _)| id)
        .collect();

    let mut removed = 0;
    for chunk in vanished.chunks(500) {
        removed += with_retry(conn, |conn| {
            diesel::delete(images::table.filter(images::id.eq_any(chunk))).execute(conn)
        })?;
    }

    if removed > 0 {
        info!("Removed {} images no longer in Immich", removed);
    }
    Ok(removed)
}
