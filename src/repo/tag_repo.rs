use crate::db::{DbPool, with_retry};
use crate::models::{ImageTag, Tag};
use crate::schema::{image_tags, tags};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use anyhow::Result;
use tracing::{debug, instrument};

/// Creates a new tag in the database
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `name` - The name for the new tag, already normalized
///
/// ### Returns
///
/// A Result containing the newly created Tag if successful
///
/// ### Errors
///
/// Returns an error if:
/// - Unable to get a connection from the pool
/// - A tag with the same name exists
/// - The database insert operation fails
#[instrument(skip(pool))]
pub fn create_tag(pool: &DbPool, name: String) -> Result<Tag> {
    let conn = &mut pool.get()?;
    let new_tag = Tag::new(name);
    with_retry(conn, |conn| diesel::insert_into(tags::table).values(&new_tag).execute(conn))?;
    debug!("Created tag {}", new_tag.get_id());
    Ok(new_tag)
}

/// Retrieves a tag from the database by its ID
pub fn get_tag(pool: &DbPool, tag_id: &str) -> Result<Option<Tag>> {
    let conn = &mut pool.get()?;
    let tag = tags::table
        .find(tag_id)
        .select(Tag::as_select())
        .first(conn)
        .optional()?;
    Ok(tag)
}

/// Retrieves a tag by name, ignoring ASCII case
pub fn get_tag_by_name(pool: &DbPool, name: &str) -> Result<Option<Tag>> {
    let conn = &mut pool.get()?;
    Ok(find_tag_by_name(conn, name)?)
}

fn find_tag_by_name(conn: &mut SqliteConnection, name: &str) -> QueryResult<Option<Tag>> {
    tags::table
        .filter(tags::name.like(name.replace('%', "\\%").replace('_', "\\_")).escape('\\'))
        .select(Tag::as_select())
        .first(conn)
        .optional()
}

/// Lists all tags, alphabetically
pub fn list_tags(pool: &DbPool) -> Result<Vec<Tag>> {
    let conn = &mut pool.get()?;
    let result = tags::table
        .order(tags::name.asc())
        .select(Tag::as_select())
        .load(conn)?;
    Ok(result)
}

pub fn count_tags(pool: &DbPool) -> Result<i64> {
    let conn = &mut pool.get()?;
    Ok(tags::table.count().get_result(conn)?)
}

/// Lists the tags attached to an image
pub fn list_tags_for_image(pool: &DbPool, image_id: &str) -> Result<Vec<Tag>> {
    let conn = &mut pool.get()?;
    let result = tags::table
        .inner_join(image_tags::table)
        .filter(image_tags::image_id.eq(image_id))
        .order(tags::name.asc())
        .select(Tag::as_select())
        .load(conn)?;
    Ok(result)
}

/// Attaches a tag to an image; attaching twice is a no-op
#[instrument(skip(pool))]
pub fn add_tag_to_image(pool: &DbPool, image_id: &str, tag_id: &str) -> Result<()> {
    let conn = &mut pool.get()?;
    let link = ImageTag::new(image_id.to_string(), tag_id.to_string());
    with_retry(conn, |conn| {
        diesel::insert_or_ignore_into(image_tags::table)
            .values(&link)
            .execute(conn)
    })?;
    Ok(())
}

/// Detaches a tag from an image
///
/// ### Returns
///
/// Whether the image carried the tag
#[instrument(skip(pool))]
pub fn remove_tag_from_image(pool: &DbPool, image_id: &str, tag_id: &str) -> Result<bool> {
    let conn = &mut pool.get()?;
    let removed = with_retry(conn, |conn| {
        diesel::delete(
            image_tags::table
                .filter(image_tags::image_id.eq(image_id))
                .filter(image_tags::tag_id.eq(tag_id)),
        )
        .execute(conn)
    })?;
    Ok(removed > 0)
}

/// Links an image to the named tag inside an open transaction, creating the
/// tag when no tag of that name exists
pub(crate) fn link_tag_by_name(conn: &mut SqliteConnection, image_id: &str, name: &str) -> QueryResult<Tag> {
    let tag = match find_tag_by_name(conn, name)? {
        Some(tag) => tag,
        None => {
            let tag = Tag::new(name.to_string());
            diesel::insert_into(tags::table).values(&tag).execute(conn)?;
            tag
        }
    };
    diesel::insert_or_ignore_into(image_tags::table)
        .values(ImageTag::new(image_id.to_string(), tag.get_id()))
        .execute(conn)?;
    Ok(tag)
}
