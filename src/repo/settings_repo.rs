use crate::config::Config;
use crate::db::{DbPool, with_retry};
use crate::models::{SettingRow, Settings, SettingsUpdate};
use crate::schema::settings;
use anyhow::{Context, Result};
use chrono::Utc;
use diesel::prelude::*;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

/// Loads the settings stored by the admin panel
///
/// Each field of [`SettingsUpdate`] is stored as its own row holding a JSON
/// value. Rows that fail to parse are logged and ignored.
pub fn load_stored_settings(pool: &DbPool) -> Result<SettingsUpdate> {
    let conn = &mut pool.get()?;
    let rows: Vec<SettingRow> = settings::table.select(SettingRow::as_select()).load(conn)?;

    let mut object = Map::new();
    for row in rows {
        match serde_json::from_str::<Value>(&row.value) {
            Ok(value) => {
                object.insert(row.key, value);
            }
            Err(e) => warn!("Ignoring unreadable setting {}: {}", row.key, e),
        }
    }

    serde_json::from_value(Value::Object(object)).context("Stored settings do not match the settings schema")
}

/// Effective settings: the static config overlaid with stored settings
pub fn load_settings(pool: &DbPool, config: &Config) -> Result<Settings> {
    Ok(Settings::from_config(config).apply_update(load_stored_settings(pool)?))
}

/// Stores every field set in `update`, leaving other stored settings as they are
#[instrument(skip(pool, update))]
pub fn save_settings(pool: &DbPool, update: &SettingsUpdate) -> Result<()> {
    let conn = &mut pool.get()?;
    let now = Utc::now().naive_utc();

    let Value::Object(fields) = serde_json::to_value(update)? else {
        anyhow::bail!("Settings update did not serialize to an object");
    };

    let rows: Vec<SettingRow> = fields
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| SettingRow {
            key,
            value: value.to_string(),
            updated_at: now,
        })
        .collect();

    conn.transaction::<_, anyhow::Error, _>(|conn| {
        for row in &rows {
            with_retry(conn, |conn| {
                diesel::insert_into(settings::table)
                    .values(row)
                    .on_conflict(settings::key)
                    .do_update()
                    .set((settings::value.eq(&row.value), settings::updated_at.eq(row.updated_at)))
                    .execute(conn)
            })?;
        }
        Ok(())
    })?;

    info!("Saved {} settings", rows.len());
    Ok(())
}
