use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Association between an image and a tag
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::image_tags)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ImageTag {
    pub image_id: String,
    pub tag_id: String,
    pub created_at: NaiveDateTime,
}

impl ImageTag {
    pub fn new(image_id: String, tag_id: String) -> Self {
        Self {
            image_id,
            tag_id,
            created_at: Utc::now().naive_utc(),
        }
    }
}

/// Association between an image and a piece of equipment used to take it
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::image_equipment)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ImageEquipment {
    pub image_id: String,
    pub equipment_id: String,
    /// Free-form usage notes, e.g. "gain 120, -10C"
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

impl ImageEquipment {
    pub fn new(image_id: String, equipment_id: String, notes: Option<String>) -> Self {
        Self {
            image_id,
            equipment_id,
            notes,
            created_at: Utc::now().naive_utc(),
        }
    }
}
