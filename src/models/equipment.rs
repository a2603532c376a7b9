use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use diesel::deserialize::{FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::{Sqlite, SqliteValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::JsonValue;

/// Category of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentKind {
    Telescope,
    Camera,
    Mount,
    Filter,
    Guider,
    Accessory,
}

impl EquipmentKind {
    pub const ALL: [EquipmentKind; 6] = [
        EquipmentKind::Telescope,
        EquipmentKind::Camera,
        EquipmentKind::Mount,
        EquipmentKind::Filter,
        EquipmentKind::Guider,
        EquipmentKind::Accessory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentKind::Telescope => "telescope",
            EquipmentKind::Camera => "camera",
            EquipmentKind::Mount => "mount",
            EquipmentKind::Filter => "filter",
            EquipmentKind::Guider => "guider",
            EquipmentKind::Accessory => "accessory",
        }
    }
}

impl fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EquipmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EquipmentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown equipment kind: {}", s))
    }
}

impl FromSql<Text, Sqlite> for EquipmentKind {
    fn from_sql(value: SqliteValue<'_, '_, '_>) -> diesel::deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(value)?;
        Ok(text.parse()?)
    }
}

impl ToSql<Text, Sqlite> for EquipmentKind {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

/// A telescope, camera, mount or other piece of gear in the catalog
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::equipment)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Equipment {
    id: String,
    name: String,
    kind: EquipmentKind,
    description: Option<String>,
    /// Kind-specific specifications, e.g. `{"aperture_mm": 80, "focal_length_mm": 480}`
    specifications: JsonValue,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl Equipment {
    /// Creates a new catalog entry
    ///
    /// ### Arguments
    ///
    /// * `name` - Display name, e.g. "Redcat 51"
    /// * `kind` - Category of the equipment
    /// * `description` - Optional free-form description
    /// * `specifications` - Kind-specific specification document
    pub fn new(
        name: String,
        kind: EquipmentKind,
        description: Option<String>,
        specifications: JsonValue,
    ) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            kind,
            description,
            specifications,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_name(&self) -> String {
        self.name.clone()
    }

    pub fn get_kind(&self) -> EquipmentKind {
        self.kind
    }

    pub fn get_description(&self) -> Option<String> {
        self.description.clone()
    }

    pub fn get_specifications(&self) -> JsonValue {
        self.specifications.clone()
    }

    pub fn get_updated_at(&self) -> NaiveDateTime {
        self.updated_at
    }
}
