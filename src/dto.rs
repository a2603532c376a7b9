use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Equipment, Image, JsonValue, PlateSolvingJob, Tag};

/// Default number of images per page
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Largest page a client may request
pub const MAX_PAGE_SIZE: i64 = 200;

/// Sort order for image listings
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageSort {
    /// Newest capture first, undated images last
    #[default]
    CaptureDate,
    /// Alphabetical by title
    Title,
    /// Most recently synced first
    CreatedAt,
}

/// Query parameters for listing images
///
/// Deserialized from the query string; `tag_ids` may be repeated
/// (`?tag_ids=a&tag_ids=b`) and an image must carry all of them to match.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct ImageQueryDto {
    /// Substring matched against title, object name, description and filename
    pub search: Option<String>,
    pub tag_ids: Vec<String>,
    pub equipment_id: Option<String>,
    pub plate_solved: Option<bool>,
    pub favorite: Option<bool>,
    pub captured_after: Option<DateTime<Utc>>,
    pub captured_before: Option<DateTime<Utc>>,
    pub sort: ImageSort,
    /// 1-based page number
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl ImageQueryDto {
    /// Requested page, never below 1
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Requested page size, clamped to `1..=MAX_PAGE_SIZE`
    pub fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    /// Rows to skip for the requested page
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.page_size())
    }

    /// The search term, trimmed, if it is not blank
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

impl fmt::Display for ImageQueryDto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ImageQueryDto {{ search: {:?}, tag_ids: {:?}, equipment_id: {:?}, plate_solved: {:?}, favorite: {:?}, sort: {:?}, page: {}, page_size: {} }}",
            self.search,
            self.tag_ids,
            self.equipment_id,
            self.plate_solved,
            self.favorite,
            self.sort,
            self.page(),
            self.page_size(),
        )
    }
}

/// One page of an image listing
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PagedImages {
    pub images: Vec<Image>,
    /// Matching images across all pages
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

/// A piece of equipment as attached to an image, with usage notes
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttachedEquipment {
    pub equipment: Equipment,
    pub notes: Option<String>,
}

/// Everything the detail view shows for one image
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImageDetail {
    #[serde(flatten)]
    pub image: Image,
    pub tags: Vec<Tag>,
    pub equipment: Vec<AttachedEquipment>,
    /// Most recent plate-solving job, if the image was ever submitted
    pub latest_job: Option<PlateSolvingJob>,
    pub ra_hms: Option<String>,
    pub dec_dms: Option<String>,
}

/// Query parameters for the thumbnail proxy
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct ThumbnailQueryDto {
    /// `thumbnail` (default) or `preview`
    pub size: Option<String>,
}

/// Data transfer object for editing an image's user-curated fields
///
/// Unset fields are left alone; an empty string clears `description` or
/// `object_name`.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct UpdateImageDto {
    pub title: Option<String>,
    pub description: Option<String>,
    pub object_name: Option<String>,
    pub favorite: Option<bool>,
}

impl UpdateImageDto {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.object_name.is_none() && self.favorite.is_none()
    }
}

/// Data transfer object for creating a new tag
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateTagDto {
    /// The name of the tag
    pub name: String,
}

/// Data transfer object for creating a catalog entry
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateEquipmentDto {
    pub name: String,
    /// One of telescope, camera, mount, filter, guider, accessory
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub specifications: Option<JsonValue>,
}

/// Data transfer object for editing a catalog entry
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct UpdateEquipmentDto {
    pub name: Option<String>,
    pub kind: Option<String>,
    /// Empty string clears the description
    pub description: Option<String>,
    /// Replaces the whole specification document
    pub specifications: Option<JsonValue>,
}

/// Query parameters for listing equipment
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct EquipmentQueryDto {
    pub kind: Option<String>,
}

/// Body of `PUT /images/{id}/equipment/{equipment_id}`
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct AttachEquipmentDto {
    pub notes: Option<String>,
}

/// Body of `POST /plate-solve/bulk`
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct BulkPlateSolveDto {
    pub image_ids: Vec<String>,
    /// Queue every image that is not solved and has no active job
    pub all_unsolved: bool,
}

/// Result of a bulk enqueue
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct BulkPlateSolveResult {
    pub enqueued: Vec<PlateSolvingJob>,
    /// Image ids skipped because they already have an active job
    pub skipped: Vec<String>,
    /// Requested ids that do not exist
    pub not_found: Vec<String>,
}

/// Query parameters for listing plate-solving jobs
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct JobQueryDto {
    pub status: Option<String>,
}

/// A plate-solved image positioned on the sky
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SkyMapPoint {
    pub image_id: String,
    pub title: String,
    pub object_name: Option<String>,
    pub ra: f64,
    pub dec: f64,
    pub field_radius: Option<f64>,
    pub ra_hms: String,
    pub dec_dms: String,
}

/// Gallery-wide counters
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct StatsDto {
    pub total_images: i64,
    pub plate_solved: i64,
    pub favorites: i64,
    pub equipment: i64,
    pub tags: i64,
    pub jobs_pending: i64,
    pub jobs_processing: i64,
    pub jobs_success: i64,
    pub jobs_failed: i64,
    /// Capture date of the newest image
    pub latest_capture: Option<NaiveDateTime>,
}

/// Outcome of a connectivity probe from the admin panel
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectionTestDto {
    pub ok: bool,
    pub message: String,
}
