use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An astrophotograph mirrored from Immich
///
/// This struct maps directly to the `images` table. Fields fall into three
/// groups: metadata refreshed from Immich on every sync (filename, capture
/// date, EXIF), fields the user curates in the gallery (title, description,
/// object name, favorite) and the astrometric calibration written back by a
/// successful plate solve (ra through orientation, plate_solved).
#[derive(Queryable, Selectable, Insertable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::images)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Image {
    pub id: String,
    /// Asset id on the Immich server
    pub immich_id: String,
    pub title: String,
    pub filename: String,
    pub description: Option<String>,
    /// Primary target, e.g. "M42"
    pub object_name: Option<String>,
    pub capture_date: Option<NaiveDateTime>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    /// Focal length in millimetres
    pub focal_length: Option<f64>,
    /// f-number
    pub aperture: Option<f64>,
    /// Exposure time as reported by EXIF, e.g. "1/250" or "300"
    pub exposure_time: Option<String>,
    pub iso: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Right ascension of the field centre in degrees (J2000)
    pub ra: Option<f64>,
    /// Declination of the field centre in degrees (J2000)
    pub dec: Option<f64>,
    /// Arcseconds per pixel
    pub pixel_scale: Option<f64>,
    /// Radius of the solved field in degrees
    pub field_radius: Option<f64>,
    /// Position angle of image up, degrees east of north
    pub orientation: Option<f64>,
    pub plate_solved: bool,
    pub favorite: bool,
    /// Set once the favorite flag is edited in the gallery; sync then stops
    /// copying Immich's flag
    #[serde(skip)]
    pub favorite_set_locally: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Metadata for an image as reported by Immich
///
/// Produced by the sync job from an Immich asset and used both to create new
/// images and to refresh existing ones.
#[derive(AsChangeset, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::images)]
#[diesel(treat_none_as_null = true)]
pub struct ImmichMetadata {
    pub filename: String,
    pub capture_date: Option<NaiveDateTime>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub focal_length: Option<f64>,
    pub aperture: Option<f64>,
    pub exposure_time: Option<String>,
    pub iso: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Derives a display title from a file name by dropping the extension
///
/// `"M42_stack.tif"` becomes `"M42_stack"`; names without an extension, or
/// hidden files like `".hidden"`, are returned unchanged.
pub fn title_from_filename(filename: &str) -> String {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => filename[..idx].to_string(),
        _ => filename.to_string(),
    }
}

impl Image {
    /// Creates a new, unsolved image for an Immich asset
    ///
    /// ### Arguments
    ///
    /// * `immich_id` - The Immich asset id
    /// * `metadata` - Metadata reported by Immich for the asset
    /// * `description` - Description from the asset's EXIF data, if any
    /// * `favorite` - Whether the asset is a favorite in Immich
    pub fn from_immich(
        immich_id: String,
        metadata: ImmichMetadata,
        description: Option<String>,
        favorite: bool,
    ) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            immich_id,
            title: title_from_filename(&metadata.filename),
            filename: metadata.filename,
            description,
            object_name: None,
            capture_date: metadata.capture_date,
            width: metadata.width,
            height: metadata.height,
            camera_make: metadata.camera_make,
            camera_model: metadata.camera_model,
            lens_model: metadata.lens_model,
            focal_length: metadata.focal_length,
            aperture: metadata.aperture,
            exposure_time: metadata.exposure_time,
            iso: metadata.iso,
            latitude: metadata.latitude,
            longitude: metadata.longitude,
            ra: None,
            dec: None,
            pixel_scale: None,
            field_radius: None,
            orientation: None,
            plate_solved: false,
            favorite,
            favorite_set_locally: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Field of view along each axis in degrees, when both the pixel scale
    /// and the image dimensions are known
    pub fn field_of_view(&self) -> Option<(f64, f64)> {
        let scale = self.pixel_scale?;
        let width = self.width?;
        let height = self.height?;
        Some((
            scale * width as f64 / 3600.0,
            scale * height as f64 / 3600.0,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(filename: &str) -> ImmichMetadata {
        ImmichMetadata {
            filename: filename.to_string(),
            width: Some(6000),
            height: Some(4000),
            ..Default::default()
        }
    }

    #[test]
    fn test_title_from_filename() {
        assert_eq!(title_from_filename("M42_stack.tif"), "M42_stack");
        assert_eq!(title_from_filename("andromeda.final.jpg"), "andromeda.final");
        assert_eq!(title_from_filename("no_extension"), "no_extension");
        assert_eq!(title_from_filename(".hidden"), ".hidden");
    }

    #[test]
    fn test_from_immich_starts_unsolved() {
        let image = Image::from_immich("asset-1".to_string(), metadata("NGC7000.fits"), None, true);

        assert_eq!(image.immich_id, "asset-1");
        assert_eq!(image.title, "NGC7000");
        assert_eq!(image.filename, "NGC7000.fits");
        assert!(!image.plate_solved);
        assert!(image.favorite);
        assert!(image.ra.is_none());
        assert!(Uuid::parse_str(&image.id).is_ok());
        assert_eq!(image.created_at, image.updated_at);
    }

    #[test]
    fn test_field_of_view() {
        let mut image = Image::from_immich("a".to_string(), metadata("x.jpg"), None, false);
        assert!(image.field_of_view().is_none());

        image.pixel_scale = Some(1.8);
        let (w, h) = image.field_of_view().unwrap();
        assert!((w - 3.0).abs() < 1e-9);
        assert!((h - 2.0).abs() < 1e-9);
    }
}
