/// Data models module
///
/// This module defines the core data structures used throughout the application.
/// It includes database models that map to database tables, as well as methods
/// for creating and manipulating these models.

mod json_value;
pub use json_value::JsonValue;

mod image;
pub use image::{Image, ImmichMetadata, title_from_filename};

mod tag;
pub use tag::{Tag, normalize_tag_name};

mod image_tag;
pub use image_tag::{ImageEquipment, ImageTag};

mod equipment;
pub use equipment::{Equipment, EquipmentKind};

mod plate_solving_job;
pub use plate_solving_job::{JobStatus, PlateSolvingJob};

mod settings;
pub use settings::{MAX_SOLVE_ATTEMPTS_LIMIT, SettingRow, Settings, SettingsUpdate, mask_secret};
