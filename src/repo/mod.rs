/// Repository module
///
/// This module provides the data access layer for the application.
/// Functions take the connection pool, run their queries synchronously and
/// return `anyhow::Result`; writes go through the lock-retry helper in
/// [`crate::db`].

mod image_repo;
mod tag_repo;
mod equipment_repo;
mod job_repo;
mod settings_repo;

// Re-export all repository functions
pub use image_repo::*;
pub use tag_repo::*;
pub use equipment_repo::*;
pub use job_repo::*;
pub use settings_repo::*;
