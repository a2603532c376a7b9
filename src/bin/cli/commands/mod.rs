pub mod equipment;
pub mod image;
pub mod job;
pub mod settings;
pub mod tag;
