/// Web API Handlers
///
/// This module contains the handlers for the RESTful API endpoints.
/// Each handler extracts the request data, calls the repository or service
/// layer and maps the outcome onto a JSON response or an `ApiError`.

mod equipment_handlers;
mod image_handlers;
mod overview_handlers;
mod plate_solve_handlers;
mod settings_handlers;
mod sync_handlers;
mod tag_handlers;

// Re-export all handlers
pub use equipment_handlers::*;
pub use image_handlers::*;
pub use overview_handlers::*;
pub use plate_solve_handlers::*;
pub use settings_handlers::*;
pub use sync_handlers::*;
pub use tag_handlers::*;
