/// Skymmich: an astrophotography gallery backed by Immich
///
/// This library mirrors astrophotos from an Immich server, plate solves them
/// through Astrometry.net and serves the enriched catalog over a JSON API.
///
/// ### Modules
///
/// - `config`: Layered static configuration
/// - `db`: Database connection management
/// - `models`: Database models
/// - `repo`: Repository layer for database operations
/// - `schema`: Database schema definitions
/// - `dto`: Request and response bodies
/// - `handlers`: HTTP handlers
/// - `immich`, `astrometry`: Clients for the two upstream services
/// - `services`: Sync, plate-solve worker, XMP sidecars and the event bus
/// - `astro`: Coordinate formatting
///
/// ### Web API
///
/// See [`create_app`] for the routes.

pub mod astro;
pub mod astrometry;
pub mod config;
pub mod db;
pub mod dto;
pub mod errors;
pub mod handlers;
pub mod immich;
pub mod models;
pub mod repo;
pub mod schema;
pub mod services;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::{
    Router,
    extract::FromRef,
    routing::{get, post, put},
};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use config::Config;
use handlers::*;
use services::events::EventBus;

/// Timeout for calls to Immich and Astrometry.net
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Shared state of the HTTP server and the background tasks
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<db::DbPool>,
    pub config: Arc<Config>,
    pub events: EventBus,
    /// Shared HTTP client for upstream calls
    pub http: reqwest::Client,
    /// Held while a sync runs
    pub sync_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(pool: Arc<db::DbPool>, config: Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .user_agent(concat!("skymmich/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            pool,
            config: Arc::new(config),
            events: EventBus::default(),
            http,
            sync_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Effective settings: static config overlaid with the admin panel's
    pub fn settings(&self) -> anyhow::Result<models::Settings> {
        repo::load_settings(&self.pool, &self.config)
    }
}

impl FromRef<AppState> for Arc<db::DbPool> {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

/// Creates the application router with all routes
///
/// ### Arguments
///
/// * `state` - Shared state handed to every handler
///
/// ### Returns
///
/// An Axum Router configured with all routes and the state
pub fn create_app(state: AppState) -> Router {
    Router::new()
        // Gallery
        .route("/images", get(list_images_handler))
        .route(
            "/images/{id}",
            get(get_image_handler).patch(update_image_handler).delete(delete_image_handler),
        )
        .route("/images/{id}/thumbnail", get(image_thumbnail_handler))
        .route("/images/{id}/sidecar", get(image_sidecar_handler))
        // Tags
        .route("/tags", get(list_tags_handler).post(create_tag_handler))
        .route("/images/{id}/tags", get(list_image_tags_handler))
        .route(
            "/images/{id}/tags/{tag_id}",
            put(add_tag_to_image_handler).delete(remove_tag_from_image_handler),
        )
        // Equipment catalog
        .route("/equipment", get(list_equipment_handler).post(create_equipment_handler))
        .route(
            "/equipment/{id}",
            get(get_equipment_handler)
                .patch(update_equipment_handler)
                .delete(delete_equipment_handler),
        )
        .route("/equipment/{id}/images", get(list_equipment_images_handler))
        .route(
            "/images/{id}/equipment/{equipment_id}",
            put(attach_equipment_handler).delete(detach_equipment_handler),
        )
        // Plate solving
        .route("/images/{id}/plate-solve", post(enqueue_plate_solve_handler))
        .route("/images/{id}/jobs", get(list_image_jobs_handler))
        .route("/plate-solve/bulk", post(bulk_plate_solve_handler))
        .route("/plate-solve/jobs", get(list_jobs_handler))
        .route("/plate-solve/jobs/{id}", get(get_job_handler))
        .route("/plate-solve/jobs/{id}/retry", post(retry_job_handler))
        // Sync
        .route("/sync", post(sync_handler))
        // Admin settings
        .route("/admin/settings", get(get_settings_handler).put(update_settings_handler))
        .route("/admin/settings/test-immich", post(test_immich_handler))
        .route("/admin/settings/test-astrometry", post(test_astrometry_handler))
        // Overview
        .route("/sky-map", get(sky_map_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .route("/events", get(events_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs the embedded migrations
///
/// ### Arguments
///
/// * `conn` - A mutable reference to a SQLite connection
///
/// ### Errors
///
/// Returns an error if a migration fails to apply
pub fn run_migrations(conn: &mut diesel::SqliteConnection) -> anyhow::Result<()> {
    use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("Failed to run migrations: {}", e))?;
    Ok(())
}
