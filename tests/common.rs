#![allow(dead_code)]

//! Common test utilities for Skymmich integration tests
//!
//! Builds application state on a private in-memory database, sends requests
//! through the router and stands up fake Immich and Astrometry.net servers.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    routing::{get, post},
};
use serde_json::{Value, json};
use skymmich::{
    AppState,
    config::{Config, base_config},
    create_app,
    db::init_pool,
    models::{Image, ImmichMetadata, SettingsUpdate},
    repo,
};
use std::sync::Arc;
use tower::ServiceExt;

/// Creates application state around a fresh in-memory database
///
/// A named shared-cache database is used so every pooled connection sees the
/// migrated schema.
pub fn create_test_state_with(config: Config) -> AppState {
    let database_url = format!("file:it_{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
    let pool = init_pool(&database_url).unwrap();
    {
        let mut conn = pool.get().unwrap();
        skymmich::run_migrations(&mut conn).unwrap();
    }
    AppState::new(Arc::new(pool), config)
}

pub fn create_test_state() -> AppState {
    create_test_state_with(base_config(None))
}

/// Sends a request through a fresh router and returns status, content type
/// and the raw body
pub async fn send_raw(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, String, Vec<u8>) {
    let builder = Request::builder().uri(uri).method(method);
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = create_app(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, bytes.to_vec())
}

/// Sends a request through a fresh router and returns status and JSON body
///
/// Empty bodies come back as `Value::Null`.
pub async fn send(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, content_type, bytes) = send_raw(state, method, uri, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        assert!(
            content_type.starts_with("application/json"),
            "{} {} returned {}, not JSON",
            method,
            uri,
            content_type
        );
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Inserts an image directly, as a sync would
pub fn insert_image(state: &AppState, immich_id: &str, filename: &str, capture_date: Option<&str>) -> Image {
    let metadata = ImmichMetadata {
        filename: filename.to_string(),
        capture_date: capture_date
            .map(|d| chrono::NaiveDateTime::parse_from_str(d, "%Y-%m-%d %H:%M").unwrap()),
        ..Default::default()
    };
    let image = Image::from_immich(immich_id.to_string(), metadata, None, false);
    repo::insert_image(&state.pool, &image).unwrap();
    image
}

/// Stores admin settings as the admin panel would
pub fn save_settings(state: &AppState, update: SettingsUpdate) {
    repo::save_settings(&state.pool, &update).unwrap();
}

/// Serves `router` on an ephemeral local port and returns its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A fake Immich library holding a single image of the Orion Nebula
pub fn fake_immich() -> Router {
    Router::new()
        .route(
            "/api/search/metadata",
            post(|| async {
                axum::Json(json!({
                    "assets": {
                        "items": [{
                            "id": "asset-m42",
                            "originalFileName": "M42_stack.tif",
                            "type": "IMAGE",
                            "fileCreatedAt": "2024-01-05T21:30:00.000Z",
                            "isFavorite": true,
                            "exifInfo": {
                                "make": "ZWO",
                                "model": "ASI2600MC Pro",
                                "exifImageWidth": 6248,
                                "exifImageHeight": 4176
                            }
                        }, {
                            "id": "asset-video",
                            "originalFileName": "timelapse.mp4",
                            "type": "VIDEO"
                        }],
                        "nextPage": null
                    }
                }))
            }),
        )
        .route(
            "/api/assets/{id}/original",
            get(|| async { vec![0x49u8, 0x49, 0x2a, 0x00] }),
        )
}

/// A fake Astrometry.net that solves every upload as the Orion Nebula
pub fn fake_astrometry() -> Router {
    Router::new()
        .route("/login", post(|| async { axum::Json(json!({"status": "success", "session": "s1"})) }))
        .route("/upload", post(|| async { axum::Json(json!({"status": "success", "subid": 4242})) }))
        .route(
            "/submissions/{id}",
            get(|| async { axum::Json(json!({"jobs": [777], "processing_finished": "2024-01-06"})) }),
        )
        .route("/jobs/{id}", get(|| async { axum::Json(json!({"status": "success"})) }))
        .route(
            "/jobs/{id}/calibration",
            get(|| async {
                axum::Json(json!({
                    "ra": 83.822,
                    "dec": -5.391,
                    "radius": 1.2,
                    "pixscale": 3.1,
                    "orientation": 178.5,
                    "parity": 1.0
                }))
            }),
        )
        .route(
            "/jobs/{id}/annotations",
            get(|| async {
                axum::Json(json!({
                    "annotations": [
                        {"names": ["NGC 1976", "M 42"], "type": "ngc", "pixelx": 3100.0, "pixely": 2000.0, "radius": 900.0},
                        {"names": ["HD 37018"], "type": "hd", "pixelx": 10.0, "pixely": 10.0, "radius": 5.0}
                    ]
                }))
            }),
        )
        .route(
            "/jobs/{id}/machine_tags",
            get(|| async { axum::Json(json!({"tags": ["NGC 1976", "M 42"]})) }),
        )
}
