use crate::*;
use crate::astrometry::{
    AstrometryApi, AstrometryError, Calibration, RemoteJobStatus, SolveResult, SubmissionStatus,
};
use crate::immich::{AssetPage, ImmichApi, ImmichAsset, ImmichError};
use crate::models::{Image, ImmichMetadata};
use axum::Router;
use chrono::{DateTime, Utc};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Sets up a test database with migrations applied
///
/// Each call gets its own named shared-cache in-memory database. Plain
/// `:memory:` would give every pooled connection a separate database, so
/// migrations run on one connection would be invisible to the others.
///
/// ### Returns
///
/// An Arc-wrapped database connection pool connected to the in-memory database
pub fn setup_test_db() -> Arc<db::DbPool> {
    let unique_id = uuid::Uuid::new_v4();
    let database_url = format!("file:test_{}?mode=memory&cache=shared", unique_id);
    let pool = db::init_pool(&database_url).expect("Failed to create test pool");

    let mut conn = pool.get().expect("Failed to get connection");
    run_migrations(&mut conn).expect("Failed to run migrations");

    Arc::new(pool)
}

/// Builds application state around a fresh test database
pub fn setup_test_state() -> AppState {
    AppState::new(setup_test_db(), config::base_config(None))
}

/// Serves `router` on an ephemeral local port and returns its base URL
///
/// Used to stand in for Immich and Astrometry.net in client and worker tests.
pub async fn spawn_mock_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock server");
    let addr = listener.local_addr().expect("Mock server has no address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Mock server failed");
    });
    format!("http://{}", addr)
}

/// Inserts an unsolved image for the given Immich asset id
pub fn insert_test_image(pool: &db::DbPool, immich_id: &str, filename: &str) -> Image {
    let metadata = ImmichMetadata {
        filename: filename.to_string(),
        ..Default::default()
    };
    let image = Image::from_immich(immich_id.to_string(), metadata, None, false);
    repo::insert_image(pool, &image).expect("Failed to insert test image");
    image
}

/// Generates strings with leading/trailing whitespace, unicode and punctuation
pub fn arb_messy_string() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 _./:-]{0,24}",
        "\\PC{0,16}",
        "[ \t]{0,3}[a-z]{1,8}[ \t]{0,3}",
    ]
}

/// Generates an arbitrary DateTime<Utc> within 2020-01-01 to 2030-01-01
pub fn arb_datetime_utc() -> impl Strategy<Value = DateTime<Utc>> {
    (1_577_836_800i64..1_893_456_000i64)
        .prop_map(|ts| DateTime::from_timestamp(ts, 0).unwrap_or_default())
}

/// Builds an image asset as Immich would list it
pub fn test_asset(id: &str, filename: &str) -> ImmichAsset {
    ImmichAsset {
        id: id.to_string(),
        original_file_name: filename.to_string(),
        asset_type: "IMAGE".to_string(),
        file_created_at: None,
        is_favorite: false,
        exif_info: None,
    }
}

/// In-memory Immich for sync and worker tests
///
/// `pages` is served by the metadata search, one entry per page.
#[derive(Default)]
pub struct FakeImmich {
    pub pages: Vec<Vec<ImmichAsset>>,
    pub albums: HashMap<String, Vec<ImmichAsset>>,
    pub originals: HashMap<String, Vec<u8>>,
    /// When set, every call fails with a network error
    pub offline: bool,
    pub downloads: AtomicUsize,
}

impl ImmichApi for FakeImmich {
    async fn search_assets(&self, page: u32, _size: u32) -> Result<AssetPage, ImmichError> {
        if self.offline {
            return Err(ImmichError::Network("connection refused".to_string()));
        }
        let index = page.saturating_sub(1) as usize;
        Ok(AssetPage {
            items: self.pages.get(index).cloned().unwrap_or_default(),
            next_page: (index + 1 < self.pages.len()).then_some(page + 1),
        })
    }

    async fn album_assets(&self, album_id: &str) -> Result<Vec<ImmichAsset>, ImmichError> {
        if self.offline {
            return Err(ImmichError::Network("connection refused".to_string()));
        }
        self.albums
            .get(album_id)
            .cloned()
            .ok_or_else(|| ImmichError::NotFound(album_id.to_string()))
    }

    async fn download_original(&self, asset_id: &str) -> Result<Vec<u8>, ImmichError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.offline {
            return Err(ImmichError::Network("connection refused".to_string()));
        }
        self.originals
            .get(asset_id)
            .cloned()
            .ok_or_else(|| ImmichError::NotFound(asset_id.to_string()))
    }
}

/// A solution for the Orion Nebula with one NGC annotation
pub fn test_solution(job_id: i64) -> SolveResult {
    SolveResult {
        job_id,
        calibration: Calibration {
            ra: 83.822,
            dec: -5.391,
            radius: 1.2,
            pixscale: 3.1,
            orientation: 178.5,
            parity: 1.0,
        },
        annotations: vec![astrometry::Annotation {
            names: vec!["NGC 1976".to_string(), "M 42".to_string()],
            kind: "ngc".to_string(),
            pixelx: 10.0,
            pixely: 20.0,
            radius: 300.0,
        }],
        machine_tags: vec!["NGC 1976".to_string()],
    }
}

/// Scriptable Astrometry.net for worker tests
pub struct FakeAstrometry {
    /// Error message returned by every upload, if set
    pub upload_error: Mutex<Option<String>>,
    pub submission_id: i64,
    /// Job id the submission reports; `None` while the queue is busy
    pub remote_job_id: Mutex<Option<i64>>,
    pub status: Mutex<RemoteJobStatus>,
    pub uploads: AtomicUsize,
}

impl Default for FakeAstrometry {
    fn default() -> Self {
        Self {
            upload_error: Mutex::new(None),
            submission_id: 4242,
            remote_job_id: Mutex::new(Some(777)),
            status: Mutex::new(RemoteJobStatus::Success),
            uploads: AtomicUsize::new(0),
        }
    }
}

impl FakeAstrometry {
    pub fn set_status(&self, status: RemoteJobStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_upload_error(&self, error: Option<&str>) {
        *self.upload_error.lock().unwrap() = error.map(str::to_string);
    }
}

impl AstrometryApi for FakeAstrometry {
    async fn upload(&self, _file_name: &str, _bytes: Vec<u8>) -> Result<i64, AstrometryError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let error = self.upload_error.lock().unwrap().clone();
        match error {
            Some(message) => Err(AstrometryError::Network(message)),
            None => Ok(self.submission_id),
        }
    }

    async fn submission_status(&self, _submission_id: i64) -> Result<SubmissionStatus, AstrometryError> {
        let job = *self.remote_job_id.lock().unwrap();
        Ok(SubmissionStatus {
            jobs: vec![job],
            processing_finished: None,
        })
    }

    async fn job_status(&self, _job_id: i64) -> Result<RemoteJobStatus, AstrometryError> {
        Ok(*self.status.lock().unwrap())
    }

    async fn job_results(&self, job_id: i64) -> Result<SolveResult, AstrometryError> {
        Ok(test_solution(job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::QueryableByName;
    use diesel::RunQueryDsl;
    use diesel::sql_types::Text;

    #[derive(QueryableByName, Debug)]
    struct TableName {
        #[diesel(sql_type = Text)]
        name: String,
    }

    #[test]
    fn test_setup_test_db_creates_tables() {
        let pool = setup_test_db();
        let mut conn = pool.get().unwrap();

        let tables: Vec<TableName> = diesel::sql_query("SELECT name FROM sqlite_master WHERE type='table'")
            .load(&mut conn)
            .unwrap();

        for expected in [
            "images",
            "tags",
            "image_tags",
            "equipment",
            "image_equipment",
            "plate_solving_jobs",
            "settings",
            "__diesel_schema_migrations",
        ] {
            assert!(
                tables.iter().any(|t| t.name == expected),
                "Table '{}' not found in database",
                expected
            );
        }
    }

    #[test]
    fn test_databases_are_isolated() {
        let first = setup_test_db();
        let second = setup_test_db();
        insert_test_image(&first, "asset-1", "M42.jpg");

        assert_eq!(repo::count_images(&first).unwrap(), 1);
        assert_eq!(repo::count_images(&second).unwrap(), 0);
    }
}
