use super::*;
use crate::config::base_config;
use crate::models::SettingsUpdate;
use crate::schema::plate_solving_jobs;
use crate::test_utils::{FakeAstrometry, FakeImmich, insert_test_image, setup_test_db};
use diesel::prelude::*;
use std::sync::atomic::Ordering;
use tempfile::tempdir;

fn solving_settings(max_attempts: u32) -> Settings {
    Settings::from_config(&base_config(None)).apply_update(SettingsUpdate {
        astrometry_api_key: Some("nova-key".to_string()),
        astrometry_enabled: Some(true),
        max_solve_attempts: Some(max_attempts),
        ..Default::default()
    })
}

fn immich_with(asset_id: &str) -> FakeImmich {
    FakeImmich {
        originals: [(asset_id.to_string(), vec![0xFF, 0xD8, 0xFF])].into_iter().collect(),
        ..Default::default()
    }
}

struct Harness {
    pool: Arc<DbPool>,
    immich: FakeImmich,
    astrometry: FakeAstrometry,
    settings: Settings,
    config: Config,
    events: EventBus,
}

impl Harness {
    fn new() -> Self {
        Self {
            pool: setup_test_db(),
            immich: immich_with("a1"),
            astrometry: FakeAstrometry::default(),
            settings: solving_settings(3),
            config: base_config(None),
            events: EventBus::default(),
        }
    }

    async fn tick(&self) -> TickSummary {
        let ctx = SolverContext {
            pool: &self.pool,
            immich: Some(&self.immich),
            astrometry: &self.astrometry,
            settings: &self.settings,
            config: &self.config,
            events: &self.events,
        };
        tick(&ctx).await.unwrap()
    }

    fn queue_job(&self) -> PlateSolvingJob {
        let image = insert_test_image(&self.pool, "a1", "M42.jpg");
        repo::create_job_if_idle(&self.pool, &image.id).unwrap().unwrap()
    }

    fn job(&self, job_id: &str) -> PlateSolvingJob {
        repo::get_job(&self.pool, job_id).unwrap().unwrap()
    }

    /// Makes a job due now, whatever backoff it was given
    fn make_due(&self, job_id: &str) {
        let conn = &mut self.pool.get().unwrap();
        diesel::update(plate_solving_jobs::table.find(job_id))
            .set(plate_solving_jobs::next_attempt_at.eq(None::<NaiveDateTime>))
            .execute(conn)
            .unwrap();
    }
}

#[test]
fn test_backoff_doubles_and_caps() {
    let poll = Duration::from_secs(10);
    assert_eq!(backoff(poll, 0), Duration::from_secs(10));
    assert_eq!(backoff(poll, 1), Duration::from_secs(10));
    assert_eq!(backoff(poll, 2), Duration::from_secs(20));
    assert_eq!(backoff(poll, 3), Duration::from_secs(40));
    assert_eq!(backoff(poll, 12), MAX_BACKOFF);
    assert_eq!(backoff(poll, i32::MAX), MAX_BACKOFF);
}

#[tokio::test]
async fn test_pending_job_is_submitted() {
    let harness = Harness::new();
    let job = harness.queue_job();
    let mut rx = harness.events.subscribe();

    let summary = harness.tick().await;
    assert_eq!(summary.submitted, 1);
    assert_eq!(harness.immich.downloads.load(Ordering::SeqCst), 1);
    assert_eq!(harness.astrometry.uploads.load(Ordering::SeqCst), 1);

    let job = harness.job(&job.id);
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.submission_id, Some(4242));
    assert!(job.submitted_at.is_some());

    match rx.recv().await.unwrap() {
        SkyEvent::JobUpdated { job: updated } => assert_eq!(updated.status, JobStatus::Processing),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_full_lifecycle_completes_and_writes_back() {
    let harness = Harness::new();
    let job = harness.queue_job();

    harness.tick().await;
    let summary = harness.tick().await;
    assert_eq!(summary.completed, 1);

    let job = harness.job(&job.id);
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.remote_job_id, Some(777));

    let image = repo::get_image(&harness.pool, &job.image_id).unwrap().unwrap();
    assert!(image.plate_solved);
    assert_eq!(image.ra, Some(83.822));
    assert_eq!(image.object_name.as_deref(), Some("NGC 1976"));
    assert_eq!(repo::list_tags_for_image(&harness.pool, &image.id).unwrap().len(), 2);

    // Nothing left to do
    assert_eq!(harness.tick().await, TickSummary::default());
}

#[tokio::test]
async fn test_solving_job_keeps_waiting() {
    let harness = Harness::new();
    harness.astrometry.set_status(RemoteJobStatus::Solving);
    let job = harness.queue_job();

    harness.tick().await;
    let summary = harness.tick().await;
    assert_eq!(summary.waiting, 1);
    assert_eq!(harness.job(&job.id).status, JobStatus::Processing);
}

#[tokio::test]
async fn test_submission_without_job_keeps_waiting() {
    let harness = Harness::new();
    *harness.astrometry.remote_job_id.lock().unwrap() = None;
    let job = harness.queue_job();

    harness.tick().await;
    assert_eq!(harness.tick().await.waiting, 1);

    let job = harness.job(&job.id);
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.remote_job_id, None);
}

#[tokio::test]
async fn test_remote_failure_fails_without_counting_attempt() {
    let harness = Harness::new();
    harness.astrometry.set_status(RemoteJobStatus::Failure);
    let job = harness.queue_job();

    harness.tick().await;
    assert_eq!(harness.tick().await.failed, 1);

    let job = harness.job(&job.id);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.error_message.as_deref(), Some("Astrometry.net could not solve the image"));
}

#[tokio::test]
async fn test_stale_processing_job_times_out() {
    let harness = Harness::new();
    harness.astrometry.set_status(RemoteJobStatus::Solving);
    let job = harness.queue_job();
    harness.tick().await;

    let long_ago = Utc::now().naive_utc() - chrono::Duration::hours(2);
    {
        let conn = &mut harness.pool.get().unwrap();
        diesel::update(plate_solving_jobs::table.find(&job.id))
            .set(plate_solving_jobs::submitted_at.eq(Some(long_ago)))
            .execute(conn)
            .unwrap();
    }

    assert_eq!(harness.tick().await.failed, 1);
    let job = harness.job(&job.id);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("Plate solving timed out"));
}

#[tokio::test]
async fn test_upload_errors_back_off_then_fail() {
    let harness = Harness::new();
    harness.astrometry.set_upload_error(Some("connection reset"));
    let job = harness.queue_job();

    assert_eq!(harness.tick().await.retried, 1);
    let first = harness.job(&job.id);
    assert_eq!(first.status, JobStatus::Pending);
    assert_eq!(first.attempts, 1);
    assert!(first.next_attempt_at.unwrap() > Utc::now().naive_utc());
    assert!(first.error_message.unwrap().contains("connection reset"));

    // Not due yet: nothing happens
    assert_eq!(harness.tick().await, TickSummary::default());
    assert_eq!(harness.astrometry.uploads.load(Ordering::SeqCst), 1);

    harness.make_due(&job.id);
    assert_eq!(harness.tick().await.retried, 1);
    assert_eq!(harness.job(&job.id).attempts, 2);

    harness.make_due(&job.id);
    assert_eq!(harness.tick().await.failed, 1);
    let failed = harness.job(&job.id);
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.attempts, 3);
}

#[tokio::test]
async fn test_recovers_after_transient_error() {
    let harness = Harness::new();
    harness.astrometry.set_upload_error(Some("timeout"));
    let job = harness.queue_job();

    harness.tick().await;
    harness.astrometry.set_upload_error(None);
    harness.make_due(&job.id);

    assert_eq!(harness.tick().await.submitted, 1);
    assert_eq!(harness.job(&job.id).status, JobStatus::Processing);
}

#[tokio::test]
async fn test_missing_original_fails_immediately() {
    let mut harness = Harness::new();
    harness.immich = FakeImmich::default();
    let job = harness.queue_job();

    assert_eq!(harness.tick().await.failed, 1);
    let job = harness.job(&job.id);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 0);
    assert_eq!(harness.astrometry.uploads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_pending_jobs_wait_without_immich() {
    let harness = Harness::new();
    let job = harness.queue_job();

    let ctx: SolverContext<'_, FakeImmich, FakeAstrometry> = SolverContext {
        pool: &harness.pool,
        immich: None,
        astrometry: &harness.astrometry,
        settings: &harness.settings,
        config: &harness.config,
        events: &harness.events,
    };
    assert_eq!(tick(&ctx).await.unwrap(), TickSummary::default());
    assert_eq!(harness.job(&job.id).status, JobStatus::Pending);
}

#[tokio::test]
async fn test_pending_jobs_are_limited_per_tick() {
    let harness = Harness::new();
    let mut immich = FakeImmich::default();
    for i in 0..7 {
        let asset_id = format!("asset-{}", i);
        immich.originals.insert(asset_id.clone(), vec![1, 2, 3]);
        let image = insert_test_image(&harness.pool, &asset_id, "M42.jpg");
        repo::create_job_if_idle(&harness.pool, &image.id).unwrap();
    }
    let harness = Harness { immich, ..harness };

    assert_eq!(harness.tick().await.submitted, MAX_JOBS_PER_TICK as usize);
    assert_eq!(repo::list_jobs(&harness.pool, Some(JobStatus::Pending)).unwrap().len(), 2);
}

#[tokio::test]
async fn test_sidecar_written_on_success_when_enabled() {
    let dir = tempdir().unwrap();
    let mut harness = Harness::new();
    harness.settings.sidecar_enabled = true;
    harness.config.sidecar_dir = Some(dir.path().to_path_buf());
    harness.queue_job();

    harness.tick().await;
    harness.tick().await;

    let sidecar = std::fs::read_to_string(dir.path().join("M42.jpg.xmp")).unwrap();
    assert!(sidecar.contains("avm:Spatial.ReferenceValue"));
    assert!(sidecar.contains("NGC 1976"));
}

#[tokio::test]
async fn test_no_sidecar_when_disabled() {
    let dir = tempdir().unwrap();
    let mut harness = Harness::new();
    harness.config.sidecar_dir = Some(dir.path().to_path_buf());
    harness.queue_job();

    harness.tick().await;
    harness.tick().await;

    assert!(!dir.path().join("M42.jpg.xmp").exists());
}

#[test]
fn test_enqueue_image_errors() {
    let pool = setup_test_db();
    let events = EventBus::default();
    let settings = solving_settings(3);
    let image = insert_test_image(&pool, "a1", "M42.jpg");

    assert!(matches!(
        enqueue_image(&pool, &settings, &events, "missing"),
        Err(ApiError::NotFound(_))
    ));

    let disabled = Settings::from_config(&base_config(None));
    assert!(matches!(
        enqueue_image(&pool, &disabled, &events, &image.id),
        Err(ApiError::Unavailable(_))
    ));

    let job = enqueue_image(&pool, &settings, &events, &image.id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(matches!(
        enqueue_image(&pool, &settings, &events, &image.id),
        Err(ApiError::Conflict(_))
    ));
}

#[test]
fn test_enqueue_bulk() {
    let pool = setup_test_db();
    let events = EventBus::default();
    let settings = solving_settings(3);
    let first = insert_test_image(&pool, "a1", "M42.jpg");
    let second = insert_test_image(&pool, "a2", "M31.jpg");
    repo::create_job_if_idle(&pool, &first.id).unwrap();

    let result = enqueue_bulk(
        &pool,
        &settings,
        &events,
        &[first.id.clone(), second.id.clone(), "missing".to_string()],
        false,
    )
    .unwrap();
    assert_eq!(result.enqueued.len(), 1);
    assert_eq!(result.enqueued[0].image_id, second.id);
    assert_eq!(result.skipped, vec![first.id.clone()]);
    assert_eq!(result.not_found, vec!["missing".to_string()]);

    insert_test_image(&pool, "a3", "M45.jpg");
    let result = enqueue_bulk(&pool, &settings, &events, &[], true).unwrap();
    assert_eq!(result.enqueued.len(), 1);
    assert_eq!(result.skipped.len(), 2);
}

#[test]
fn test_retry_job_only_from_failed() {
    let pool = setup_test_db();
    let events = EventBus::default();
    let image = insert_test_image(&pool, "a1", "M42.jpg");
    let job = repo::create_job_if_idle(&pool, &image.id).unwrap().unwrap();

    assert!(matches!(retry_job(&pool, &events, &job.id), Err(ApiError::Conflict(_))));
    assert!(matches!(retry_job(&pool, &events, "missing"), Err(ApiError::NotFound(_))));

    repo::mark_failed(&pool, &job, "boom", true).unwrap();
    let retried = retry_job(&pool, &events, &job.id).unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(retried.attempts, 0);
}
