use super::*;
use crate::astrometry::{Annotation, Calibration};
use crate::repo::{get_image, list_tags_for_image, update_image};
use crate::dto::UpdateImageDto;
use crate::test_utils::{insert_test_image, setup_test_db};
use chrono::Duration;

fn solution() -> SolveResult {
    SolveResult {
        job_id: 777,
        calibration: Calibration {
            ra: 83.822,
            dec: -5.391,
            radius: 1.2,
            pixscale: 3.1,
            orientation: 178.5,
            parity: 1.0,
        },
        annotations: vec![
            Annotation {
                names: vec!["NGC 1976".to_string(), "M 42".to_string()],
                kind: "ngc".to_string(),
                pixelx: 10.0,
                pixely: 20.0,
                radius: 300.0,
            },
            Annotation {
                names: vec!["HD 37061".to_string()],
                kind: "hd".to_string(),
                pixelx: 1.0,
                pixely: 1.0,
                radius: 0.0,
            },
        ],
        machine_tags: vec!["NGC 1976".to_string()],
    }
}

fn processing_job(pool: &DbPool, immich_id: &str) -> PlateSolvingJob {
    let image = insert_test_image(pool, immich_id, "M42.jpg");
    let job = create_job_if_idle(pool, &image.id).unwrap().unwrap();
    mark_submitted(pool, &job.id, 4242).unwrap().unwrap()
}

#[test]
fn test_create_job_if_idle_rejects_second_active_job() {
    let pool = setup_test_db();
    let image = insert_test_image(&pool, "asset-1", "M42.jpg");

    let job = create_job_if_idle(&pool, &image.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(create_job_if_idle(&pool, &image.id).unwrap().is_none());

    // A failed job does not block a new one
    mark_failed(&pool, &job, "boom", true).unwrap().unwrap();
    assert!(create_job_if_idle(&pool, &image.id).unwrap().is_some());
}

#[test]
fn test_mark_submitted_moves_to_processing() {
    let pool = setup_test_db();
    let job = processing_job(&pool, "asset-1");

    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.submission_id, Some(4242));
    assert!(job.submitted_at.is_some());

    // Already processing: a second submit is a no-op
    assert!(mark_submitted(&pool, &job.id, 1).unwrap().is_none());
}

#[test]
fn test_set_remote_job_id() {
    let pool = setup_test_db();
    let job = processing_job(&pool, "asset-1");
    let job = set_remote_job_id(&pool, &job.id, 99).unwrap().unwrap();
    assert_eq!(job.remote_job_id, Some(99));
    assert_eq!(job.status, JobStatus::Processing);
}

#[test]
fn test_list_due_jobs_respects_schedule() {
    let pool = setup_test_db();
    let image = insert_test_image(&pool, "asset-1", "M42.jpg");
    let job = create_job_if_idle(&pool, &image.id).unwrap().unwrap();
    let now = Utc::now().naive_utc();

    assert_eq!(list_due_jobs(&pool, JobStatus::Pending, now, 5).unwrap().len(), 1);

    let later = now + Duration::minutes(5);
    let job = schedule_retry(&pool, &job, "network down", later).unwrap().unwrap();
    assert_eq!(job.attempts, 1);
    assert_eq!(job.error_message.as_deref(), Some("network down"));
    assert_eq!(job.status, JobStatus::Pending);

    assert!(list_due_jobs(&pool, JobStatus::Pending, now, 5).unwrap().is_empty());
    assert_eq!(list_due_jobs(&pool, JobStatus::Pending, later, 5).unwrap().len(), 1);
    assert!(list_due_jobs(&pool, JobStatus::Processing, later, 5).unwrap().is_empty());
}

#[test]
fn test_list_due_jobs_limit() {
    let pool = setup_test_db();
    for i in 0..7 {
        let image = insert_test_image(&pool, &format!("asset-{}", i), "M42.jpg");
        create_job_if_idle(&pool, &image.id).unwrap();
    }
    let due = list_due_jobs(&pool, JobStatus::Pending, Utc::now().naive_utc(), 5).unwrap();
    assert_eq!(due.len(), 5);
}

#[test]
fn test_reset_for_retry_only_from_failed() {
    let pool = setup_test_db();
    let job = processing_job(&pool, "asset-1");

    assert!(reset_for_retry(&pool, &job.id).unwrap().is_none());

    let failed = mark_failed(&pool, &job, "timed out", false).unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.attempts, 0);
    assert!(failed.completed_at.is_some());

    let reset = reset_for_retry(&pool, &job.id).unwrap().unwrap();
    assert_eq!(reset.status, JobStatus::Pending);
    assert_eq!(reset.attempts, 0);
    assert_eq!(reset.submission_id, None);
    assert_eq!(reset.error_message, None);
}

#[test]
fn test_complete_job_writes_back() {
    let pool = setup_test_db();
    let job = processing_job(&pool, "asset-1");

    let (done, image) = complete_job(&pool, &job.id, &solution()).unwrap();
    assert_eq!(done.status, JobStatus::Success);
    assert_eq!(done.remote_job_id, Some(777));
    assert!(done.result.is_some());

    assert!(image.plate_solved);
    assert_eq!(image.ra, Some(83.822));
    assert_eq!(image.pixel_scale, Some(3.1));
    assert_eq!(image.object_name.as_deref(), Some("NGC 1976"));

    let tags: Vec<String> = list_tags_for_image(&pool, &image.id).unwrap().iter().map(|t| t.get_name()).collect();
    assert_eq!(tags, vec!["M 42", "NGC 1976"]);

    // Completing twice fails: the job is no longer processing
    assert!(complete_job(&pool, &job.id, &solution()).is_err());
}

#[test]
fn test_complete_job_keeps_user_object_name() {
    let pool = setup_test_db();
    let job = processing_job(&pool, "asset-1");
    update_image(
        &pool,
        &job.image_id,
        UpdateImageDto {
            object_name: Some("Great Orion Nebula".to_string()),
            ..Default::default()
        },
    )
    .unwrap();

    complete_job(&pool, &job.id, &solution()).unwrap();
    let image = get_image(&pool, &job.image_id).unwrap().unwrap();
    assert_eq!(image.object_name.as_deref(), Some("Great Orion Nebula"));
}

#[test]
fn test_count_and_list_jobs() {
    let pool = setup_test_db();
    let processing = processing_job(&pool, "asset-1");
    let image = insert_test_image(&pool, "asset-2", "M31.jpg");
    create_job_if_idle(&pool, &image.id).unwrap();

    let counts = count_jobs_by_status(&pool).unwrap();
    assert_eq!(counts, JobCounts { pending: 1, processing: 1, success: 0, failed: 0 });

    assert_eq!(list_jobs(&pool, None).unwrap().len(), 2);
    let only_processing = list_jobs(&pool, Some(JobStatus::Processing)).unwrap();
    assert_eq!(only_processing.len(), 1);
    assert_eq!(only_processing[0].id, processing.id);

    let latest = latest_job_for_image(&pool, &processing.image_id).unwrap().unwrap();
    assert_eq!(latest.id, processing.id);
    assert!(get_job(&pool, "missing").unwrap().is_none());
}
