use crate::astrometry::SolveResult;
use crate::db::{DbPool, with_retry};
use crate::models::{Image, JobStatus, JsonValue, PlateSolvingJob};
use crate::schema::{images, plate_solving_jobs};
use anyhow::{Result, anyhow, bail};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use tracing::{debug, info, instrument, warn};

use super::tag_repo::link_tag_by_name;

/// Column changes for a job; `None` leaves a column alone
#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = plate_solving_jobs)]
struct JobChanges {
    status: Option<JobStatus>,
    submission_id: Option<Option<i64>>,
    remote_job_id: Option<Option<i64>>,
    attempts: Option<i32>,
    error_message: Option<Option<String>>,
    result: Option<Option<JsonValue>>,
    next_attempt_at: Option<Option<NaiveDateTime>>,
    submitted_at: Option<Option<NaiveDateTime>>,
    completed_at: Option<Option<NaiveDateTime>>,
    updated_at: Option<NaiveDateTime>,
}

/// Counts of jobs in each state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub pending: i64,
    pub processing: i64,
    pub success: i64,
    pub failed: i64,
}

/// Applies `changes` to a job that is currently in state `from`
///
/// The status filter makes the update a compare-and-set: if another task
/// already moved the job on, nothing is written and `Ok(None)` is returned.
fn apply_changes(
    conn: &mut SqliteConnection,
    job_id: &str,
    from: JobStatus,
    mut changes: JobChanges,
) -> Result<Option<PlateSolvingJob>> {
    if let Some(to) = changes.status {
        if from != to && !from.can_transition_to(to) {
            bail!("Invalid job transition from {} to {}", from, to);
        }
    }
    changes.updated_at = Some(Utc::now().naive_utc());

    let updated = with_retry(conn, |conn| {
        diesel::update(
            plate_solving_jobs::table
                .find(job_id)
                .filter(plate_solving_jobs::status.eq(from)),
        )
        .set(&changes)
        .returning(PlateSolvingJob::as_returning())
        .get_result(conn)
        .optional()
    })?;

    if updated.is_none() {
        warn!(job_id, %from, "Job was not in the expected state, skipping update");
    }
    Ok(updated)
}

/// Creates a pending job for an image unless it already has an active one
///
/// The check and the insert run in one immediate transaction so concurrent
/// requests cannot both enqueue the same image.
///
/// ### Returns
///
/// The new job, or `None` when a pending or processing job already exists
#[instrument(skip(pool))]
pub fn create_job_if_idle(pool: &DbPool, image_id: &str) -> Result<Option<PlateSolvingJob>> {
    let conn = &mut pool.get()?;
    conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
        let active: i64 = plate_solving_jobs::table
            .filter(plate_solving_jobs::image_id.eq(image_id))
            .filter(plate_solving_jobs::status.eq_any([JobStatus::Pending, JobStatus::Processing]))
            .count()
            .get_result(conn)?;
        if active > 0 {
            debug!("Image already has an active job");
            return Ok(None);
        }

        let job = PlateSolvingJob::new(image_id.to_string());
        diesel::insert_into(plate_solving_jobs::table)
            .values(&job)
            .execute(conn)?;
        info!("Queued plate-solving job {}", job.id);
        Ok(Some(job))
    })
}

/// Retrieves a job by its ID
pub fn get_job(pool: &DbPool, job_id: &str) -> Result<Option<PlateSolvingJob>> {
    let conn = &mut pool.get()?;
    let job = plate_solving_jobs::table
        .find(job_id)
        .select(PlateSolvingJob::as_select())
        .first(conn)
        .optional()?;
    Ok(job)
}

/// Lists jobs, newest first, optionally restricted to one status
pub fn list_jobs(pool: &DbPool, status: Option<JobStatus>) -> Result<Vec<PlateSolvingJob>> {
    let conn = &mut pool.get()?;
    let mut query = plate_solving_jobs::table.into_boxed();
    if let Some(status) = status {
        query = query.filter(plate_solving_jobs::status.eq(status));
    }
    let jobs = query
        .order((plate_solving_jobs::created_at.desc(), plate_solving_jobs::id.asc()))
        .select(PlateSolvingJob::as_select())
        .load(conn)?;
    Ok(jobs)
}

/// Lists the jobs of one image, newest first
pub fn list_jobs_for_image(pool: &DbPool, image_id: &str) -> Result<Vec<PlateSolvingJob>> {
    let conn = &mut pool.get()?;
    let jobs = plate_solving_jobs::table
        .filter(plate_solving_jobs::image_id.eq(image_id))
        .order(plate_solving_jobs::created_at.desc())
        .select(PlateSolvingJob::as_select())
        .load(conn)?;
    Ok(jobs)
}

/// The most recently created job of an image
pub fn latest_job_for_image(pool: &DbPool, image_id: &str) -> Result<Option<PlateSolvingJob>> {
    Ok(list_jobs_for_image(pool, image_id)?.into_iter().next())
}

/// Lists jobs in `status` that are due at `now`, oldest first
///
/// ### Arguments
///
/// * `limit` - Maximum number of jobs to return
pub fn list_due_jobs(pool: &DbPool, status: JobStatus, now: NaiveDateTime, limit: i64) -> Result<Vec<PlateSolvingJob>> {
    let conn = &mut pool.get()?;
    let jobs = plate_solving_jobs::table
        .filter(plate_solving_jobs::status.eq(status))
        .filter(
            plate_solving_jobs::next_attempt_at
                .is_null()
                .or(plate_solving_jobs::next_attempt_at.le(now)),
        )
        .order(plate_solving_jobs::created_at.asc())
        .limit(limit)
        .select(PlateSolvingJob::as_select())
        .load(conn)?;
    Ok(jobs)
}

/// Counts jobs per status
pub fn count_jobs_by_status(pool: &DbPool) -> Result<JobCounts> {
    let conn = &mut pool.get()?;
    let rows: Vec<(JobStatus, i64)> = plate_solving_jobs::table
        .group_by(plate_solving_jobs::status)
        .select((plate_solving_jobs::status, diesel::dsl::count_star()))
        .load(conn)?;

    let mut counts = JobCounts::default();
    for (status, count) in rows {
        match status {
            JobStatus::Pending => counts.pending = count,
            JobStatus::Processing => counts.processing = count,
            JobStatus::Success => counts.success = count,
            JobStatus::Failed => counts.failed = count,
        }
    }
    Ok(counts)
}

/// Records a successful upload: the job moves to processing
#[instrument(skip(pool))]
pub fn mark_submitted(pool: &DbPool, job_id: &str, submission_id: i64) -> Result<Option<PlateSolvingJob>> {
    let conn = &mut pool.get()?;
    let now = Utc::now().naive_utc();
    apply_changes(
        conn,
        job_id,
        JobStatus::Pending,
        JobChanges {
            status: Some(JobStatus::Processing),
            submission_id: Some(Some(submission_id)),
            remote_job_id: Some(None),
            submitted_at: Some(Some(now)),
            next_attempt_at: Some(Some(now)),
            error_message: Some(None),
            ..Default::default()
        },
    )
}

/// Stores the Astrometry.net job id once the submission has one
pub fn set_remote_job_id(pool: &DbPool, job_id: &str, remote_job_id: i64) -> Result<Option<PlateSolvingJob>> {
    let conn = &mut pool.get()?;
    apply_changes(
        conn,
        job_id,
        JobStatus::Processing,
        JobChanges {
            remote_job_id: Some(Some(remote_job_id)),
            ..Default::default()
        },
    )
}

/// Records a failed attempt and schedules the job to be picked up again
///
/// The job keeps its status so a processing job resumes polling rather
/// than uploading again.
#[instrument(skip(pool, error))]
pub fn schedule_retry(
    pool: &DbPool,
    job: &PlateSolvingJob,
    error: &str,
    next_attempt_at: NaiveDateTime,
) -> Result<Option<PlateSolvingJob>> {
    let conn = &mut pool.get()?;
    apply_changes(
        conn,
        &job.id,
        job.status,
        JobChanges {
            attempts: Some(job.attempts + 1),
            error_message: Some(Some(error.to_string())),
            next_attempt_at: Some(Some(next_attempt_at)),
            ..Default::default()
        },
    )
}

/// Marks a job as failed for good
///
/// ### Arguments
///
/// * `count_attempt` - Whether the failure consumed an attempt (transport
///   errors do, a definitive "could not solve" from the service does not)
#[instrument(skip(pool, error))]
pub fn mark_failed(pool: &DbPool, job: &PlateSolvingJob, error: &str, count_attempt: bool) -> Result<Option<PlateSolvingJob>> {
    let conn = &mut pool.get()?;
    let attempts = if count_attempt { job.attempts + 1 } else { job.attempts };
    apply_changes(
        conn,
        &job.id,
        job.status,
        JobChanges {
            status: Some(JobStatus::Failed),
            attempts: Some(attempts),
            error_message: Some(Some(error.to_string())),
            next_attempt_at: Some(None),
            completed_at: Some(Some(Utc::now().naive_utc())),
            ..Default::default()
        },
    )
}

/// Puts a failed job back in the queue with a fresh attempt budget
#[instrument(skip(pool))]
pub fn reset_for_retry(pool: &DbPool, job_id: &str) -> Result<Option<PlateSolvingJob>> {
    let conn = &mut pool.get()?;
    apply_changes(
        conn,
        job_id,
        JobStatus::Failed,
        JobChanges {
            status: Some(JobStatus::Pending),
            attempts: Some(0),
            submission_id: Some(None),
            remote_job_id: Some(None),
            error_message: Some(None),
            result: Some(None),
            next_attempt_at: Some(None),
            submitted_at: Some(None),
            completed_at: Some(None),
            ..Default::default()
        },
    )
}

/// Completes a job with its solution and writes the calibration back
///
/// In one transaction:
/// - the job becomes `success` and stores the raw result
/// - the image gets its coordinates, scale, radius and orientation
/// - every named object in the field is linked to the image as a tag
/// - the most prominent object fills `object_name` if the user left it empty
///
/// ### Returns
///
/// The completed job and the updated image
///
/// ### Errors
///
/// Returns an error if the job is no longer processing or the image is gone
#[instrument(skip(pool, solution), fields(remote_job = solution.job_id))]
pub fn complete_job(pool: &DbPool, job_id: &str, solution: &SolveResult) -> Result<(PlateSolvingJob, Image)> {
    let conn = &mut pool.get()?;
    let result_json = serde_json::to_value(solution)?;

    conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
        let now = Utc::now().naive_utc();
        let job = apply_changes(
            conn,
            job_id,
            JobStatus::Processing,
            JobChanges {
                status: Some(JobStatus::Success),
                remote_job_id: Some(Some(solution.job_id)),
                result: Some(Some(JsonValue(result_json))),
                error_message: Some(None),
                next_attempt_at: Some(None),
                completed_at: Some(Some(now)),
                ..Default::default()
            },
        )?
        .ok_or_else(|| anyhow!("Job {} is not processing", job_id))?;

        let calibration = &solution.calibration;
        diesel::update(images::table.find(&job.image_id))
            .set((
                images::ra.eq(Some(calibration.ra)),
                images::dec.eq(Some(calibration.dec)),
                images::pixel_scale.eq(Some(calibration.pixscale)),
                images::field_radius.eq(Some(calibration.radius)),
                images::orientation.eq(Some(calibration.orientation)),
                images::plate_solved.eq(true),
                images::updated_at.eq(now),
            ))
            .execute(conn)?;

        let names = solution.object_names();
        for name in &names {
            link_tag_by_name(conn, &job.image_id, name)?;
        }

        if let Some(primary) = solution.primary_object().or_else(|| names.first().cloned()) {
            diesel::update(
                images::table
                    .find(&job.image_id)
                    .filter(images::object_name.is_null().or(images::object_name.eq(""))),
            )
            .set(images::object_name.eq(Some(primary)))
            .execute(conn)?;
        }

        let image = images::table
            .find(&job.image_id)
            .select(Image::as_select())
            .first(conn)?;

        info!(tags = names.len(), "Plate solve completed for image {}", image.id);
        Ok((job, image))
    })
}

#[cfg(test)]
mod tests;
