//! Plate-solving worker
//!
//! Drives jobs through `pending → processing → success | failed` against
//! Astrometry.net. Each tick uploads a few due pending jobs and polls every
//! due processing job; the job row is the only state, so a restart resumes
//! where the previous process stopped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

use crate::AppState;
use crate::astrometry::{AstrometryApi, AstrometryClient, AstrometryError, RemoteJobStatus};
use crate::config::Config;
use crate::db::DbPool;
use crate::dto::BulkPlateSolveResult;
use crate::errors::ApiError;
use crate::immich::{ImmichApi, ImmichClient, ImmichError};
use crate::models::{Image, JobStatus, PlateSolvingJob, Settings};
use crate::repo;
use crate::services::events::{EventBus, SkyEvent};
use crate::services::xmp;

/// Pending jobs uploaded per tick
pub const MAX_JOBS_PER_TICK: i64 = 5;

/// Processing jobs polled per tick
pub const MAX_POLLS_PER_TICK: i64 = 50;

/// Longest delay between two attempts of a job
pub const MAX_BACKOFF: Duration = Duration::from_secs(30 * 60);

/// Delay before retrying a job that has failed `attempts` times
///
/// `poll_interval × 2^(attempts-1)`, capped at [`MAX_BACKOFF`].
pub fn backoff(poll_interval: Duration, attempts: i32) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 31) as u32;
    poll_interval
        .checked_mul(1u32 << exponent)
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

/// How a step of the lifecycle went wrong
#[derive(Debug)]
enum StepError {
    /// Worth another attempt: network trouble, upstream errors
    Transient(String),
    /// Retrying cannot help
    Permanent(String),
    /// Database failure; the job is left as it is
    Internal(anyhow::Error),
}

impl From<ImmichError> for StepError {
    fn from(err: ImmichError) -> Self {
        match err {
            ImmichError::NotFound(_) => StepError::Permanent("Original image no longer exists in Immich".to_string()),
            other => StepError::Transient(format!("Immich: {}", other)),
        }
    }
}

impl From<AstrometryError> for StepError {
    fn from(err: AstrometryError) -> Self {
        StepError::Transient(format!("Astrometry.net: {}", err))
    }
}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        StepError::Internal(err)
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    pub retried: usize,
    /// Processing jobs still being solved remotely
    pub waiting: usize,
}

/// Everything a tick needs
pub struct SolverContext<'a, I, A> {
    pub pool: &'a DbPool,
    /// Absent when Immich is not configured; pending jobs then wait
    pub immich: Option<&'a I>,
    pub astrometry: &'a A,
    pub settings: &'a Settings,
    pub config: &'a Config,
    pub events: &'a EventBus,
}

impl<I: ImmichApi, A: AstrometryApi> SolverContext<'_, I, A> {
    fn publish(&self, job: Option<PlateSolvingJob>) {
        if let Some(job) = job {
            self.events.publish(SkyEvent::JobUpdated { job });
        }
    }

    /// Records a failed step on the job
    fn handle_error(&self, job: &PlateSolvingJob, err: StepError, summary: &mut TickSummary) {
        match err {
            StepError::Transient(message) => {
                let attempts = job.attempts + 1;
                if attempts >= self.settings.max_solve_attempts as i32 {
                    warn!(job_id = %job.id, attempts, "Giving up on job: {}", message);
                    if let Some(failed) = self.log_db(repo::mark_failed(self.pool, job, &message, true)) {
                        summary.failed += 1;
                        self.publish(failed);
                    }
                } else {
                    let delay = backoff(self.config.poll_interval(), attempts);
                    let next_attempt_at = Utc::now().naive_utc() + chrono_duration(delay);
                    info!(job_id = %job.id, attempts, ?delay, "Retrying job later: {}", message);
                    if let Some(retried) = self.log_db(repo::schedule_retry(self.pool, job, &message, next_attempt_at)) {
                        summary.retried += 1;
                        self.publish(retried);
                    }
                }
            }
            StepError::Permanent(message) => {
                warn!(job_id = %job.id, "Job failed: {}", message);
                if let Some(failed) = self.log_db(repo::mark_failed(self.pool, job, &message, false)) {
                    summary.failed += 1;
                    self.publish(failed);
                }
            }
            StepError::Internal(err) => {
                error!(job_id = %job.id, "Database error while processing job: {:#}", err);
            }
        }
    }

    fn log_db<T>(&self, result: anyhow::Result<T>) -> Option<T> {
        result.map_err(|e| error!("Failed to update job: {:#}", e)).ok()
    }

    /// Downloads the original and uploads it; the job becomes processing
    #[instrument(skip_all, fields(job_id = %job.id))]
    async fn submit(&self, immich: &I, job: &PlateSolvingJob) -> Result<Option<PlateSolvingJob>, StepError> {
        let image = repo::get_image(self.pool, &job.image_id)?
            .ok_or_else(|| StepError::Permanent("Image no longer exists".to_string()))?;

        let bytes = immich.download_original(&image.immich_id).await?;
        let submission_id = self.astrometry.upload(&image.filename, bytes).await?;
        info!(submission_id, "Uploaded {} to Astrometry.net", image.filename);

        Ok(repo::mark_submitted(self.pool, &job.id, submission_id)?)
    }

    /// Polls a processing job and finishes it when Astrometry.net is done
    #[instrument(skip_all, fields(job_id = %job.id))]
    async fn poll(&self, job: &PlateSolvingJob, now: NaiveDateTime, summary: &mut TickSummary) -> Result<(), StepError> {
        let Some(submission_id) = job.submission_id else {
            return Err(StepError::Permanent("Processing job has no submission".to_string()));
        };

        let remote_job_id = match job.remote_job_id {
            Some(id) => Some(id),
            None => {
                let status = self.astrometry.submission_status(submission_id).await?;
                match status.job_id() {
                    Some(id) => {
                        debug!(remote_job_id = id, "Submission has a job");
                        self.publish(repo::set_remote_job_id(self.pool, &job.id, id)?);
                        Some(id)
                    }
                    None => None,
                }
            }
        };

        let status = match remote_job_id {
            Some(id) => self.astrometry.job_status(id).await?,
            None => RemoteJobStatus::Solving,
        };

        match (status, remote_job_id) {
            (RemoteJobStatus::Success, Some(id)) => {
                let solution = self.astrometry.job_results(id).await?;
                let (done, image) = repo::complete_job(self.pool, &job.id, &solution)?;
                self.write_sidecar(&image, Some(id));
                summary.completed += 1;
                self.publish(Some(done));
                self.events.publish(SkyEvent::ImageUpdated { image });
            }
            (RemoteJobStatus::Failure, _) => {
                return Err(StepError::Permanent("Astrometry.net could not solve the image".to_string()));
            }
            _ => {
                let started = job.submitted_at.unwrap_or(job.created_at);
                if now - started > self.config.solve_timeout() {
                    return Err(StepError::Permanent("Plate solving timed out".to_string()));
                }
                summary.waiting += 1;
            }
        }
        Ok(())
    }

    /// Writes the sidecar for a freshly solved image when sidecars are on
    ///
    /// A failed write is logged; the solve itself already succeeded.
    fn write_sidecar(&self, image: &Image, remote_job_id: Option<i64>) {
        if !self.settings.sidecar_enabled {
            return;
        }
        let Some(dir) = self.config.sidecar_dir.as_deref() else {
            debug!("Sidecars enabled but no sidecar directory configured");
            return;
        };
        let tags = match repo::list_tags_for_image(self.pool, &image.id) {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Failed to load tags for sidecar: {:#}", e);
                return;
            }
        };
        if let Some(packet) = xmp::render_sidecar(image, &tags, remote_job_id) {
            if let Err(e) = xmp::write_sidecar(dir, &image.filename, &packet) {
                warn!("Failed to write sidecar for {}: {:#}", image.filename, e);
            }
        }
    }
}

fn chrono_duration(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX)
}

/// Runs one pass of the worker
///
/// ### Returns
///
/// A summary of what happened, or an error if the job queue could not be read
pub async fn tick<I: ImmichApi, A: AstrometryApi>(ctx: &SolverContext<'_, I, A>) -> anyhow::Result<TickSummary> {
    let mut summary = TickSummary::default();
    let now = Utc::now().naive_utc();

    for job in repo::list_due_jobs(ctx.pool, JobStatus::Processing, now, MAX_POLLS_PER_TICK)? {
        if let Err(err) = ctx.poll(&job, now, &mut summary).await {
            ctx.handle_error(&job, err, &mut summary);
        }
    }

    match ctx.immich {
        Some(immich) => {
            for job in repo::list_due_jobs(ctx.pool, JobStatus::Pending, now, MAX_JOBS_PER_TICK)? {
                match ctx.submit(immich, &job).await {
                    Ok(submitted) => {
                        if submitted.is_some() {
                            summary.submitted += 1;
                        }
                        ctx.publish(submitted);
                    }
                    Err(err) => ctx.handle_error(&job, err, &mut summary),
                }
            }
        }
        None => debug!("Immich is not configured; pending jobs wait"),
    }

    if summary != TickSummary::default() {
        info!(
            submitted = summary.submitted,
            completed = summary.completed,
            failed = summary.failed,
            retried = summary.retried,
            waiting = summary.waiting,
            "Plate-solve tick"
        );
    }
    Ok(summary)
}

/// Background task running [`tick`] every poll interval
///
/// Settings are re-read on each tick. The Astrometry.net client is kept
/// between ticks so its session survives, and rebuilt when the URL or key
/// changes.
pub struct PlateSolveWorker {
    state: AppState,
    astrometry: Option<Arc<AstrometryClient>>,
}

impl PlateSolveWorker {
    pub fn new(state: AppState) -> Self {
        Self { state, astrometry: None }
    }

    fn astrometry_client(&mut self, settings: &Settings) -> Option<Arc<AstrometryClient>> {
        let Some(key) = settings.astrometry_key() else {
            self.astrometry = None;
            return None;
        };
        match &self.astrometry {
            Some(client) if client.matches(&settings.astrometry_url, key) => {}
            _ => {
                debug!("Creating Astrometry.net client");
                self.astrometry = Some(Arc::new(AstrometryClient::new(
                    self.state.http.clone(),
                    &settings.astrometry_url,
                    key,
                )));
            }
        }
        self.astrometry.clone()
    }

    /// Runs a single tick with the current settings
    pub async fn run_once(&mut self) -> anyhow::Result<TickSummary> {
        let settings = repo::load_settings(&self.state.pool, &self.state.config)?;
        let Some(astrometry) = self.astrometry_client(&settings) else {
            debug!("Astrometry.net is disabled; skipping tick");
            return Ok(TickSummary::default());
        };
        let immich = ImmichClient::from_settings(self.state.http.clone(), &settings).ok();

        let ctx = SolverContext {
            pool: &self.state.pool,
            immich: immich.as_ref(),
            astrometry: astrometry.as_ref(),
            settings: &settings,
            config: &self.state.config,
            events: &self.state.events,
        };
        tick(&ctx).await
    }

    /// Spawns the worker loop
    pub fn spawn(mut self) -> JoinHandle<()> {
        let period = self.state.config.poll_interval();
        info!("Starting plate-solve worker (interval: {:?})", period);

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                timer.tick().await;
                if let Err(e) = self.run_once().await {
                    error!("Plate-solve tick failed: {:#}", e);
                }
            }
        })
    }
}

/// Checks that plate solving is switched on and configured
pub fn ensure_solving_enabled(settings: &Settings) -> Result<(), ApiError> {
    if settings.astrometry_key().is_none() {
        return Err(ApiError::Unavailable(
            "Plate solving is disabled or no Astrometry.net API key is configured".to_string(),
        ));
    }
    Ok(())
}

/// Queues a plate-solve job for one image
///
/// ### Errors
///
/// - `NotFound` when the image does not exist
/// - `Unavailable` when plate solving is disabled
/// - `Conflict` when the image already has a pending or processing job
#[instrument(skip(pool, settings, events))]
pub fn enqueue_image(pool: &DbPool, settings: &Settings, events: &EventBus, image_id: &str) -> Result<PlateSolvingJob, ApiError> {
    repo::get_image(pool, image_id)?.ok_or(ApiError::NotFound("Image"))?;
    ensure_solving_enabled(settings)?;

    let job = repo::create_job_if_idle(pool, image_id)?
        .ok_or_else(|| ApiError::Conflict("Image already has an active plate-solving job".to_string()))?;
    events.publish(SkyEvent::JobUpdated { job: job.clone() });
    Ok(job)
}

/// Queues jobs for several images, skipping those already queued
///
/// ### Arguments
///
/// * `image_ids` - Images to queue; ignored when `all_unsolved` is set
/// * `all_unsolved` - Queue every image that is not plate solved yet
#[instrument(skip(pool, settings, events, image_ids))]
pub fn enqueue_bulk(
    pool: &DbPool,
    settings: &Settings,
    events: &EventBus,
    image_ids: &[String],
    all_unsolved: bool,
) -> Result<BulkPlateSolveResult, ApiError> {
    ensure_solving_enabled(settings)?;

    let candidates = if all_unsolved {
        repo::list_unsolved_image_ids(pool)?
    } else {
        image_ids.to_vec()
    };

    let mut result = BulkPlateSolveResult::default();
    for image_id in candidates {
        if repo::get_image(pool, &image_id)?.is_none() {
            result.not_found.push(image_id);
            continue;
        }
        match repo::create_job_if_idle(pool, &image_id)? {
            Some(job) => {
                result.enqueued.push(job.clone());
                events.publish(SkyEvent::JobUpdated { job });
            }
            None => result.skipped.push(image_id),
        }
    }

    info!(
        enqueued = result.enqueued.len(),
        skipped = result.skipped.len(),
        not_found = result.not_found.len(),
        "Bulk plate-solve request"
    );
    Ok(result)
}

/// Puts a failed job back in the queue
pub fn retry_job(pool: &DbPool, events: &EventBus, job_id: &str) -> Result<PlateSolvingJob, ApiError> {
    let job = repo::get_job(pool, job_id)?.ok_or(ApiError::NotFound("Job"))?;
    if job.status != JobStatus::Failed {
        return Err(ApiError::Conflict(format!("Only failed jobs can be retried; job is {}", job.status)));
    }
    let job = repo::reset_for_retry(pool, job_id)?
        .ok_or_else(|| ApiError::Conflict("Job changed state while retrying".to_string()))?;
    events.publish(SkyEvent::JobUpdated { job: job.clone() });
    Ok(job)
}

#[cfg(test)]
mod tests;
