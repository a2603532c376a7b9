//! Immich synchronization
//!
//! Mirrors the configured Immich albums (or the whole library) into the
//! `images` table. Immich owns the files; the gallery only keeps metadata,
//! so a sync is a scan, an upsert per asset and a sweep of vanished assets.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::AppState;
use crate::db::DbPool;
use crate::immich::{ImmichApi, ImmichAsset, ImmichClient, ImmichError};
use crate::models::{PlateSolvingJob, Settings};
use crate::repo::{self, UpsertOutcome};
use crate::services::events::{EventBus, SkyEvent};

/// Assets requested per metadata-search page
pub const PAGE_SIZE: u32 = 250;

/// Outcome of one sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Image assets seen in Immich
    pub scanned: usize,
    pub created: usize,
    pub updated: usize,
    /// Local images whose asset no longer exists in Immich
    pub removed: usize,
    /// Plate-solve jobs queued for new images
    pub enqueued: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("A sync is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Immich(#[from] ImmichError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Lists every image asset to mirror, each asset once
///
/// With album ids configured only those albums are read; otherwise the
/// metadata search is paged until Immich reports no next page.
pub async fn collect_assets(api: &impl ImmichApi, album_ids: &[String]) -> Result<Vec<ImmichAsset>, ImmichError> {
    let mut assets = Vec::new();

    if album_ids.is_empty() {
        let mut page = 1;
        loop {
            let batch = api.search_assets(page, PAGE_SIZE).await?;
            debug!(page, count = batch.items.len(), "Fetched asset page");
            assets.extend(batch.items);
            match batch.next_page {
                Some(next) if next > page => page = next,
                Some(next) => {
                    warn!(page, next, "Immich returned a non-advancing page, stopping");
                    break;
                }
                None => break,
            }
        }
    } else {
        for album_id in album_ids {
            let album = api.album_assets(album_id).await?;
            debug!(album_id, count = album.len(), "Fetched album");
            assets.extend(album);
        }
    }

    let mut seen = HashSet::new();
    assets.retain(|asset| asset.is_image() && seen.insert(asset.id.clone()));
    Ok(assets)
}

/// Mirrors Immich into the gallery
///
/// Publishes `sync_started` before scanning and `sync_completed` or
/// `sync_failed` at the end. Vanished images are only removed after the scan
/// has completed, so a failed scan never deletes anything.
///
/// ### Arguments
///
/// * `pool` - Database connection pool
/// * `api` - Immich client
/// * `settings` - Effective settings; decide the albums and auto plate solving
/// * `events` - Bus for progress events
#[instrument(skip_all, fields(albums = settings.immich_album_ids.len()))]
pub async fn sync_library(
    pool: &DbPool,
    api: &impl ImmichApi,
    settings: &Settings,
    events: &EventBus,
) -> Result<SyncReport, SyncError> {
    events.publish(SkyEvent::SyncStarted);

    match run_scan(pool, api, settings, events).await {
        Ok(report) => {
            info!(
                scanned = report.scanned,
                created = report.created,
                updated = report.updated,
                removed = report.removed,
                enqueued = report.enqueued,
                "Sync completed"
            );
            events.publish(SkyEvent::SyncCompleted { report: report.clone() });
            Ok(report)
        }
        Err(e) => {
            error!("Sync failed: {}", e);
            events.publish(SkyEvent::SyncFailed { error: e.to_string() });
            Err(e)
        }
    }
}

async fn run_scan(
    pool: &DbPool,
    api: &impl ImmichApi,
    settings: &Settings,
    events: &EventBus,
) -> Result<SyncReport, SyncError> {
    let started_at = Utc::now();
    let assets = collect_assets(api, &settings.immich_album_ids).await?;
    let auto_solve = settings.auto_plate_solve && settings.astrometry_key().is_some();

    let scanned = assets.len();
    // Database writes may back off on lock contention; keep them off the runtime threads
    let pool = pool.clone();
    let merged = tokio::task::spawn_blocking(move || merge_assets(&pool, &assets, auto_solve))
        .await
        .map_err(anyhow::Error::from)??;

    for job in merged.enqueued.iter().cloned() {
        events.publish(SkyEvent::JobUpdated { job });
    }

    Ok(SyncReport {
        scanned,
        created: merged.created,
        updated: merged.updated,
        removed: merged.removed,
        enqueued: merged.enqueued.len(),
        started_at,
        finished_at: Utc::now(),
    })
}

/// Database side of a scan
struct MergeOutcome {
    created: usize,
    updated: usize,
    removed: usize,
    enqueued: Vec<PlateSolvingJob>,
}

/// Upserts every scanned asset, queues jobs for new images when asked to and
/// then sweeps images whose asset was not seen
fn merge_assets(pool: &DbPool, assets: &[ImmichAsset], auto_solve: bool) -> anyhow::Result<MergeOutcome> {
    let mut outcome = MergeOutcome {
        created: 0,
        updated: 0,
        removed: 0,
        enqueued: Vec::new(),
    };

    let mut seen = HashSet::with_capacity(assets.len());
    for asset in assets {
        seen.insert(asset.id.clone());
        match repo::upsert_from_immich(pool, asset)? {
            UpsertOutcome::Created(image) => {
                outcome.created += 1;
                if auto_solve {
                    if let Some(job) = repo::create_job_if_idle(pool, &image.id)? {
                        outcome.enqueued.push(job);
                    }
                }
            }
            UpsertOutcome::Updated(_) => outcome.updated += 1,
        }
    }

    outcome.removed = repo::remove_images_not_in(pool, &seen)?;
    Ok(outcome)
}

/// Runs a sync with the current settings unless one is already running
///
/// Used by `POST /sync` and the periodic timer in the server.
pub async fn run_sync(state: &AppState) -> Result<SyncReport, SyncError> {
    let Ok(_guard) = state.sync_lock.try_lock() else {
        return Err(SyncError::AlreadyRunning);
    };

    let settings = repo::load_settings(&state.pool, &state.config)?;
    let client = ImmichClient::from_settings(state.http.clone(), &settings)?;
    sync_library(&state.pool, &client, &settings, &state.events).await
}
