use axum::{Json, extract::State};
use tracing::{info, instrument, warn};

use crate::AppState;
use crate::astrometry::AstrometryClient;
use crate::dto::ConnectionTestDto;
use crate::errors::ApiError;
use crate::immich::ImmichClient;
use crate::models::{Settings, SettingsUpdate, mask_secret};
use crate::repo;

/// Drops API keys that are just the masked form of the stored key
///
/// The admin panel shows masked keys; a form sent back unchanged must not
/// overwrite the real key with asterisks.
fn strip_masked_keys(current: &Settings, mut update: SettingsUpdate) -> SettingsUpdate {
    fn is_masked(current: Option<&str>, sent: Option<&str>) -> bool {
        matches!((current, sent), (Some(current), Some(sent)) if mask_secret(current) == sent)
    }
    if is_masked(current.immich_api_key.as_deref(), update.immich_api_key.as_deref()) {
        update.immich_api_key = None;
    }
    if is_masked(current.astrometry_api_key.as_deref(), update.astrometry_api_key.as_deref()) {
        update.astrometry_api_key = None;
    }
    update
}

/// Handler for reading the admin settings
///
/// This function handles GET requests to `/admin/settings`. API keys are
/// masked to their last four characters.
#[instrument(skip(state))]
pub async fn get_settings_handler(State(state): State<AppState>) -> Result<Json<Settings>, ApiError> {
    Ok(Json(state.settings()?.masked()))
}

/// Handler for updating the admin settings
///
/// This function handles PUT requests to `/admin/settings`. Only fields
/// present in the body change; an empty string clears a credential.
///
/// ### Returns
///
/// The new effective settings, masked, or 400 if a value is invalid
#[instrument(skip(state, payload))]
pub async fn update_settings_handler(
    State(state): State<AppState>,
    Json(payload): Json<SettingsUpdate>,
) -> Result<Json<Settings>, ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;

    let current = state.settings()?;
    let update = strip_masked_keys(&current, payload);
    repo::save_settings(&state.pool, &update)?;
    info!("Admin settings updated");

    Ok(Json(state.settings()?.masked()))
}

/// Settings to probe with: stored settings overlaid with unsaved form values
fn settings_for_probe(state: &AppState, payload: Option<Json<SettingsUpdate>>) -> Result<Settings, ApiError> {
    let current = state.settings()?;
    match payload {
        Some(Json(update)) => {
            update.validate().map_err(ApiError::BadRequest)?;
            let update = strip_masked_keys(&current, update);
            Ok(current.apply_update(update))
        }
        None => Ok(current),
    }
}

/// Handler checking that Immich is reachable with the configured key
///
/// This function handles POST requests to `/admin/settings/test-immich`.
/// The body may carry unsaved settings to try instead of the stored ones.
#[instrument(skip(state, payload))]
pub async fn test_immich_handler(
    State(state): State<AppState>,
    payload: Option<Json<SettingsUpdate>>,
) -> Result<Json<ConnectionTestDto>, ApiError> {
    let settings = settings_for_probe(&state, payload)?;
    let Ok(client) = ImmichClient::from_settings(state.http.clone(), &settings) else {
        return Ok(Json(ConnectionTestDto {
            ok: false,
            message: "Immich URL and API key are required".to_string(),
        }));
    };

    let result = match client.ping().await {
        Ok(()) => ConnectionTestDto {
            ok: true,
            message: "Connected to Immich".to_string(),
        },
        Err(e) => {
            warn!("Immich connection test failed: {}", e);
            ConnectionTestDto {
                ok: false,
                message: e.to_string(),
            }
        }
    };
    Ok(Json(result))
}

/// Handler checking that the Astrometry.net key can log in
///
/// This function handles POST requests to `/admin/settings/test-astrometry`.
#[instrument(skip(state, payload))]
pub async fn test_astrometry_handler(
    State(state): State<AppState>,
    payload: Option<Json<SettingsUpdate>>,
) -> Result<Json<ConnectionTestDto>, ApiError> {
    let settings = settings_for_probe(&state, payload)?;
    let Some(key) = settings.astrometry_api_key.as_deref() else {
        return Ok(Json(ConnectionTestDto {
            ok: false,
            message: "Astrometry.net API key is required".to_string(),
        }));
    };

    let client = AstrometryClient::new(state.http.clone(), &settings.astrometry_url, key);
    let result = match client.login().await {
        Ok(_) => ConnectionTestDto {
            ok: true,
            message: "Logged in to Astrometry.net".to_string(),
        },
        Err(e) => {
            warn!("Astrometry.net connection test failed: {}", e);
            ConnectionTestDto {
                ok: false,
                message: e.to_string(),
            }
        }
    };
    Ok(Json(result))
}
