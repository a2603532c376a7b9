//! Immich REST client
//!
//! Talks to the subset of the Immich API the gallery needs: listing image
//! assets with their EXIF data, fetching originals for plate solving and
//! proxying thumbnails. All requests carry the `x-api-key` header.

use std::future::Future;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::models::{ImmichMetadata, Settings};

/// Immich client errors
#[derive(Debug, Error)]
pub enum ImmichError {
    #[error("Immich is not configured")]
    NotConfigured,

    #[error("Invalid Immich API key")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// EXIF block of an Immich asset
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExifInfo {
    pub make: Option<String>,
    pub model: Option<String>,
    pub lens_model: Option<String>,
    pub f_number: Option<f64>,
    pub focal_length: Option<f64>,
    pub iso: Option<i32>,
    pub exposure_time: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub exif_image_width: Option<i32>,
    pub exif_image_height: Option<i32>,
    pub description: Option<String>,
    pub date_time_original: Option<DateTime<Utc>>,
}

/// An asset as returned by the Immich API
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImmichAsset {
    pub id: String,
    pub original_file_name: String,
    #[serde(rename = "type", default)]
    pub asset_type: String,
    #[serde(default)]
    pub file_created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub exif_info: Option<ExifInfo>,
}

impl ImmichAsset {
    pub fn is_image(&self) -> bool {
        self.asset_type.eq_ignore_ascii_case("IMAGE")
    }

    /// Converts the asset into the metadata the gallery stores
    ///
    /// The EXIF capture time wins over the file creation time.
    pub fn to_metadata(&self) -> ImmichMetadata {
        let exif = self.exif_info.clone().unwrap_or_default();
        ImmichMetadata {
            filename: self.original_file_name.clone(),
            capture_date: exif
                .date_time_original
                .or(self.file_created_at)
                .map(|dt| dt.naive_utc()),
            width: exif.exif_image_width,
            height: exif.exif_image_height,
            camera_make: exif.make,
            camera_model: exif.model,
            lens_model: exif.lens_model,
            focal_length: exif.focal_length,
            aperture: exif.f_number,
            exposure_time: exif.exposure_time,
            iso: exif.iso,
            latitude: exif.latitude,
            longitude: exif.longitude,
        }
    }

    /// Description from the EXIF block, if it is not blank
    pub fn description(&self) -> Option<String> {
        self.exif_info
            .as_ref()
            .and_then(|exif| exif.description.clone())
            .filter(|d| !d.trim().is_empty())
    }
}

/// One page of a metadata search
#[derive(Debug, Clone, Default)]
pub struct AssetPage {
    pub items: Vec<ImmichAsset>,
    pub next_page: Option<u32>,
}

#[derive(Deserialize)]
struct SearchResponse {
    assets: SearchAssets,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchAssets {
    items: Vec<ImmichAsset>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Deserialize)]
struct AlbumResponse {
    #[serde(default)]
    assets: Vec<ImmichAsset>,
}

/// The operations sync and the plate-solve worker need from Immich
pub trait ImmichApi: Send + Sync {
    /// Fetches one page of image assets, `page` starting at 1
    fn search_assets(&self, page: u32, size: u32) -> impl Future<Output = Result<AssetPage, ImmichError>> + Send;

    /// Fetches every asset of an album
    fn album_assets(&self, album_id: &str) -> impl Future<Output = Result<Vec<ImmichAsset>, ImmichError>> + Send;

    /// Downloads the original file of an asset
    fn download_original(&self, asset_id: &str) -> impl Future<Output = Result<Vec<u8>, ImmichError>> + Send;
}

/// Immich API client
#[derive(Debug, Clone)]
pub struct ImmichClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ImmichClient {
    /// Creates a client for the Immich server at `base_url`
    ///
    /// `base_url` is the server root (e.g. `http://immich:2283`); the `/api`
    /// prefix is added per request.
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Builds a client from the runtime settings, if Immich is configured
    pub fn from_settings(http: reqwest::Client, settings: &Settings) -> Result<Self, ImmichError> {
        let (url, key) = settings.immich_credentials().ok_or(ImmichError::NotConfigured)?;
        Ok(Self::new(http, url, key))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response, ImmichError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ImmichError::Unauthorized),
            StatusCode::NOT_FOUND => Err(ImmichError::NotFound(what.to_string())),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(ImmichError::Api(status.as_u16(), body))
            }
        }
    }

    /// Checks that the server is reachable and the API key is accepted
    #[instrument(skip(self))]
    pub async fn ping(&self) -> Result<(), ImmichError> {
        // /server/ping is public, so also touch an authenticated endpoint
        let response = self
            .http
            .get(self.url("/server/ping"))
            .send()
            .await
            .map_err(|e| ImmichError::Network(e.to_string()))?;
        Self::check(response, "server ping").await?;

        let response = self
            .http
            .get(self.url("/users/me"))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ImmichError::Network(e.to_string()))?;
        Self::check(response, "current user").await?;
        Ok(())
    }

    /// Fetches a thumbnail, returning its content type and bytes
    ///
    /// `size` is `thumbnail` or `preview`.
    #[instrument(skip(self))]
    pub async fn thumbnail(&self, asset_id: &str, size: &str) -> Result<(String, Vec<u8>), ImmichError> {
        let response = self
            .http
            .get(self.url(&format!("/assets/{}/thumbnail", asset_id)))
            .query(&[("size", size)])
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ImmichError::Network(e.to_string()))?;
        let response = Self::check(response, asset_id).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImmichError::Network(e.to_string()))?;
        Ok((content_type, bytes.to_vec()))
    }
}

impl ImmichApi for ImmichClient {
    #[instrument(skip(self))]
    async fn search_assets(&self, page: u32, size: u32) -> Result<AssetPage, ImmichError> {
        debug!("Searching Immich assets");
        let response = self
            .http
            .post(self.url("/search/metadata"))
            .header("x-api-key", &self.api_key)
            .json(&json!({
                "page": page,
                "size": size,
                "type": "IMAGE",
                "withExif": true,
            }))
            .send()
            .await
            .map_err(|e| ImmichError::Network(e.to_string()))?;
        let response = Self::check(response, "search").await?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ImmichError::Parse(e.to_string()))?;

        let next_page = match body.assets.next_page {
            Some(page) => Some(
                page.parse::<u32>()
                    .map_err(|_| ImmichError::Parse(format!("Invalid nextPage: {}", page)))?,
            ),
            None => None,
        };

        Ok(AssetPage {
            items: body.assets.items,
            next_page,
        })
    }

    #[instrument(skip(self))]
    async fn album_assets(&self, album_id: &str) -> Result<Vec<ImmichAsset>, ImmichError> {
        debug!("Fetching Immich album");
        let response = self
            .http
            .get(self.url(&format!("/albums/{}", album_id)))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ImmichError::Network(e.to_string()))?;
        let response = Self::check(response, album_id).await?;
        let album: AlbumResponse = response
            .json()
            .await
            .map_err(|e| ImmichError::Parse(e.to_string()))?;
        Ok(album.assets)
    }

    #[instrument(skip(self))]
    async fn download_original(&self, asset_id: &str) -> Result<Vec<u8>, ImmichError> {
        let response = self
            .http
            .get(self.url(&format!("/assets/{}/original", asset_id)))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ImmichError::Network(e.to_string()))?;
        let response = Self::check(response, asset_id).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImmichError::Network(e.to_string()))?;
        debug!(size = bytes.len(), "Downloaded original");
        Ok(bytes.to_vec())
    }
}
