use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use skymmich::dto::{
    AttachEquipmentDto, BulkPlateSolveDto, BulkPlateSolveResult, CreateEquipmentDto, CreateTagDto, ImageDetail,
    ImageQueryDto, ImageSort, PagedImages, SkyMapPoint, StatsDto, UpdateImageDto,
};
use skymmich::models::{Equipment, Image, PlateSolvingJob, Settings, SettingsUpdate, Tag};
use skymmich::services::sync::SyncReport;
use thiserror::Error;

/// Error type for CLI client operations
#[derive(Debug, Error)]
pub enum ClientError {
    /// Server returned an error status with a message body
    #[error("Server error ({}): {message}", status.as_u16())]
    Server { status: reqwest::StatusCode, message: String },
    /// Network/connection/request error
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

/// Extension trait for checking HTTP responses and extracting server error messages
trait ResponseExt {
    /// Checks for error status and extracts the server's error message body
    async fn check(self) -> Result<reqwest::Response, ClientError>;
}

impl ResponseExt for reqwest::Response {
    async fn check(self) -> Result<reqwest::Response, ClientError> {
        if self.status().is_success() {
            return Ok(self);
        }
        let status = self.status();
        let message = match self.json::<serde_json::Value>().await {
            Ok(body) => body
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("Unknown error")
                .to_string(),
            Err(_) => format!("HTTP {}", status),
        };
        Err(ClientError::Server { status, message })
    }
}

/// Builds query parameters from an ImageQueryDto
fn build_image_params(query: &ImageQueryDto) -> Vec<(&'static str, String)> {
    let mut params: Vec<(&'static str, String)> = Vec::new();

    if let Some(ref search) = query.search {
        params.push(("search", search.clone()));
    }
    for tag_id in &query.tag_ids {
        params.push(("tag_ids", tag_id.clone()));
    }
    if let Some(ref id) = query.equipment_id {
        params.push(("equipment_id", id.clone()));
    }
    if let Some(solved) = query.plate_solved {
        params.push(("plate_solved", solved.to_string()));
    }
    if let Some(favorite) = query.favorite {
        params.push(("favorite", favorite.to_string()));
    }
    if let Some(ref dt) = query.captured_after {
        params.push(("captured_after", dt.to_rfc3339()));
    }
    if let Some(ref dt) = query.captured_before {
        params.push(("captured_before", dt.to_rfc3339()));
    }
    let sort = match query.sort {
        ImageSort::CaptureDate => "capture_date",
        ImageSort::Title => "title",
        ImageSort::CreatedAt => "created_at",
    };
    params.push(("sort", sort.to_string()));
    if let Some(page) = query.page {
        params.push(("page", page.to_string()));
    }
    if let Some(page_size) = query.page_size {
        params.push(("page_size", page_size.to_string()));
    }

    params
}

/// HTTP client wrapper for communicating with the Skymmich server
pub struct SkymmichClient {
    /// The base URL of the server (e.g. "http://localhost:3000")
    base_url: String,
    /// The underlying HTTP client
    client: Client,
}

impl SkymmichClient {
    /// Creates a new SkymmichClient
    ///
    /// ### Arguments
    ///
    /// * `base_url` - The base URL of the Skymmich server
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.client.get(self.url(path)).send().await?.check().await?;
        Ok(response.json().await?)
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self
            .client
            .request(method, self.url(path))
            .json(body)
            .send()
            .await?
            .check()
            .await?;
        Ok(response.json().await?)
    }

    async fn send_empty(&self, method: reqwest::Method, path: &str) -> Result<reqwest::Response, ClientError> {
        self.client.request(method, self.url(path)).send().await?.check().await
    }

    // ── Images ───────────────────────────────────────────────────────

    /// Lists one page of images matching the filters
    pub async fn list_images(&self, query: &ImageQueryDto) -> Result<PagedImages, ClientError> {
        let response = self
            .client
            .get(self.url("/images"))
            .query(&build_image_params(query))
            .send()
            .await?
            .check()
            .await?;
        Ok(response.json().await?)
    }

    /// Gets an image with its tags, equipment and latest job
    pub async fn get_image(&self, id: &str) -> Result<ImageDetail, ClientError> {
        self.get(&format!("/images/{}", id)).await
    }

    /// Edits the user-curated fields of an image
    pub async fn update_image(&self, id: &str, edit: &UpdateImageDto) -> Result<Image, ClientError> {
        self.send_json(reqwest::Method::PATCH, &format!("/images/{}", id), edit)
            .await
    }

    /// Deletes the local record of an image
    pub async fn delete_image(&self, id: &str) -> Result<(), ClientError> {
        self.send_empty(reqwest::Method::DELETE, &format!("/images/{}", id))
            .await?;
        Ok(())
    }

    /// Queues one image for plate solving
    pub async fn solve_image(&self, id: &str) -> Result<PlateSolvingJob, ClientError> {
        let response = self
            .send_empty(reqwest::Method::POST, &format!("/images/{}/plate-solve", id))
            .await?;
        Ok(response.json().await?)
    }

    /// Queues several images, or every unsolved one
    pub async fn solve_bulk(&self, image_ids: Vec<String>, all_unsolved: bool) -> Result<BulkPlateSolveResult, ClientError> {
        let dto = BulkPlateSolveDto { image_ids, all_unsolved };
        self.send_json(reqwest::Method::POST, "/plate-solve/bulk", &dto).await
    }

    // ── Tags ─────────────────────────────────────────────────────────

    pub async fn list_tags(&self) -> Result<Vec<Tag>, ClientError> {
        self.get("/tags").await
    }

    pub async fn list_image_tags(&self, image_id: &str) -> Result<Vec<Tag>, ClientError> {
        self.get(&format!("/images/{}/tags", image_id)).await
    }

    pub async fn create_tag(&self, name: String) -> Result<Tag, ClientError> {
        self.send_json(reqwest::Method::POST, "/tags", &CreateTagDto { name })
            .await
    }

    pub async fn add_tag_to_image(&self, image_id: &str, tag_id: &str) -> Result<(), ClientError> {
        self.send_empty(reqwest::Method::PUT, &format!("/images/{}/tags/{}", image_id, tag_id))
            .await?;
        Ok(())
    }

    pub async fn remove_tag_from_image(&self, image_id: &str, tag_id: &str) -> Result<(), ClientError> {
        self.send_empty(reqwest::Method::DELETE, &format!("/images/{}/tags/{}", image_id, tag_id))
            .await?;
        Ok(())
    }

    // ── Equipment ────────────────────────────────────────────────────

    /// Lists catalog entries, optionally of one kind
    pub async fn list_equipment(&self, kind: Option<&str>) -> Result<Vec<Equipment>, ClientError> {
        let mut request = self.client.get(self.url("/equipment"));
        if let Some(kind) = kind {
            request = request.query(&[("kind", kind)]);
        }
        let response = request.send().await?.check().await?;
        Ok(response.json().await?)
    }

    pub async fn create_equipment(&self, dto: &CreateEquipmentDto) -> Result<Equipment, ClientError> {
        self.send_json(reqwest::Method::POST, "/equipment", dto).await
    }

    pub async fn get_equipment(&self, id: &str) -> Result<Equipment, ClientError> {
        self.get(&format!("/equipment/{}", id)).await
    }

    pub async fn delete_equipment(&self, id: &str) -> Result<(), ClientError> {
        self.send_empty(reqwest::Method::DELETE, &format!("/equipment/{}", id))
            .await?;
        Ok(())
    }

    /// Records that an image was taken with a piece of equipment
    pub async fn attach_equipment(&self, image_id: &str, equipment_id: &str, notes: Option<String>) -> Result<(), ClientError> {
        self.client
            .put(self.url(&format!("/images/{}/equipment/{}", image_id, equipment_id)))
            .json(&AttachEquipmentDto { notes })
            .send()
            .await?
            .check()
            .await?;
        Ok(())
    }

    pub async fn detach_equipment(&self, image_id: &str, equipment_id: &str) -> Result<(), ClientError> {
        self.send_empty(
            reqwest::Method::DELETE,
            &format!("/images/{}/equipment/{}", image_id, equipment_id),
        )
        .await?;
        Ok(())
    }

    // ── Plate-solving jobs ───────────────────────────────────────────

    pub async fn list_jobs(&self, status: Option<&str>) -> Result<Vec<PlateSolvingJob>, ClientError> {
        let mut request = self.client.get(self.url("/plate-solve/jobs"));
        if let Some(status) = status {
            request = request.query(&[("status", status)]);
        }
        let response = request.send().await?.check().await?;
        Ok(response.json().await?)
    }

    pub async fn get_job(&self, id: &str) -> Result<PlateSolvingJob, ClientError> {
        self.get(&format!("/plate-solve/jobs/{}", id)).await
    }

    pub async fn retry_job(&self, id: &str) -> Result<PlateSolvingJob, ClientError> {
        let response = self
            .send_empty(reqwest::Method::POST, &format!("/plate-solve/jobs/{}/retry", id))
            .await?;
        Ok(response.json().await?)
    }

    // ── Overview and admin ───────────────────────────────────────────

    /// Runs a library sync and waits for its report
    pub async fn sync(&self) -> Result<SyncReport, ClientError> {
        let response = self.send_empty(reqwest::Method::POST, "/sync").await?;
        Ok(response.json().await?)
    }

    pub async fn stats(&self) -> Result<StatsDto, ClientError> {
        self.get("/stats").await
    }

    pub async fn sky_map(&self) -> Result<Vec<SkyMapPoint>, ClientError> {
        self.get("/sky-map").await
    }

    pub async fn get_settings(&self) -> Result<Settings, ClientError> {
        self.get("/admin/settings").await
    }

    pub async fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings, ClientError> {
        self.send_json(reqwest::Method::PUT, "/admin/settings", update)
            .await
    }
}
