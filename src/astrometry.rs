//! Astrometry.net REST client
//!
//! The API is a session-based JSON-over-form protocol: every request body is
//! a form field named `request-json`, and every response carries a `status`
//! of `"success"` or `"error"`. The session obtained at login is cached and
//! transparently renewed once if the service reports it as invalid.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Astrometry.net client errors
#[derive(Debug, Error)]
pub enum AstrometryError {
    #[error("Plate solving is not configured")]
    NotConfigured,

    #[error("{0}")]
    Api(String),

    #[error("HTTP {0}: {1}")]
    Http(u16, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// State of a submission: the job ids Astrometry.net created for it
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubmissionStatus {
    /// Job ids; entries stay null until a job is assigned
    #[serde(default)]
    pub jobs: Vec<Option<i64>>,
    #[serde(default)]
    pub processing_finished: Option<String>,
}

impl SubmissionStatus {
    /// The first assigned job id, if any
    pub fn job_id(&self) -> Option<i64> {
        self.jobs.iter().flatten().copied().next()
    }
}

/// Status of a solving job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteJobStatus {
    Solving,
    Success,
    Failure,
}

/// Astrometric calibration of a solved field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Right ascension of the field centre, degrees
    pub ra: f64,
    /// Declination of the field centre, degrees
    pub dec: f64,
    /// Field radius, degrees
    pub radius: f64,
    /// Arcseconds per pixel
    pub pixscale: f64,
    /// Degrees east of north
    pub orientation: f64,
    #[serde(default)]
    pub parity: f64,
}

/// An object Astrometry.net found in the field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub names: Vec<String>,
    /// Catalog the object comes from, e.g. `ngc`, `ic`, `bright`, `hd`
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub pixelx: f64,
    #[serde(default)]
    pub pixely: f64,
    #[serde(default)]
    pub radius: f64,
}

/// Everything fetched for a successful job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    pub job_id: i64,
    pub calibration: Calibration,
    pub annotations: Vec<Annotation>,
    pub machine_tags: Vec<String>,
}

impl SolveResult {
    /// Names of notable objects in the field, deduplicated, in annotation order
    ///
    /// Henry Draper catalog stars are skipped; a typical field has hundreds.
    pub fn object_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for annotation in self.annotations.iter().filter(|a| a.kind != "hd") {
            for name in &annotation.names {
                let name = name.trim();
                if !name.is_empty() && !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// The most prominent deep-sky object: the largest NGC/IC/Messier annotation
    pub fn primary_object(&self) -> Option<String> {
        self.annotations
            .iter()
            .filter(|a| matches!(a.kind.as_str(), "ngc" | "ic" | "messier") && !a.names.is_empty())
            .max_by(|a, b| a.radius.total_cmp(&b.radius))
            .and_then(|a| a.names.first().cloned())
    }
}

/// The operations the plate-solve worker needs from Astrometry.net
pub trait AstrometryApi: Send + Sync {
    /// Uploads an image and returns the submission id
    fn upload(&self, file_name: &str, bytes: Vec<u8>) -> impl Future<Output = Result<i64, AstrometryError>> + Send;

    fn submission_status(&self, submission_id: i64) -> impl Future<Output = Result<SubmissionStatus, AstrometryError>> + Send;

    fn job_status(&self, job_id: i64) -> impl Future<Output = Result<RemoteJobStatus, AstrometryError>> + Send;

    /// Fetches calibration, annotations and machine tags of a solved job
    fn job_results(&self, job_id: i64) -> impl Future<Output = Result<SolveResult, AstrometryError>> + Send;
}

/// Astrometry.net API client
#[derive(Debug)]
pub struct AstrometryClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    session: Mutex<Option<String>>,
}

/// Pulls the error message out of an `"status": "error"` response
fn api_error(body: &Value) -> Option<String> {
    if body.get("status").and_then(Value::as_str) == Some("error") {
        Some(
            body.get("errormessage")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        )
    } else {
        None
    }
}

fn is_session_error(message: &str) -> bool {
    message.contains("session")
}

impl AstrometryClient {
    /// Creates a client for the API at `base_url` (e.g. `https://nova.astrometry.net/api`)
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            session: Mutex::new(None),
        }
    }

    /// Whether the client was built for these credentials
    pub fn matches(&self, base_url: &str, api_key: &str) -> bool {
        self.base_url == base_url.trim_end_matches('/') && self.api_key == api_key
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, AstrometryError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AstrometryError::Http(status.as_u16(), body));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| AstrometryError::Parse(e.to_string()))?;
        match api_error(&body) {
            Some(message) => Err(AstrometryError::Api(message)),
            None => Ok(body),
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value, AstrometryError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| AstrometryError::Network(e.to_string()))?;
        Self::read_json(response).await
    }

    /// Logs in with the API key and returns a fresh session key
    #[instrument(skip(self))]
    pub async fn login(&self) -> Result<String, AstrometryError> {
        let request = json!({ "apikey": self.api_key }).to_string();
        let response = self
            .http
            .post(format!("{}/login", self.base_url))
            .form(&[("request-json", request)])
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| AstrometryError::Network(e.to_string()))?;
        let body = Self::read_json(response).await?;
        let session = body
            .get("session")
            .and_then(Value::as_str)
            .ok_or_else(|| AstrometryError::Parse("login response has no session".to_string()))?
            .to_string();
        info!("Logged in to Astrometry.net");
        Ok(session)
    }

    async fn session(&self) -> Result<String, AstrometryError> {
        let mut cached = self.session.lock().await;
        if let Some(session) = cached.as_ref() {
            return Ok(session.clone());
        }
        let session = self.login().await?;
        *cached = Some(session.clone());
        Ok(session)
    }

    async fn upload_with_session(&self, session: &str, file_name: &str, bytes: Vec<u8>) -> Result<i64, AstrometryError> {
        let request = json!({
            "session": session,
            "publicly_visible": "n",
            "allow_modifications": "n",
            "allow_commercial_use": "n",
        })
        .to_string();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| AstrometryError::Parse(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("request-json", request)
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .map_err(|e| AstrometryError::Network(e.to_string()))?;
        let body = Self::read_json(response).await?;
        body.get("subid")
            .and_then(Value::as_i64)
            .ok_or_else(|| AstrometryError::Parse("upload response has no subid".to_string()))
    }
}

impl AstrometryApi for AstrometryClient {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<i64, AstrometryError> {
        let session = self.session().await?;
        match self.upload_with_session(&session, file_name, bytes.clone()).await {
            Err(AstrometryError::Api(message)) if is_session_error(&message) => {
                warn!("Astrometry.net session expired, logging in again");
                *self.session.lock().await = None;
                let session = self.session().await?;
                self.upload_with_session(&session, file_name, bytes).await
            }
            other => other,
        }
    }

    #[instrument(skip(self))]
    async fn submission_status(&self, submission_id: i64) -> Result<SubmissionStatus, AstrometryError> {
        let body = self.get_json(&format!("/submissions/{}", submission_id)).await?;
        serde_json::from_value(body).map_err(|e| AstrometryError::Parse(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn job_status(&self, job_id: i64) -> Result<RemoteJobStatus, AstrometryError> {
        let body = self.get_json(&format!("/jobs/{}", job_id)).await?;
        let status = body.get("status").and_then(Value::as_str).unwrap_or("solving");
        debug!(status, "Job status");
        Ok(match status {
            "success" => RemoteJobStatus::Success,
            "failure" => RemoteJobStatus::Failure,
            _ => RemoteJobStatus::Solving,
        })
    }

    #[instrument(skip(self))]
    async fn job_results(&self, job_id: i64) -> Result<SolveResult, AstrometryError> {
        let calibration: Calibration = serde_json::from_value(
            self.get_json(&format!("/jobs/{}/calibration", job_id)).await?,
        )
        .map_err(|e| AstrometryError::Parse(e.to_string()))?;

        #[derive(Deserialize)]
        struct Annotations {
            #[serde(default)]
            annotations: Vec<Annotation>,
        }
        let annotations: Annotations = serde_json::from_value(
            self.get_json(&format!("/jobs/{}/annotations", job_id)).await?,
        )
        .map_err(|e| AstrometryError::Parse(e.to_string()))?;

        #[derive(Deserialize)]
        struct MachineTags {
            #[serde(default)]
            tags: Vec<String>,
        }
        let tags: MachineTags = serde_json::from_value(
            self.get_json(&format!("/jobs/{}/machine_tags", job_id)).await?,
        )
        .map_err(|e| AstrometryError::Parse(e.to_string()))?;

        Ok(SolveResult {
            job_id,
            calibration,
            annotations: annotations.annotations,
            machine_tags: tags.tags,
        })
    }
}
