use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use diesel::deserialize::{FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::{Sqlite, SqliteValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::JsonValue;

/// Lifecycle state of a plate-solving job
///
/// ```text
/// pending ──submit──▶ processing ──solved──▶ success
///    ▲  │                 │
///    │  └──attempts───────┴──failure/timeout──▶ failed
///    └──────────────retry──────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be uploaded to Astrometry.net
    Pending,
    /// Uploaded; waiting for Astrometry.net to finish solving
    Processing,
    Success,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Success,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether the job still needs work from the solver
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    /// Whether moving from this state to `next` is a legal transition
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Success)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown job status: {}", s))
    }
}

impl FromSql<Text, Sqlite> for JobStatus {
    fn from_sql(value: SqliteValue<'_, '_, '_>) -> diesel::deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(value)?;
        Ok(text.parse()?)
    }
}

impl ToSql<Text, Sqlite> for JobStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

/// A request to plate-solve one image through Astrometry.net
#[derive(Queryable, Selectable, Insertable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::plate_solving_jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PlateSolvingJob {
    pub id: String,
    pub image_id: String,
    pub status: JobStatus,
    /// Astrometry.net submission id, set once the upload succeeds
    pub submission_id: Option<i64>,
    /// Astrometry.net job id, assigned by the service after the upload
    pub remote_job_id: Option<i64>,
    /// Failed attempts so far
    pub attempts: i32,
    pub error_message: Option<String>,
    /// Raw calibration, annotations and machine tags of a successful solve
    pub result: Option<JsonValue>,
    /// Earliest time the worker should pick the job up again
    pub next_attempt_at: Option<NaiveDateTime>,
    pub submitted_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl PlateSolvingJob {
    /// Creates a pending job for the given image, due immediately
    pub fn new(image_id: String) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            image_id,
            status: JobStatus::Pending,
            submission_id: None,
            remote_job_id: None,
            attempts: 0,
            error_message: None,
            result: None,
            next_attempt_at: None,
            submitted_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the worker should look at an active job at `now`
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.status.is_active() && self.next_attempt_at.is_none_or(|at| at <= now)
    }
}
