//! Job submission and polling: the interface clients use to request a
//! program and observe its outcome.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regimen_db::models::{GenerateRequest, GenerationJob, JobStatus, ProgramTemplate};
use regimen_db::store::JobStore;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub const MAX_DURATION_WEEKS: i32 = 52;
pub const MAX_WORKOUT_DAYS: usize = 7;

/// A request rejected at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("program name must not be blank")]
    BlankName,

    #[error("duration must be between 1 and 52 weeks, got {0}")]
    DurationOutOfRange(i32),

    #[error("between 1 and 7 workout days are required, got {0}")]
    WorkoutDayCount(usize),

    #[error("workout day {0} has a blank name")]
    BlankWorkoutDay(usize),
}

/// Check the bounds a request must satisfy before it is queued.
pub fn validate_request(request: &GenerateRequest) -> Result<(), RequestError> {
    if request.program_name.trim().is_empty() {
        return Err(RequestError::BlankName);
    }
    if !(1..=MAX_DURATION_WEEKS).contains(&request.duration_weeks) {
        return Err(RequestError::DurationOutOfRange(request.duration_weeks));
    }
    let days = request.workout_days.len();
    if !(1..=MAX_WORKOUT_DAYS).contains(&days) {
        return Err(RequestError::WorkoutDayCount(days));
    }
    if let Some(index) = request.workout_days.iter().position(|d| d.trim().is_empty()) {
        return Err(RequestError::BlankWorkoutDay(index + 1));
    }
    Ok(())
}

/// Validate and queue a request. Returns the new job id without waiting
/// for generation.
pub async fn submit(store: &dyn JobStore, request: &GenerateRequest) -> Result<Uuid> {
    validate_request(request)?;
    let job = store
        .insert_job(request)
        .await
        .context("failed to queue generation job")?;
    tracing::info!(job_id = %job.id, program = %request.program_name, "generation job queued");
    Ok(job.id)
}

/// Client-facing view of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when completed.
    pub template_id: Option<Uuid>,
    /// Set when completed.
    pub template: Option<ProgramTemplate>,
    /// Set when failed.
    pub error: Option<String>,
}

impl JobReport {
    /// Build a report, decoding the result payload of a completed job.
    pub fn from_job(job: GenerationJob) -> Result<Self> {
        let template = match job.decode_result() {
            Some(decoded) => Some(
                decoded.with_context(|| format!("job {} has an unreadable result payload", job.id))?,
            ),
            None => None,
        };
        Ok(Self {
            id: job.id,
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
            template_id: job.template_id,
            template,
            error: job.error_message,
        })
    }
}

/// Current state of job `id`, or `None` if it does not exist.
pub async fn poll(store: &dyn JobStore, id: Uuid) -> Result<Option<JobReport>> {
    let Some(job) = store.get_job(id).await? else {
        return Ok(None);
    };
    JobReport::from_job(job).map(Some)
}

/// The newest `limit` jobs, newest first.
pub async fn recent(store: &dyn JobStore, limit: i64) -> Result<Vec<GenerationJob>> {
    store
        .list_jobs(limit)
        .await
        .context("failed to list generation jobs")
}
