//! Database query functions for the `generation_jobs` table.
//!
//! Every status change is a conditional UPDATE whose WHERE clause includes
//! the expected current status, so a job can only move along the lifecycle
//! edges and a terminal row is never rewritten.

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{GenerateRequest, GenerationJob};

/// Insert a new `pending` job for `request`. Returns the inserted row with
/// server-generated defaults (id, status, timestamps).
pub async fn insert_job(pool: &PgPool, request: &GenerateRequest) -> Result<GenerationJob> {
    let payload = serde_json::to_value(request).context("failed to serialize request")?;

    let job = sqlx::query_as::<_, GenerationJob>(
        "INSERT INTO generation_jobs (request, requester_id) \
         VALUES ($1, $2) \
         RETURNING *",
    )
    .bind(payload)
    .bind(request.requester_id)
    .fetch_one(pool)
    .await
    .context("failed to insert generation job")?;

    Ok(job)
}

/// Fetch a single job by ID.
pub async fn get_job(pool: &PgPool, id: Uuid) -> Result<Option<GenerationJob>> {
    let job = sqlx::query_as::<_, GenerationJob>("SELECT * FROM generation_jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch generation job")?;

    Ok(job)
}

/// Fetch the oldest `pending` job, if any.
pub async fn next_pending(pool: &PgPool) -> Result<Option<GenerationJob>> {
    let job = sqlx::query_as::<_, GenerationJob>(
        "SELECT * FROM generation_jobs \
         WHERE status = 'pending' \
         ORDER BY created_at ASC, id ASC \
         LIMIT 1",
    )
    .fetch_optional(pool)
    .await
    .context("failed to fetch next pending job")?;

    Ok(job)
}

/// List jobs, newest first.
pub async fn list_jobs(pool: &PgPool, limit: i64) -> Result<Vec<GenerationJob>> {
    let jobs = sqlx::query_as::<_, GenerationJob>(
        "SELECT * FROM generation_jobs ORDER BY created_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list generation jobs")?;

    Ok(jobs)
}

/// Transition a job `pending -> processing`.
///
/// Returns the number of rows affected; 0 means the job does not exist or
/// was no longer pending (another worker claimed it first).
pub async fn claim_job(pool: &PgPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE generation_jobs \
         SET status = 'processing', updated_at = now() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("failed to claim generation job")?;

    Ok(result.rows_affected())
}

/// Transition a job `processing -> completed`, attaching the produced
/// template id and the serialized result.
///
/// Takes a connection so it can share a transaction with the template
/// insert. Returns the number of rows affected.
pub async fn mark_completed(
    conn: &mut PgConnection,
    id: Uuid,
    template_id: Uuid,
    result: &serde_json::Value,
) -> Result<u64> {
    let outcome = sqlx::query(
        "UPDATE generation_jobs \
         SET status = 'completed', \
             template_id = $2, \
             result = $3, \
             updated_at = now(), \
             completed_at = now() \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(template_id)
    .bind(result)
    .execute(conn)
    .await
    .context("failed to mark generation job completed")?;

    Ok(outcome.rows_affected())
}

/// Transition a job `processing -> failed` with a diagnostic message.
///
/// Returns the number of rows affected.
pub async fn mark_failed(pool: &PgPool, id: Uuid, message: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE generation_jobs \
         SET status = 'failed', \
             error_message = $2, \
             updated_at = now(), \
             completed_at = now() \
         WHERE id = $1 AND status = 'processing'",
    )
    .bind(id)
    .bind(message)
    .execute(pool)
    .await
    .context("failed to mark generation job failed")?;

    Ok(result.rows_affected())
}

/// Fail every job stuck in `processing`.
///
/// Used for restart recovery: a worker that crashed mid-pipeline leaves its
/// job in limbo, and nothing else would ever settle it. Returns the jobs
/// that were failed.
pub async fn fail_orphaned_jobs(pool: &PgPool, message: &str) -> Result<Vec<GenerationJob>> {
    let jobs = sqlx::query_as::<_, GenerationJob>(
        "UPDATE generation_jobs \
         SET status = 'failed', \
             error_message = $1, \
             updated_at = now(), \
             completed_at = now() \
         WHERE status = 'processing' \
         RETURNING *",
    )
    .bind(message)
    .fetch_all(pool)
    .await
    .context("failed to reset orphaned generation jobs")?;

    Ok(jobs)
}
