//! Store traits the generation pipeline is written against, and their
//! PostgreSQL implementation.
//!
//! Both traits are object-safe so the worker can hold them as
//! `Arc<dyn JobStore>` / `Arc<dyn CatalogReader>` and tests can substitute
//! an in-memory store.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CatalogEntry, GenerateRequest, GenerationJob, ProgramTemplate};
use crate::queries::{catalog, jobs, templates};

/// Durable record of generation jobs.
///
/// Implementations must only ever move a job along
/// `pending -> processing -> {completed | failed}`; each transition method
/// checks the expected current status and reports whether it applied.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job in `pending` state.
    async fn insert_job(&self, request: &GenerateRequest) -> Result<GenerationJob>;

    /// Fetch a job by id.
    async fn get_job(&self, id: Uuid) -> Result<Option<GenerationJob>>;

    /// The oldest `pending` job by creation time.
    async fn next_pending(&self) -> Result<Option<GenerationJob>>;

    /// Persist `pending -> processing`. Returns `false` if the job was not
    /// pending (e.g. another worker claimed it).
    async fn claim_job(&self, id: Uuid) -> Result<bool>;

    /// Persist the template graph and `processing -> completed` as one unit
    /// of work: either both are durable or neither is.
    async fn complete_job(
        &self,
        id: Uuid,
        template: &ProgramTemplate,
        result: &serde_json::Value,
    ) -> Result<()>;

    /// Persist `processing -> failed` with a message. Returns `false` if the
    /// job was not processing.
    async fn fail_job(&self, id: Uuid, message: &str) -> Result<bool>;

    /// Fail every job left in `processing` (restart recovery).
    async fn recover_processing(&self, message: &str) -> Result<Vec<GenerationJob>>;

    /// Jobs, newest first.
    async fn list_jobs(&self, limit: i64) -> Result<Vec<GenerationJob>>;
}

/// Read-only access to the exercise catalog.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Every catalog entry. Filtering is the caller's concern.
    async fn list_all(&self) -> Result<Vec<CatalogEntry>>;
}

// Compile-time assertion: both traits are usable as trait objects.
const _: () = {
    fn _assert_object_safe(_: &dyn JobStore, _: &dyn CatalogReader) {}
};

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

/// [`JobStore`] and [`CatalogReader`] backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Load a persisted template with its full tree.
    pub async fn get_template(&self, id: Uuid) -> Result<Option<ProgramTemplate>> {
        templates::get_template(&self.pool, id).await
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn insert_job(&self, request: &GenerateRequest) -> Result<GenerationJob> {
        jobs::insert_job(&self.pool, request).await
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<GenerationJob>> {
        jobs::get_job(&self.pool, id).await
    }

    async fn next_pending(&self) -> Result<Option<GenerationJob>> {
        jobs::next_pending(&self.pool).await
    }

    async fn claim_job(&self, id: Uuid) -> Result<bool> {
        Ok(jobs::claim_job(&self.pool, id).await? == 1)
    }

    async fn complete_job(
        &self,
        id: Uuid,
        template: &ProgramTemplate,
        result: &serde_json::Value,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        templates::insert_template(&mut *tx, template).await?;

        let rows = jobs::mark_completed(&mut *tx, id, template.id, result).await?;
        if rows == 0 {
            // Rolls back on drop.
            bail!("job {id} is not processing; refusing to complete it");
        }

        tx.commit().await.context("failed to commit transaction")?;
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, message: &str) -> Result<bool> {
        Ok(jobs::mark_failed(&self.pool, id, message).await? == 1)
    }

    async fn recover_processing(&self, message: &str) -> Result<Vec<GenerationJob>> {
        jobs::fail_orphaned_jobs(&self.pool, message).await
    }

    async fn list_jobs(&self, limit: i64) -> Result<Vec<GenerationJob>> {
        jobs::list_jobs(&self.pool, limit).await
    }
}

#[async_trait]
impl CatalogReader for PgStore {
    async fn list_all(&self) -> Result<Vec<CatalogEntry>> {
        catalog::list_all(&self.pool).await
    }
}
