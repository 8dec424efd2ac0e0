use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use regimen_db::models::{
    CatalogEntry, GenerateRequest, GenerationJob, JobStatus, ProgramTemplate,
};
use regimen_db::store::{CatalogReader, JobStore};

#[derive(Default)]
struct Inner {
    jobs: Vec<GenerationJob>,
    catalog: Vec<CatalogEntry>,
    templates: Vec<ProgramTemplate>,
    /// Every status each job has been in, in order.
    history: Vec<(Uuid, JobStatus)>,
    /// Number of upcoming `next_pending` calls that should error.
    failing_polls: u32,
    fail_commits: bool,
    polls: u32,
}

/// In-memory job store and catalog.
///
/// Enforces the same lifecycle edges and foreign-key rule as the PostgreSQL
/// schema, and records every status a job passes through so tests can assert
/// on the exact transition sequence.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: Vec<CatalogEntry>) -> Self {
        let store = Self::new();
        store.lock().catalog = catalog;
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a pending job with an explicit creation time.
    pub fn insert_job_at(&self, request: &GenerateRequest, created_at: DateTime<Utc>) -> Uuid {
        let mut inner = self.lock();
        let job = GenerationJob {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            request: serde_json::to_value(request).expect("request serializes"),
            result: None,
            error_message: None,
            template_id: None,
            requester_id: request.requester_id,
            created_at,
            updated_at: created_at,
            completed_at: None,
        };
        let id = job.id;
        inner.history.push((id, JobStatus::Pending));
        inner.jobs.push(job);
        id
    }

    /// Make the next `n` calls to `next_pending` fail as if the database
    /// were unreachable.
    pub fn fail_next_polls(&self, n: u32) {
        self.lock().failing_polls = n;
    }

    /// Make `complete_job` fail (after validation) as if the commit failed.
    pub fn fail_commits(&self, fail: bool) {
        self.lock().fail_commits = fail;
    }

    /// Number of `next_pending` calls seen so far, including failed ones.
    pub fn poll_count(&self) -> u32 {
        self.lock().polls
    }

    /// Templates persisted by successful completions.
    pub fn templates(&self) -> Vec<ProgramTemplate> {
        self.lock().templates.clone()
    }

    /// Every status the job has been in, oldest first.
    pub fn history(&self, id: Uuid) -> Vec<JobStatus> {
        self.lock()
            .history
            .iter()
            .filter(|(job_id, _)| *job_id == id)
            .map(|(_, status)| *status)
            .collect()
    }

    fn job_mut(inner: &mut Inner, id: Uuid) -> Option<&mut GenerationJob> {
        inner.jobs.iter_mut().find(|j| j.id == id)
    }

    /// Apply `to` if the job is currently `from`. Returns whether it applied.
    fn transition(inner: &mut Inner, id: Uuid, from: JobStatus, to: JobStatus) -> bool {
        debug_assert!(from.can_transition_to(to));
        let now = Utc::now();
        let Some(job) = Self::job_mut(inner, id) else {
            return false;
        };
        if job.status != from {
            return false;
        }
        job.status = to;
        job.updated_at = now;
        if to.is_terminal() {
            job.completed_at = Some(now);
        }
        inner.history.push((id, to));
        true
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, request: &GenerateRequest) -> Result<GenerationJob> {
        let id = self.insert_job_at(request, Utc::now());
        let inner = self.lock();
        Ok(inner
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .expect("job was just inserted"))
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<GenerationJob>> {
        Ok(self.lock().jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn next_pending(&self) -> Result<Option<GenerationJob>> {
        let mut inner = self.lock();
        inner.polls += 1;
        if inner.failing_polls > 0 {
            inner.failing_polls -= 1;
            bail!("connection refused (simulated)");
        }
        Ok(inner
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .min_by_key(|j| j.created_at)
            .cloned())
    }

    async fn claim_job(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.lock();
        Ok(Self::transition(
            &mut inner,
            id,
            JobStatus::Pending,
            JobStatus::Processing,
        ))
    }

    async fn complete_job(
        &self,
        id: Uuid,
        template: &ProgramTemplate,
        result: &serde_json::Value,
    ) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_commits {
            bail!("commit failed (simulated)");
        }
        for exercise in template.exercises() {
            if !inner.catalog.iter().any(|c| c.id == exercise.exercise_id) {
                bail!(
                    "foreign key violation: exercise {} is not in the catalog",
                    exercise.exercise_id
                );
            }
        }
        if !Self::transition(&mut inner, id, JobStatus::Processing, JobStatus::Completed) {
            bail!("job {id} is not processing; refusing to complete it");
        }
        let job = Self::job_mut(&mut inner, id).expect("job exists after transition");
        job.template_id = Some(template.id);
        job.result = Some(result.clone());
        inner.templates.push(template.clone());
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, message: &str) -> Result<bool> {
        let mut inner = self.lock();
        if !Self::transition(&mut inner, id, JobStatus::Processing, JobStatus::Failed) {
            return Ok(false);
        }
        let job = Self::job_mut(&mut inner, id).expect("job exists after transition");
        job.error_message = Some(message.to_owned());
        Ok(true)
    }

    async fn recover_processing(&self, message: &str) -> Result<Vec<GenerationJob>> {
        let mut inner = self.lock();
        let orphaned: Vec<Uuid> = inner
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Processing)
            .map(|j| j.id)
            .collect();
        let mut recovered = Vec::with_capacity(orphaned.len());
        for id in orphaned {
            Self::transition(&mut inner, id, JobStatus::Processing, JobStatus::Failed);
            let job = Self::job_mut(&mut inner, id).expect("job exists after transition");
            job.error_message = Some(message.to_owned());
            recovered.push(job.clone());
        }
        Ok(recovered)
    }

    async fn list_jobs(&self, limit: i64) -> Result<Vec<GenerationJob>> {
        let inner = self.lock();
        let mut jobs = inner.jobs.clone();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(jobs)
    }
}

#[async_trait]
impl CatalogReader for MemoryStore {
    async fn list_all(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self.lock().catalog.clone())
    }
}
