//! The worker loop: drains the job queue one job at a time through the
//! generation pipeline and settles each job in a terminal state.
//!
//! ```text
//!   Idle ──(pending job found, claim persisted)──> Claimed
//!   Claimed ──(pipeline entered)──> Executing
//!   Executing ──(template built or pipeline failed)──> Settling
//!   Settling ──(completed/failed persisted)──> Idle
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use regimen_db::models::{GenerationJob, ProgramTemplate};
use regimen_db::store::{CatalogReader, JobStore};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog;
use crate::generate::{
    BuildError, GenerationClient, GenerationError, ParseError, PromptError, ValidationError,
    ValidationPolicy, build_prompt, build_template, parse_program, validate_structure,
};

/// Message recorded on jobs found in `processing` when a worker starts.
pub const ORPHANED_JOB_MESSAGE: &str =
    "worker restarted while the job was processing; job abandoned";

/// Worker tuning. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Delay before re-polling an empty queue.
    pub poll_interval: Duration,
    /// Delay after a loop-level (store) failure.
    pub error_backoff: Duration,
    /// Deadline for one generation call.
    pub generation_timeout: Duration,
    pub validation: ValidationPolicy,
    /// Fail jobs left in `processing` when the loop starts.
    pub recover_on_start: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(10),
            generation_timeout: Duration::from_secs(120),
            validation: ValidationPolicy::Strict,
            recover_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Claimed,
    Executing,
    Settling,
}

/// Outcome of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// The queue was empty.
    Idle,
    /// The oldest pending job was claimed by someone else first.
    Lost { job_id: Uuid },
    Completed { job_id: Uuid, template_id: Uuid },
    Failed { job_id: Uuid, message: String },
}

/// Why a claimed job failed. The `Display` text becomes the job's error
/// message.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("job request payload is unreadable: {0}")]
    Request(#[source] serde_json::Error),

    #[error("failed to read exercise catalog: {0:#}")]
    Catalog(anyhow::Error),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("failed to persist generated template: {0:#}")]
    Persistence(anyhow::Error),

    #[error("worker shut down before processing")]
    Cancelled,

    #[error("worker shut down while the program was being generated")]
    Interrupted,
}

pub struct Worker {
    jobs: Arc<dyn JobStore>,
    catalog: Arc<dyn CatalogReader>,
    generator: Arc<dyn GenerationClient>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn CatalogReader>,
        generator: Arc<dyn GenerationClient>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            jobs,
            catalog,
            generator,
            config,
        }
    }

    /// Fail every job left in `processing` by a previous worker process.
    /// Returns how many were failed.
    pub async fn recover_orphans(&self) -> Result<usize> {
        let orphaned = self
            .jobs
            .recover_processing(ORPHANED_JOB_MESSAGE)
            .await
            .context("failed to recover orphaned jobs")?;
        for job in &orphaned {
            tracing::warn!(job_id = %job.id, "failed job orphaned in processing");
        }
        Ok(orphaned.len())
    }

    /// Run until `cancel` fires.
    ///
    /// Job failures are recorded on the job and never end the loop; store
    /// failures while polling or claiming are logged and retried after the
    /// error backoff.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            generator = self.generator.name(),
            poll_interval = ?self.config.poll_interval,
            validation = %self.config.validation,
            "worker started"
        );

        if self.config.recover_on_start {
            match self.recover_orphans().await {
                Ok(0) => {}
                Ok(n) => tracing::warn!(count = n, "recovered orphaned jobs"),
                Err(e) => tracing::error!(error = %format!("{e:#}"), "orphan recovery failed"),
            }
        }

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let pause = match self.run_once(&cancel).await {
                Ok(Tick::Idle) => Some(self.config.poll_interval),
                Ok(_) => None,
                Err(e) => {
                    tracing::error!(
                        error = %format!("{e:#}"),
                        backoff = ?self.config.error_backoff,
                        "worker iteration failed; backing off"
                    );
                    Some(self.config.error_backoff)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }

        tracing::info!("worker stopped");
    }

    /// One iteration: claim the oldest pending job, run it through the
    /// pipeline and settle it.
    ///
    /// Returns `Err` only for store failures outside job processing (polling
    /// or claiming). Everything after a successful claim ends in a terminal
    /// job state, reported through [`Tick`].
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<Tick> {
        let mut state = WorkerState::Idle;

        let Some(job) = self
            .jobs
            .next_pending()
            .await
            .context("failed to poll for pending jobs")?
        else {
            return Ok(Tick::Idle);
        };

        // A stopping worker leaves the job pending for the next one.
        if cancel.is_cancelled() {
            tracing::debug!(job_id = %job.id, "shutdown requested; leaving job pending");
            return Ok(Tick::Idle);
        }

        if !self
            .jobs
            .claim_job(job.id)
            .await
            .with_context(|| format!("failed to claim job {}", job.id))?
        {
            tracing::debug!(job_id = %job.id, "job claimed elsewhere; skipping");
            return Ok(Tick::Lost { job_id: job.id });
        }
        transition(&mut state, WorkerState::Claimed, job.id);

        let outcome = if cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            transition(&mut state, WorkerState::Executing, job.id);
            self.execute(&job, cancel).await
        };

        transition(&mut state, WorkerState::Settling, job.id);
        let tick = match outcome {
            Ok(template) => match self.complete(&job, &template).await {
                Ok(()) => {
                    tracing::info!(
                        job_id = %job.id,
                        template_id = %template.id,
                        weeks = template.weeks.len(),
                        "job completed"
                    );
                    Tick::Completed {
                        job_id: job.id,
                        template_id: template.id,
                    }
                }
                Err(e) => self.fail(job.id, &e).await,
            },
            Err(e) => self.fail(job.id, &e).await,
        };
        transition(&mut state, WorkerState::Idle, job.id);

        Ok(tick)
    }

    /// Run the pipeline for a claimed job. No store writes happen here.
    async fn execute(
        &self,
        job: &GenerationJob,
        cancel: &CancellationToken,
    ) -> Result<ProgramTemplate, PipelineError> {
        let request = job.decode_request().map_err(PipelineError::Request)?;

        let entries = self
            .catalog
            .list_all()
            .await
            .map_err(PipelineError::Catalog)?;
        let offered = catalog::eligible_entries(&entries, request.experience_level);
        tracing::debug!(
            job_id = %job.id,
            offered = offered.len(),
            catalog = entries.len(),
            "catalog filtered"
        );

        let prompt = build_prompt(&request, &offered)?;

        let raw = self
            .generator
            .generate(&prompt, self.config.generation_timeout, cancel)
            .await
            .map_err(|e| match e {
                GenerationError::Cancelled => PipelineError::Interrupted,
                other => PipelineError::Generation(other),
            })?;
        tracing::debug!(job_id = %job.id, bytes = raw.len(), "generation returned");

        let structure = parse_program(&raw)?;
        validate_structure(&structure, &offered, self.config.validation)?;
        let template = build_template(&structure, &request)?;
        Ok(template)
    }

    /// Persist the template and the completed transition as one unit.
    async fn complete(
        &self,
        job: &GenerationJob,
        template: &ProgramTemplate,
    ) -> Result<(), PipelineError> {
        let result = serde_json::to_value(template)
            .map_err(|e| PipelineError::Persistence(anyhow::Error::new(e)))?;
        self.jobs
            .complete_job(job.id, template, &result)
            .await
            .map_err(PipelineError::Persistence)
    }

    /// Record a pipeline failure on the job. A failure to record is logged,
    /// never propagated.
    async fn fail(&self, job_id: Uuid, error: &PipelineError) -> Tick {
        let message = error.to_string();
        match self.jobs.fail_job(job_id, &message).await {
            Ok(true) => tracing::warn!(job_id = %job_id, error = %message, "job failed"),
            Ok(false) => tracing::error!(
                job_id = %job_id,
                error = %message,
                "job was no longer processing; failure not recorded"
            ),
            Err(e) => tracing::error!(
                job_id = %job_id,
                error = %message,
                store_error = %format!("{e:#}"),
                "failed to record job failure"
            ),
        }
        Tick::Failed { job_id, message }
    }
}

fn transition(state: &mut WorkerState, next: WorkerState, job_id: Uuid) {
    tracing::debug!(job_id = %job_id, from = ?*state, to = ?next, "worker state");
    *state = next;
}
