//! Integration tests for the worker loop, driven end to end against the
//! in-memory store and scripted generation clients.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use regimen_core::generate::{GenerationClient, GenerationError, ValidationPolicy};
use regimen_core::jobs;
use regimen_core::worker::{ORPHANED_JOB_MESSAGE, Tick, Worker, WorkerConfig};
use regimen_db::models::{
    CatalogEntry, ExerciseType, ExperienceLevel, GenerateRequest, JobStatus,
};
use regimen_db::store::JobStore;
use regimen_test_utils::MemoryStore;

// -----------------------------------------------------------------------
// Scripted generation clients
// -----------------------------------------------------------------------

enum Reply {
    Text(String),
    Status(u16),
}

/// Replies from a fixed script, recording every prompt it receives.
#[derive(Default)]
struct ScriptedGenerator {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn replying(texts: &[String]) -> Arc<Self> {
        Self::new(texts.iter().cloned().map(Reply::Text).collect())
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        prompt: &str,
        _deadline: Duration,
        _cancel: &CancellationToken,
    ) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Status(status)) => Err(GenerationError::Status {
                status,
                body: "service unavailable".to_string(),
            }),
            None => panic!("scripted generator ran out of replies"),
        }
    }
}

/// Never answers; returns only once cancelled.
#[derive(Default)]
struct HangingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl GenerationClient for HangingGenerator {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        cancel.cancelled().await;
        Err(GenerationError::Cancelled)
    }
}

// -----------------------------------------------------------------------
// Fixtures
// -----------------------------------------------------------------------

fn entry(
    id: i64,
    name: &str,
    difficulty: ExperienceLevel,
    exercise_type: ExerciseType,
) -> CatalogEntry {
    CatalogEntry {
        id,
        name: name.to_string(),
        movement_pattern: "compound".to_string(),
        primary_muscle_group: "full body".to_string(),
        secondary_muscle_group: None,
        difficulty,
        exercise_type,
    }
}

/// Catalog {1: squat, 2: plank} plus entries a beginner must never see.
fn catalog() -> Vec<CatalogEntry> {
    vec![
        entry(1, "Squat", ExperienceLevel::Beginner, ExerciseType::Strength),
        entry(2, "Plank", ExperienceLevel::Beginner, ExerciseType::Bodyweight),
        entry(3, "Snatch", ExperienceLevel::Advanced, ExerciseType::Strength),
        entry(4, "Hamstring Stretch", ExperienceLevel::Beginner, ExerciseType::Flexibility),
    ]
}

fn request(name: &str, duration_weeks: i32, days: &[&str]) -> GenerateRequest {
    GenerateRequest {
        program_name: name.to_string(),
        description: "Test program".to_string(),
        duration_weeks,
        experience_level: ExperienceLevel::Beginner,
        workout_days: days.iter().map(|d| d.to_string()).collect(),
        requester_id: Uuid::new_v4(),
    }
}

fn exercise(id: i64, order: i32) -> serde_json::Value {
    json!({"exerciseId": id, "orderIndex": order, "targetSets": 3, "targetReps": 10})
}

/// A one-week program whose single day trains `exercises`.
fn one_day_program(exercises: Vec<serde_json::Value>) -> String {
    json!({
        "programName": "Generated",
        "description": "Generated description",
        "weeks": [{
            "weekNumber": 1,
            "workoutDays": [{"name": "Full Body", "isRestDay": false, "exercises": exercises}]
        }]
    })
    .to_string()
}

fn config(validation: ValidationPolicy) -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(50),
        error_backoff: Duration::from_millis(100),
        generation_timeout: Duration::from_secs(5),
        validation,
        recover_on_start: true,
    }
}

fn worker(
    store: &Arc<MemoryStore>,
    generator: Arc<dyn GenerationClient>,
    validation: ValidationPolicy,
) -> Worker {
    Worker::new(store.clone(), store.clone(), generator, config(validation))
}

fn settled(history: &[JobStatus], last: JobStatus) -> bool {
    history == [JobStatus::Pending, JobStatus::Processing, last]
}

/// Poll the store until job `id` is terminal, yielding to the worker task.
async fn wait_terminal(store: &MemoryStore, id: Uuid) {
    for _ in 0..1000 {
        if let Some(job) = store.get_job(id).await.unwrap() {
            if job.status.is_terminal() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached a terminal state");
}

// -----------------------------------------------------------------------
// Pipeline outcomes
// -----------------------------------------------------------------------

#[tokio::test]
async fn unknown_exercise_fails_job_and_names_the_id() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let generator = ScriptedGenerator::replying(&[one_day_program(vec![
        exercise(1, 0),
        exercise(99, 1),
    ])]);
    let w = worker(&store, generator, ValidationPolicy::Strict);

    let id = jobs::submit(store.as_ref(), &request("Four weeks", 4, &["A"]))
        .await
        .unwrap();
    let tick = w.run_once(&CancellationToken::new()).await.unwrap();

    let Tick::Failed { job_id, message } = tick else {
        panic!("expected failure, got {tick:?}");
    };
    assert_eq!(job_id, id);
    assert!(message.contains("99"), "message: {message}");

    let report = jobs::poll(store.as_ref(), id).await.unwrap().unwrap();
    assert_eq!(report.status, JobStatus::Failed);
    assert_eq!(report.error.as_deref(), Some(message.as_str()));
    assert!(report.completed_at.is_some());
    assert!(report.template.is_none());
    assert!(store.templates().is_empty());
    assert!(settled(&store.history(id), JobStatus::Failed));
}

#[tokio::test]
async fn valid_program_completes_with_full_tree() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let generator = ScriptedGenerator::replying(&[one_day_program(vec![
        exercise(2, 0),
        exercise(1, 1),
    ])]);
    let w = worker(&store, generator, ValidationPolicy::Strict);

    let req = request("One day", 1, &["Full Body"]);
    let id = jobs::submit(store.as_ref(), &req).await.unwrap();
    let tick = w.run_once(&CancellationToken::new()).await.unwrap();
    assert!(matches!(tick, Tick::Completed { job_id, .. } if job_id == id), "{tick:?}");

    let report = jobs::poll(store.as_ref(), id).await.unwrap().unwrap();
    assert_eq!(report.status, JobStatus::Completed);
    assert!(report.error.is_none());
    let template = report.template.expect("completed job carries its template");
    assert_eq!(report.template_id, Some(template.id));
    assert_eq!(template.name, "Generated");
    assert_eq!(template.duration_weeks, 1);
    assert_eq!(template.created_by, req.requester_id);
    assert_eq!(template.weeks.len(), 1);
    assert_eq!(template.weeks[0].days.len(), 1);
    let exercises = &template.weeks[0].days[0].exercises;
    let ids: Vec<i64> = exercises.iter().map(|e| e.exercise_id).collect();
    assert_eq!(ids, vec![2, 1]);
    assert!(exercises.iter().all(|e| e.target_sets == 3 && e.target_reps == 10));

    assert_eq!(store.templates(), vec![template]);
    assert!(settled(&store.history(id), JobStatus::Completed));
}

#[tokio::test]
async fn duplicate_week_fails_without_persisting() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let program = json!({
        "programName": "Dup",
        "weeks": [
            {"weekNumber": 1, "workoutDays": [{"name": "A", "exercises": [exercise(1, 0)]}]},
            {"weekNumber": 1, "workoutDays": [{"name": "A", "exercises": [exercise(2, 0)]}]}
        ]
    })
    .to_string();
    let w = worker(&store, ScriptedGenerator::replying(&[program]), ValidationPolicy::Strict);

    let id = jobs::submit(store.as_ref(), &request("Dup", 2, &["A"])).await.unwrap();
    let tick = w.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        tick,
        Tick::Failed {
            job_id: id,
            message: "generated program repeats week number 1".to_string()
        }
    );
    assert!(store.templates().is_empty());
}

fn rest_day_program() -> String {
    json!({
        "programName": "Rest",
        "weeks": [{
            "weekNumber": 1,
            "workoutDays": [
                {"name": "Train", "isRestDay": false, "exercises": [exercise(1, 0)]},
                {"name": "Recover", "isRestDay": true, "exercises": [exercise(2, 0)]}
            ]
        }]
    })
    .to_string()
}

#[tokio::test]
async fn rest_day_with_exercises_fails_under_strict_policy() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let w = worker(
        &store,
        ScriptedGenerator::replying(&[rest_day_program()]),
        ValidationPolicy::Strict,
    );

    let id = jobs::submit(store.as_ref(), &request("Rest", 1, &["Train", "Recover"]))
        .await
        .unwrap();
    let tick = w.run_once(&CancellationToken::new()).await.unwrap();

    let Tick::Failed { message, .. } = tick else {
        panic!("expected failure, got {tick:?}");
    };
    assert!(message.contains("\"Recover\" is a rest day"), "message: {message}");
    assert!(settled(&store.history(id), JobStatus::Failed));
    assert!(store.templates().is_empty());
}

#[tokio::test]
async fn rest_day_with_exercises_is_kept_under_catalog_only_policy() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let w = worker(
        &store,
        ScriptedGenerator::replying(&[rest_day_program()]),
        ValidationPolicy::CatalogOnly,
    );

    let id = jobs::submit(store.as_ref(), &request("Rest", 1, &["Train", "Recover"]))
        .await
        .unwrap();
    let tick = w.run_once(&CancellationToken::new()).await.unwrap();
    assert!(matches!(tick, Tick::Completed { .. }), "{tick:?}");

    let template = jobs::poll(store.as_ref(), id)
        .await
        .unwrap()
        .unwrap()
        .template
        .unwrap();
    let rest = &template.weeks[0].days[1];
    assert!(rest.is_rest_day);
    assert_eq!(rest.exercises.len(), 1);
}

#[tokio::test]
async fn fenced_response_with_string_numbers_completes() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let raw = "```json\n{\"weeks\": [{\"weekNumber\": \"1\", \"workoutDays\": [{\"name\": \"A\", \
               \"exercises\": [{\"exerciseId\": \"1\", \"orderIndex\": \"0\", \"targetSets\": \"4\", \
               \"targetReps\": \"\"}]}]}]}\n```"
        .to_string();
    let w = worker(&store, ScriptedGenerator::replying(&[raw]), ValidationPolicy::CatalogOnly);

    let req = request("Fenced", 1, &["A"]);
    let id = jobs::submit(store.as_ref(), &req).await.unwrap();
    let tick = w.run_once(&CancellationToken::new()).await.unwrap();
    assert!(matches!(tick, Tick::Completed { .. }), "{tick:?}");

    let template = jobs::poll(store.as_ref(), id).await.unwrap().unwrap().template.unwrap();
    // Blank generated name falls back to the request.
    assert_eq!(template.name, "Fenced");
    let ex = &template.weeks[0].days[0].exercises[0];
    assert_eq!((ex.exercise_id, ex.target_sets, ex.target_reps), (1, 4, 0));
}

#[tokio::test]
async fn prompt_offers_only_eligible_exercises() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let generator = ScriptedGenerator::replying(&[one_day_program(vec![exercise(1, 0)])]);
    let w = worker(&store, generator.clone(), ValidationPolicy::Strict);

    jobs::submit(store.as_ref(), &request("Offer", 1, &["A"])).await.unwrap();
    w.run_once(&CancellationToken::new()).await.unwrap();

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("- id 1: Squat"));
    assert!(prompts[0].contains("- id 2: Plank"));
    assert!(!prompts[0].contains("Snatch"));
    assert!(!prompts[0].contains("Hamstring Stretch"));
}

#[tokio::test]
async fn advanced_only_exercise_is_rejected_for_beginner() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let generator = ScriptedGenerator::replying(&[one_day_program(vec![exercise(3, 0)])]);
    let w = worker(&store, generator, ValidationPolicy::CatalogOnly);

    jobs::submit(store.as_ref(), &request("Too hard", 1, &["A"])).await.unwrap();
    let tick = w.run_once(&CancellationToken::new()).await.unwrap();
    assert!(
        matches!(tick, Tick::Failed { ref message, .. } if message.ends_with(": 3")),
        "{tick:?}"
    );
}

#[tokio::test]
async fn empty_eligible_catalog_fails_without_calling_generator() {
    let store = Arc::new(MemoryStore::with_catalog(vec![
        entry(3, "Snatch", ExperienceLevel::Advanced, ExerciseType::Strength),
        entry(4, "Stretch", ExperienceLevel::Beginner, ExerciseType::Flexibility),
    ]));
    let generator = ScriptedGenerator::new(Vec::new());
    let w = worker(&store, generator.clone(), ValidationPolicy::Strict);

    let id = jobs::submit(store.as_ref(), &request("Empty", 1, &["A"])).await.unwrap();
    let tick = w.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        tick,
        Tick::Failed {
            job_id: id,
            message: "no catalog exercises are eligible for experience level beginner".to_string()
        }
    );
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn generation_error_fails_job_without_retry() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let generator = ScriptedGenerator::new(vec![Reply::Status(503)]);
    let w = worker(&store, generator.clone(), ValidationPolicy::Strict);

    let id = jobs::submit(store.as_ref(), &request("Outage", 1, &["A"])).await.unwrap();
    let tick = w.run_once(&CancellationToken::new()).await.unwrap();

    let Tick::Failed { message, .. } = tick else {
        panic!("expected failure, got {tick:?}");
    };
    assert!(message.contains("HTTP 503"), "message: {message}");
    assert_eq!(generator.calls(), 1);
    assert!(settled(&store.history(id), JobStatus::Failed));
}

#[tokio::test]
async fn unparseable_response_fails_job() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let generator = ScriptedGenerator::replying(&["Sure! Here's a great program.".to_string()]);
    let w = worker(&store, generator, ValidationPolicy::Strict);

    jobs::submit(store.as_ref(), &request("Prose", 1, &["A"])).await.unwrap();
    let tick = w.run_once(&CancellationToken::new()).await.unwrap();
    assert!(
        matches!(tick, Tick::Failed { ref message, .. } if message.starts_with("generated program is malformed")),
        "{tick:?}"
    );
}

#[tokio::test]
async fn commit_failure_fails_job_and_persists_nothing() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    store.fail_commits(true);
    let generator = ScriptedGenerator::replying(&[one_day_program(vec![exercise(1, 0)])]);
    let w = worker(&store, generator, ValidationPolicy::Strict);

    let id = jobs::submit(store.as_ref(), &request("Commit", 1, &["A"])).await.unwrap();
    let tick = w.run_once(&CancellationToken::new()).await.unwrap();

    let Tick::Failed { message, .. } = tick else {
        panic!("expected failure, got {tick:?}");
    };
    assert!(message.starts_with("failed to persist generated template"), "{message}");
    assert!(store.templates().is_empty());
    let job = store.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.template_id.is_none());
    assert!(job.result.is_none());
}

// -----------------------------------------------------------------------
// Queue semantics
// -----------------------------------------------------------------------

#[tokio::test]
async fn oldest_pending_job_is_processed_first() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let program = one_day_program(vec![exercise(1, 0)]);
    let generator = ScriptedGenerator::replying(&[program.clone(), program]);
    let w = worker(&store, generator.clone(), ValidationPolicy::Strict);

    let now = Utc::now();
    let newer = store.insert_job_at(&request("Newer", 1, &["A"]), now);
    let older = store.insert_job_at(
        &request("Older", 1, &["A"]),
        now - chrono::Duration::minutes(1),
    );

    let cancel = CancellationToken::new();
    let first = w.run_once(&cancel).await.unwrap();
    let second = w.run_once(&cancel).await.unwrap();

    assert!(matches!(first, Tick::Completed { job_id, .. } if job_id == older));
    assert!(matches!(second, Tick::Completed { job_id, .. } if job_id == newer));
    let prompts = generator.prompts();
    assert!(prompts[0].contains("**Program name:** Older"));
    assert!(prompts[1].contains("**Program name:** Newer"));
}

#[tokio::test]
async fn terminal_jobs_are_never_reprocessed() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let generator = ScriptedGenerator::replying(&[one_day_program(vec![exercise(1, 0)])]);
    let w = worker(&store, generator.clone(), ValidationPolicy::Strict);

    let id = jobs::submit(store.as_ref(), &request("Once", 1, &["A"])).await.unwrap();
    let cancel = CancellationToken::new();
    assert!(matches!(w.run_once(&cancel).await.unwrap(), Tick::Completed { .. }));
    assert_eq!(w.run_once(&cancel).await.unwrap(), Tick::Idle);
    assert_eq!(w.run_once(&cancel).await.unwrap(), Tick::Idle);

    assert_eq!(generator.calls(), 1);
    assert!(!store.fail_job(id, "late failure").await.unwrap());
    assert!(settled(&store.history(id), JobStatus::Completed));
}

#[tokio::test]
async fn identical_invalid_input_fails_identically() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let program = one_day_program(vec![exercise(42, 0), exercise(7, 1), exercise(1, 2)]);
    let generator = ScriptedGenerator::replying(&[program.clone(), program]);
    let w = worker(&store, generator, ValidationPolicy::Strict);

    let a = jobs::submit(store.as_ref(), &request("Same", 1, &["A"])).await.unwrap();
    let b = jobs::submit(store.as_ref(), &request("Same", 1, &["A"])).await.unwrap();
    let cancel = CancellationToken::new();
    w.run_once(&cancel).await.unwrap();
    w.run_once(&cancel).await.unwrap();

    let error_a = store.get_job(a).await.unwrap().unwrap().error_message.unwrap();
    let error_b = store.get_job(b).await.unwrap().unwrap().error_message.unwrap();
    assert_eq!(error_a, error_b);
    assert!(error_a.ends_with(": 7, 42"), "{error_a}");
}

#[tokio::test]
async fn poll_failure_is_a_loop_level_error() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    store.fail_next_polls(1);
    let w = worker(&store, ScriptedGenerator::new(Vec::new()), ValidationPolicy::Strict);

    let err = w.run_once(&CancellationToken::new()).await.unwrap_err();
    assert!(format!("{err:#}").contains("failed to poll for pending jobs"));
    assert_eq!(w.run_once(&CancellationToken::new()).await.unwrap(), Tick::Idle);
}

// -----------------------------------------------------------------------
// Cancellation and recovery
// -----------------------------------------------------------------------

#[tokio::test]
async fn cancelled_worker_leaves_queued_job_pending() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let generator = ScriptedGenerator::new(Vec::new());
    let w = worker(&store, generator.clone(), ValidationPolicy::Strict);

    let id = jobs::submit(store.as_ref(), &request("Late", 1, &["A"])).await.unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let tick = w.run_once(&cancel).await.unwrap();

    assert_eq!(tick, Tick::Idle);
    assert_eq!(generator.calls(), 0);
    assert_eq!(store.history(id), vec![JobStatus::Pending]);
    assert_eq!(
        store.get_job(id).await.unwrap().unwrap().status,
        JobStatus::Pending
    );

    // A fresh worker picks it up normally.
    let generator = ScriptedGenerator::replying(&[one_day_program(vec![exercise(1, 0)])]);
    let w = worker(&store, generator, ValidationPolicy::Strict);
    let tick = w.run_once(&CancellationToken::new()).await.unwrap();
    assert!(matches!(tick, Tick::Completed { job_id, .. } if job_id == id));
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_generation_leaves_no_job_processing() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let generator = Arc::new(HangingGenerator::default());
    let w = worker(&store, generator.clone(), ValidationPolicy::Strict);

    let id = jobs::submit(store.as_ref(), &request("Hang", 1, &["A"])).await.unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { w.run(cancel).await }
    });

    for _ in 0..100 {
        if generator.calls.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        store.get_job(id).await.unwrap().unwrap().status,
        JobStatus::Processing
    );

    cancel.cancel();
    handle.await.unwrap();

    let job = store.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error_message.as_deref(),
        Some("worker shut down while the program was being generated")
    );
}

#[tokio::test(start_paused = true)]
async fn loop_survives_store_outage() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    store.fail_next_polls(3);
    let generator = ScriptedGenerator::replying(&[one_day_program(vec![exercise(1, 0)])]);
    let w = worker(&store, generator, ValidationPolicy::Strict);

    let id = jobs::submit(store.as_ref(), &request("Outage", 1, &["A"])).await.unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { w.run(cancel).await }
    });

    wait_terminal(&store, id).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(
        store.get_job(id).await.unwrap().unwrap().status,
        JobStatus::Completed
    );
    assert!(store.poll_count() >= 4, "polls: {}", store.poll_count());
}

#[tokio::test(start_paused = true)]
async fn run_drains_queue_then_idles_until_cancelled() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let program = one_day_program(vec![exercise(1, 0)]);
    let generator = ScriptedGenerator::replying(&[program.clone(), program]);
    let w = worker(&store, generator.clone(), ValidationPolicy::Strict);

    let a = jobs::submit(store.as_ref(), &request("A", 1, &["A"])).await.unwrap();
    let b = jobs::submit(store.as_ref(), &request("B", 1, &["A"])).await.unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { w.run(cancel).await }
    });

    wait_terminal(&store, a).await;
    wait_terminal(&store, b).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(generator.calls(), 2);
    assert_eq!(store.templates().len(), 2);
}

#[tokio::test]
async fn orphaned_processing_jobs_are_failed_on_recovery() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let orphan = jobs::submit(store.as_ref(), &request("Orphan", 1, &["A"])).await.unwrap();
    let waiting = jobs::submit(store.as_ref(), &request("Waiting", 1, &["A"])).await.unwrap();
    assert!(store.claim_job(orphan).await.unwrap());

    let w = worker(&store, ScriptedGenerator::new(Vec::new()), ValidationPolicy::Strict);
    assert_eq!(w.recover_orphans().await.unwrap(), 1);

    let job = store.get_job(orphan).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some(ORPHANED_JOB_MESSAGE));
    assert!(settled(&store.history(orphan), JobStatus::Failed));

    assert_eq!(
        store.get_job(waiting).await.unwrap().unwrap().status,
        JobStatus::Pending
    );
    assert_eq!(w.recover_orphans().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn run_recovers_orphans_before_polling() {
    let store = Arc::new(MemoryStore::with_catalog(catalog()));
    let orphan = jobs::submit(store.as_ref(), &request("Orphan", 1, &["A"])).await.unwrap();
    assert!(store.claim_job(orphan).await.unwrap());

    let w = worker(&store, ScriptedGenerator::new(Vec::new()), ValidationPolicy::Strict);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { w.run(cancel).await }
    });

    wait_terminal(&store, orphan).await;
    cancel.cancel();
    handle.await.unwrap();

    let job = store.get_job(orphan).await.unwrap().unwrap();
    assert_eq!(job.error_message.as_deref(), Some(ORPHANED_JOB_MESSAGE));
}
