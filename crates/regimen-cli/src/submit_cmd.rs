//! `regimen submit` command: queue a generation request read from TOML.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use uuid::Uuid;

use regimen_core::jobs;
use regimen_db::models::{ExperienceLevel, GenerateRequest};
use regimen_db::store::JobStore;

use crate::status_cmd;

/// How often `--wait` re-reads the job.
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// On-disk request. `requester_id` may instead come from `--requester`.
#[derive(Debug, Deserialize)]
struct RequestFile {
    program_name: String,
    #[serde(default)]
    description: String,
    duration_weeks: i32,
    experience_level: ExperienceLevel,
    workout_days: Vec<String>,
    #[serde(default)]
    requester_id: Option<Uuid>,
}

/// Parse a request TOML document. A `requester` given on the command line
/// takes precedence over the file's `requester_id`.
pub fn parse_request_toml(content: &str, requester: Option<Uuid>) -> Result<GenerateRequest> {
    let file: RequestFile = toml::from_str(content).context("invalid request TOML")?;

    let Some(requester_id) = requester.or(file.requester_id) else {
        bail!("no requester id; set requester_id in the file or pass --requester");
    };

    Ok(GenerateRequest {
        program_name: file.program_name,
        description: file.description,
        duration_weeks: file.duration_weeks,
        experience_level: file.experience_level,
        workout_days: file.workout_days,
        requester_id,
    })
}

/// Run the submit command.
///
/// Prints the new job id. With `wait`, keeps polling until the job settles
/// and then prints its report.
pub async fn run_submit(
    store: &dyn JobStore,
    file_path: &str,
    requester: Option<&str>,
    wait: bool,
) -> Result<()> {
    let requester = requester
        .map(|r| Uuid::parse_str(r).with_context(|| format!("invalid requester ID: {r}")))
        .transpose()?;

    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("failed to read request file: {file_path}"))?;
    let request = parse_request_toml(&content, requester)
        .with_context(|| format!("failed to parse request file: {file_path}"))?;

    let job_id = jobs::submit(store, &request).await?;

    println!("Job queued: {job_id}");
    println!("  Program:  {}", request.program_name);
    println!("  Level:    {}", request.experience_level);
    println!("  Weeks:    {}", request.duration_weeks);
    println!("  Days:     {}", request.workout_days.join(", "));

    if !wait {
        println!();
        println!("Check progress with `regimen status {job_id}`.");
        return Ok(());
    }

    println!();
    println!("Waiting for a worker to settle the job (Ctrl-C to stop waiting)...");
    let report = loop {
        let report = jobs::poll(store, job_id)
            .await?
            .with_context(|| format!("job {job_id} disappeared while waiting"))?;
        if report.status.is_terminal() {
            break report;
        }
        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
    };

    println!();
    status_cmd::print_report(&report);
    Ok(())
}
