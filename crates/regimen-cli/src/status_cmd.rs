//! `regimen status` command: show one job's outcome or list recent jobs.

use anyhow::{Context, Result};
use uuid::Uuid;

use regimen_core::jobs::{self, JobReport};
use regimen_db::models::{GenerationJob, JobStatus, ProgramTemplate};
use regimen_db::store::JobStore;

/// Run the status command.
///
/// When `job_id_str` is `Some`, shows that job (and its template once
/// completed). When `None`, lists the newest `limit` jobs.
pub async fn run_status(
    store: &dyn JobStore,
    job_id_str: Option<&str>,
    limit: i64,
    json: bool,
) -> Result<()> {
    match job_id_str {
        Some(id_str) => run_job_status(store, id_str, json).await,
        None => run_job_list(store, limit).await,
    }
}

async fn run_job_status(store: &dyn JobStore, job_id_str: &str, json: bool) -> Result<()> {
    let job_id =
        Uuid::parse_str(job_id_str).with_context(|| format!("invalid job ID: {job_id_str}"))?;

    let report = jobs::poll(store, job_id)
        .await?
        .with_context(|| format!("job {job_id} not found"))?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("failed to serialize job report")?;
        println!("{rendered}");
    } else {
        print_report(&report);
    }
    Ok(())
}

async fn run_job_list(store: &dyn JobStore, limit: i64) -> Result<()> {
    let jobs = jobs::recent(store, limit).await?;

    if jobs.is_empty() {
        println!("No jobs found. Use `regimen submit <file>` to queue one.");
        return Ok(());
    }

    for line in render_job_list(&jobs) {
        println!("{line}");
    }
    Ok(())
}

/// Print a human-readable job report.
pub fn print_report(report: &JobReport) {
    for line in render_report(report) {
        println!("{line}");
    }
}

fn render_report(report: &JobReport) -> Vec<String> {
    let mut lines = vec![
        format!("Job: {}", report.id),
        format!("Status: {}", report.status),
        format!("Created: {}", report.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ];
    if let Some(completed_at) = report.completed_at {
        lines.push(format!(
            "Settled: {}",
            completed_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }

    match report.status {
        JobStatus::Pending => lines.push("Waiting for a worker.".to_string()),
        JobStatus::Processing => lines.push("A worker is generating this program.".to_string()),
        JobStatus::Failed => {
            lines.push(format!(
                "Error: {}",
                report.error.as_deref().unwrap_or("(no message recorded)")
            ));
        }
        JobStatus::Completed => {
            if let Some(template_id) = report.template_id {
                lines.push(format!("Template: {template_id}"));
            }
            if let Some(template) = &report.template {
                lines.push(String::new());
                lines.extend(render_template(template));
            }
        }
    }
    lines
}

/// Outline of a template: weeks, days, and their exercises.
fn render_template(template: &ProgramTemplate) -> Vec<String> {
    let mut lines = vec![format!(
        "{} ({} weeks, {})",
        template.name, template.duration_weeks, template.experience_level
    )];
    if !template.description.is_empty() {
        lines.push(format!("  {}", template.description));
    }

    for week in &template.weeks {
        match &week.notes {
            Some(notes) => lines.push(format!("  Week {}: {notes}", week.week_number)),
            None => lines.push(format!("  Week {}", week.week_number)),
        }
        for day in &week.days {
            if day.is_rest_day {
                lines.push(format!("    {} (rest)", day.name));
                continue;
            }
            lines.push(format!("    {}", day.name));
            for e in &day.exercises {
                let mut target = format!("{}x{}", e.target_sets, e.target_reps);
                if let Some(weight) = e.target_weight {
                    target.push_str(&format!(" @ {weight}"));
                }
                if let Some(rpe) = e.target_rpe {
                    target.push_str(&format!(" RPE {rpe}"));
                }
                if let Some(group) = e.superset_group {
                    target.push_str(&format!(" [superset {group}]"));
                }
                lines.push(format!("      {}. exercise {}: {target}", e.order_index, e.exercise_id));
            }
        }
    }
    lines
}

fn render_job_list(jobs: &[GenerationJob]) -> Vec<String> {
    let id_w = 36;
    let status_w = 10;

    let mut lines = Vec::with_capacity(jobs.len() + 1);
    lines.push(format!("{:<id_w$}  {:<status_w$}  {:<16}  PROGRAM", "ID", "STATUS", "CREATED"));
    for job in jobs {
        let program = job
            .decode_request()
            .map(|r| r.program_name)
            .unwrap_or_else(|_| "(unreadable request)".to_string());
        lines.push(format!(
            "{:<id_w$}  {:<status_w$}  {:<16}  {program}",
            job.id,
            job.status.to_string(),
            job.created_at.format("%Y-%m-%d %H:%M").to_string(),
        ));
    }
    lines
}
