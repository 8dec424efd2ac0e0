//! Database query functions for the program template aggregate
//! (`program_templates`, `template_weeks`, `workout_days`, `workout_exercises`).

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{ExperienceLevel, ProgramTemplate, TemplateWeek, WorkoutDay, WorkoutExercise};

/// Insert a complete template graph.
///
/// Takes a connection rather than a pool so the caller can run it inside the
/// same transaction as the job status update.
pub async fn insert_template(conn: &mut PgConnection, template: &ProgramTemplate) -> Result<()> {
    sqlx::query(
        "INSERT INTO program_templates \
             (id, name, description, duration_weeks, experience_level, created_by, \
              is_active, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(template.id)
    .bind(&template.name)
    .bind(&template.description)
    .bind(template.duration_weeks)
    .bind(template.experience_level)
    .bind(template.created_by)
    .bind(template.is_active)
    .bind(template.created_at)
    .bind(template.updated_at)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("failed to insert program template {:?}", template.name))?;

    for week in &template.weeks {
        sqlx::query(
            "INSERT INTO template_weeks (id, template_id, week_number, notes) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(week.id)
        .bind(template.id)
        .bind(week.week_number)
        .bind(&week.notes)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to insert week {}", week.week_number))?;

        for day in &week.days {
            sqlx::query(
                "INSERT INTO workout_days (id, week_id, position, name, description, is_rest_day) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(day.id)
            .bind(week.id)
            .bind(day.position)
            .bind(&day.name)
            .bind(&day.description)
            .bind(day.is_rest_day)
            .execute(&mut *conn)
            .await
            .with_context(|| {
                format!("failed to insert day {:?} of week {}", day.name, week.week_number)
            })?;

            // Reloaded in this order, whatever the order_index values.
            for (position, exercise) in (0_i32..).zip(&day.exercises) {
                insert_exercise(conn, day.id, position, exercise)
                    .await
                    .with_context(|| {
                        format!(
                            "failed to insert exercise {} on day {:?} of week {}",
                            exercise.exercise_id, day.name, week.week_number
                        )
                    })?;
            }
        }
    }

    Ok(())
}

async fn insert_exercise(
    conn: &mut PgConnection,
    day_id: Uuid,
    position: i32,
    exercise: &WorkoutExercise,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO workout_exercises \
             (id, day_id, position, exercise_id, order_index, target_sets, target_reps, \
              target_weight, target_duration_seconds, target_distance, rest_seconds, \
              target_rpe, superset_group, superset_rest_seconds, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(exercise.id)
    .bind(day_id)
    .bind(position)
    .bind(exercise.exercise_id)
    .bind(exercise.order_index)
    .bind(exercise.target_sets)
    .bind(exercise.target_reps)
    .bind(exercise.target_weight)
    .bind(exercise.target_duration_seconds)
    .bind(exercise.target_distance)
    .bind(exercise.rest_seconds)
    .bind(exercise.target_rpe)
    .bind(exercise.superset_group)
    .bind(exercise.superset_rest_seconds)
    .bind(&exercise.notes)
    .execute(conn)
    .await?;

    Ok(())
}

#[derive(FromRow)]
struct TemplateRow {
    id: Uuid,
    name: String,
    description: String,
    duration_weeks: i32,
    experience_level: ExperienceLevel,
    created_by: Uuid,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct WeekRow {
    id: Uuid,
    week_number: i32,
    notes: Option<String>,
}

#[derive(FromRow)]
struct DayRow {
    id: Uuid,
    week_id: Uuid,
    position: i32,
    name: String,
    description: Option<String>,
    is_rest_day: bool,
}

#[derive(FromRow)]
struct ExerciseRow {
    id: Uuid,
    day_id: Uuid,
    exercise_id: i64,
    order_index: i32,
    target_sets: i32,
    target_reps: i32,
    target_weight: Option<f64>,
    target_duration_seconds: Option<i32>,
    target_distance: Option<f64>,
    rest_seconds: Option<i32>,
    target_rpe: Option<f64>,
    superset_group: Option<i32>,
    superset_rest_seconds: Option<i32>,
    notes: Option<String>,
}

/// Load a template and its full week/day/exercise tree.
pub async fn get_template(pool: &PgPool, id: Uuid) -> Result<Option<ProgramTemplate>> {
    let Some(row) =
        sqlx::query_as::<_, TemplateRow>("SELECT * FROM program_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch program template")?
    else {
        return Ok(None);
    };

    let weeks: Vec<WeekRow> = sqlx::query_as(
        "SELECT id, week_number, notes FROM template_weeks \
         WHERE template_id = $1 \
         ORDER BY week_number ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .context("failed to fetch template weeks")?;

    let days: Vec<DayRow> = sqlx::query_as(
        "SELECT d.id, d.week_id, d.position, d.name, d.description, d.is_rest_day \
         FROM workout_days d \
         JOIN template_weeks w ON w.id = d.week_id \
         WHERE w.template_id = $1 \
         ORDER BY d.position ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .context("failed to fetch workout days")?;

    let exercises: Vec<ExerciseRow> = sqlx::query_as(
        "SELECT e.* \
         FROM workout_exercises e \
         JOIN workout_days d ON d.id = e.day_id \
         JOIN template_weeks w ON w.id = d.week_id \
         WHERE w.template_id = $1 \
         ORDER BY e.position ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .context("failed to fetch workout exercises")?;

    let mut exercises_by_day: HashMap<Uuid, Vec<WorkoutExercise>> = HashMap::new();
    for e in exercises {
        exercises_by_day
            .entry(e.day_id)
            .or_default()
            .push(WorkoutExercise {
                id: e.id,
                exercise_id: e.exercise_id,
                order_index: e.order_index,
                target_sets: e.target_sets,
                target_reps: e.target_reps,
                target_weight: e.target_weight,
                target_duration_seconds: e.target_duration_seconds,
                target_distance: e.target_distance,
                rest_seconds: e.rest_seconds,
                target_rpe: e.target_rpe,
                superset_group: e.superset_group,
                superset_rest_seconds: e.superset_rest_seconds,
                notes: e.notes,
            });
    }

    let mut days_by_week: HashMap<Uuid, Vec<WorkoutDay>> = HashMap::new();
    for d in days {
        let exercises = exercises_by_day.remove(&d.id).unwrap_or_default();
        days_by_week.entry(d.week_id).or_default().push(WorkoutDay {
            id: d.id,
            position: d.position,
            name: d.name,
            description: d.description,
            is_rest_day: d.is_rest_day,
            exercises,
        });
    }

    let weeks = weeks
        .into_iter()
        .map(|w| TemplateWeek {
            days: days_by_week.remove(&w.id).unwrap_or_default(),
            id: w.id,
            week_number: w.week_number,
            notes: w.notes,
        })
        .collect();

    Ok(Some(ProgramTemplate {
        id: row.id,
        name: row.name,
        description: row.description,
        duration_weeks: row.duration_weeks,
        experience_level: row.experience_level,
        created_by: row.created_by,
        is_active: row.is_active,
        created_at: row.created_at,
        updated_at: row.updated_at,
        weeks,
    }))
}

/// Count persisted templates.
pub async fn count_templates(pool: &PgPool) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM program_templates")
        .fetch_one(pool)
        .await
        .context("failed to count program templates")?;

    Ok(row.0)
}
