//! Aggregate builder: a validated [`ProgramStructure`] plus the original
//! request becomes a fresh [`ProgramTemplate`] graph.
//!
//! Allocates every id and timestamp; performs no I/O.

use std::collections::HashSet;

use chrono::Utc;
use regimen_db::models::{
    GenerateRequest, ProgramTemplate, TemplateWeek, WorkoutDay, WorkoutExercise,
};
use thiserror::Error;
use uuid::Uuid;

use super::structure::{DayStructure, ExerciseStructure, ProgramStructure};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("generated program repeats week number {0}")]
    DuplicateWeek(i32),

    #[error("generated week number {week} is outside 1..={duration_weeks}")]
    WeekOutOfRange { week: i32, duration_weeks: i32 },

    #[error("negative {field} ({value}) for exercise {exercise_id} in week {week}")]
    NegativeTarget {
        week: i32,
        exercise_id: i64,
        field: &'static str,
        value: i32,
    },
}

/// Build a new template from `structure` for `request`.
///
/// Weeks are ordered by week number, days keep their source order (the
/// index becomes the position), and exercises are ordered by order index
/// with ties kept in source order. Missing sets/reps become 0.
pub fn build_template(
    structure: &ProgramStructure,
    request: &GenerateRequest,
) -> Result<ProgramTemplate, BuildError> {
    let mut seen = HashSet::new();
    for week in &structure.weeks {
        if !(1..=request.duration_weeks).contains(&week.week_number) {
            return Err(BuildError::WeekOutOfRange {
                week: week.week_number,
                duration_weeks: request.duration_weeks,
            });
        }
        if !seen.insert(week.week_number) {
            return Err(BuildError::DuplicateWeek(week.week_number));
        }
    }

    let mut weeks: Vec<_> = structure.weeks.iter().collect();
    weeks.sort_by_key(|w| w.week_number);

    let weeks = weeks
        .into_iter()
        .map(|week| {
            let days = week
                .workout_days
                .iter()
                .enumerate()
                .map(|(position, day)| build_day(week.week_number, position, day))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TemplateWeek {
                id: Uuid::new_v4(),
                week_number: week.week_number,
                notes: non_blank(week.notes.as_deref()),
                days,
            })
        })
        .collect::<Result<Vec<_>, BuildError>>()?;

    let now = Utc::now();
    Ok(ProgramTemplate {
        id: Uuid::new_v4(),
        name: non_blank(Some(structure.program_name.as_str()))
            .unwrap_or_else(|| request.program_name.clone()),
        description: non_blank(Some(structure.description.as_str()))
            .unwrap_or_else(|| request.description.clone()),
        duration_weeks: request.duration_weeks,
        experience_level: request.experience_level,
        created_by: request.requester_id,
        is_active: true,
        created_at: now,
        updated_at: now,
        weeks,
    })
}

fn build_day(week: i32, position: usize, day: &DayStructure) -> Result<WorkoutDay, BuildError> {
    let mut exercises: Vec<&ExerciseStructure> = day.exercises.iter().collect();
    exercises.sort_by_key(|e| e.order_index);

    let exercises = exercises
        .into_iter()
        .map(|e| build_exercise(week, e))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WorkoutDay {
        id: Uuid::new_v4(),
        position: i32::try_from(position).unwrap_or(i32::MAX),
        name: day.name.clone(),
        description: non_blank(day.description.as_deref()),
        is_rest_day: day.is_rest_day,
        exercises,
    })
}

fn build_exercise(week: i32, e: &ExerciseStructure) -> Result<WorkoutExercise, BuildError> {
    let target = |field: &'static str, value: Option<i32>| -> Result<i32, BuildError> {
        let value = value.unwrap_or(0);
        if value < 0 {
            return Err(BuildError::NegativeTarget {
                week,
                exercise_id: e.exercise_id,
                field,
                value,
            });
        }
        Ok(value)
    };

    Ok(WorkoutExercise {
        id: Uuid::new_v4(),
        exercise_id: e.exercise_id,
        order_index: e.order_index,
        target_sets: target("sets", e.target_sets)?,
        target_reps: target("reps", e.target_reps)?,
        target_weight: e.target_weight,
        target_duration_seconds: e.target_duration_seconds,
        target_distance: e.target_distance,
        rest_seconds: e.rest_seconds,
        target_rpe: e.target_rpe,
        superset_group: e.superset_group_id,
        superset_rest_seconds: e.superset_rest_seconds,
        notes: non_blank(e.notes.as_deref()),
    })
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}
