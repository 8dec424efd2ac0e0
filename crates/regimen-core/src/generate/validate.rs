//! Structure validation: referential integrity against the offered catalog
//! subset, plus the day-shape rules under [`ValidationPolicy::Strict`].
//!
//! Validation is all-or-nothing. A structure either passes as a whole or the
//! error describes every violation found.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use regimen_db::models::CatalogEntry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::structure::ProgramStructure;

/// How much of the generated structure is checked beyond catalog ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Catalog ids, rest days without exercises, and sets/reps present on
    /// every training-day exercise.
    #[default]
    Strict,
    /// Catalog ids only.
    CatalogOnly,
}

impl fmt::Display for ValidationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Strict => "strict",
            Self::CatalogOnly => "catalog_only",
        };
        f.write_str(s)
    }
}

impl FromStr for ValidationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Self::Strict),
            "catalog_only" | "catalog-only" => Ok(Self::CatalogOnly),
            other => Err(format!(
                "invalid validation policy {other:?} (expected strict or catalog_only)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("generated program references exercise ids outside the offered catalog: {}", join_ids(.0))]
    UnknownExercises(Vec<i64>),

    #[error("generated program breaks day rules: {}", .0.join("; "))]
    DayRules(Vec<String>),
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate `structure` against the catalog subset that was `offered`.
pub fn validate_structure(
    structure: &ProgramStructure,
    offered: &[CatalogEntry],
    policy: ValidationPolicy,
) -> Result<(), ValidationError> {
    let offered: HashSet<i64> = offered.iter().map(|e| e.id).collect();

    let referenced: BTreeSet<i64> = structure.exercises().map(|e| e.exercise_id).collect();
    let unknown: Vec<i64> = referenced
        .into_iter()
        .filter(|id| !offered.contains(id))
        .collect();
    if !unknown.is_empty() {
        return Err(ValidationError::UnknownExercises(unknown));
    }

    if policy == ValidationPolicy::Strict {
        let violations = day_rule_violations(structure);
        if !violations.is_empty() {
            return Err(ValidationError::DayRules(violations));
        }
    }

    Ok(())
}

fn day_rule_violations(structure: &ProgramStructure) -> Vec<String> {
    let mut violations = Vec::new();
    for week in &structure.weeks {
        for day in &week.workout_days {
            if day.is_rest_day {
                if !day.exercises.is_empty() {
                    violations.push(format!(
                        "week {} day {:?} is a rest day with {} exercise(s)",
                        week.week_number,
                        day.name,
                        day.exercises.len()
                    ));
                }
                continue;
            }
            for ex in &day.exercises {
                let missing: Vec<&str> = [
                    ("targetSets", ex.target_sets.is_none()),
                    ("targetReps", ex.target_reps.is_none()),
                ]
                .into_iter()
                .filter_map(|(field, absent)| absent.then_some(field))
                .collect();
                if !missing.is_empty() {
                    violations.push(format!(
                        "week {} day {:?} exercise {} is missing {}",
                        week.week_number,
                        day.name,
                        ex.exercise_id,
                        missing.join(" and ")
                    ));
                }
            }
        }
    }
    violations
}
