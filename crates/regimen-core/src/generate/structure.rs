//! The intermediate program structure: the untrusted shape the generator is
//! asked to produce, before validation and materialization.
//!
//! Field names are camelCase on the wire. Numeric fields go through the
//! [`lenient`](super::lenient) helpers; everything else is strictly typed.

use serde::Deserialize;

use super::lenient;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramStructure {
    #[serde(default)]
    pub program_name: String,
    #[serde(default)]
    pub description: String,
    pub weeks: Vec<WeekStructure>,
}

impl ProgramStructure {
    /// Every exercise reference in the structure, in source order.
    pub fn exercises(&self) -> impl Iterator<Item = &ExerciseStructure> {
        self.weeks
            .iter()
            .flat_map(|w| w.workout_days.iter())
            .flat_map(|d| d.exercises.iter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekStructure {
    #[serde(deserialize_with = "lenient::required")]
    pub week_number: i32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub workout_days: Vec<DayStructure>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStructure {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_rest_day: bool,
    #[serde(default)]
    pub exercises: Vec<ExerciseStructure>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseStructure {
    /// Catalog id reference.
    #[serde(deserialize_with = "lenient::required")]
    pub exercise_id: i64,
    #[serde(deserialize_with = "lenient::required")]
    pub order_index: i32,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub target_sets: Option<i32>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub target_reps: Option<i32>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub target_weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub target_duration_seconds: Option<i32>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub target_distance: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub rest_seconds: Option<i32>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub target_rpe: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub superset_group_id: Option<i32>,
    #[serde(default, deserialize_with = "lenient::optional")]
    pub superset_rest_seconds: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
}
