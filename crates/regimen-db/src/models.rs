use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the job has reached a state it can never leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check whether `self -> next` is an edge of the job lifecycle:
    ///
    /// ```text
    /// pending    -> processing
    /// processing -> completed
    /// processing -> failed
    /// ```
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for JobStatus {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(JobStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`JobStatus`] string.
#[derive(Debug, Clone)]
pub struct JobStatusParseError(pub String);

impl fmt::Display for JobStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid job status: {:?}", self.0)
    }
}

impl std::error::Error for JobStatusParseError {}

// ---------------------------------------------------------------------------

/// Ordinal training experience. Used both as the athlete's level on a
/// request and as the difficulty of a catalog exercise; variants are
/// declared in ascending order so `Ord` compares by rank.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        };
        f.write_str(s)
    }
}

impl FromStr for ExperienceLevel {
    type Err = ExperienceLevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(ExperienceLevelParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ExperienceLevel`] string.
#[derive(Debug, Clone)]
pub struct ExperienceLevelParseError(pub String);

impl fmt::Display for ExperienceLevelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid experience level: {:?}", self.0)
    }
}

impl std::error::Error for ExperienceLevelParseError {}

// ---------------------------------------------------------------------------

/// Broad category of a catalog exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    Strength,
    Cardio,
    Bodyweight,
    Flexibility,
}

impl fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Strength => "strength",
            Self::Cardio => "cardio",
            Self::Bodyweight => "bodyweight",
            Self::Flexibility => "flexibility",
        };
        f.write_str(s)
    }
}

impl FromStr for ExerciseType {
    type Err = ExerciseTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strength" => Ok(Self::Strength),
            "cardio" => Ok(Self::Cardio),
            "bodyweight" => Ok(Self::Bodyweight),
            "flexibility" => Ok(Self::Flexibility),
            other => Err(ExerciseTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ExerciseType`] string.
#[derive(Debug, Clone)]
pub struct ExerciseTypeParseError(pub String);

impl fmt::Display for ExerciseTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid exercise type: {:?}", self.0)
    }
}

impl std::error::Error for ExerciseTypeParseError {}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A client's request for a generated program. Immutable once embedded in a
/// [`GenerationJob`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub program_name: String,
    #[serde(default)]
    pub description: String,
    pub duration_weeks: i32,
    pub experience_level: ExperienceLevel,
    /// One entry per training day in a week, in order.
    pub workout_days: Vec<String>,
    pub requester_id: Uuid,
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A durable generation request and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GenerationJob {
    pub id: Uuid,
    pub status: JobStatus,
    /// Serialized [`GenerateRequest`].
    pub request: serde_json::Value,
    /// Serialized [`ProgramTemplate`], set only when completed.
    pub result: Option<serde_json::Value>,
    /// Set only when failed.
    pub error_message: Option<String>,
    /// Set only when completed.
    pub template_id: Option<Uuid>,
    pub requester_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    /// Decode the embedded request payload.
    pub fn decode_request(&self) -> serde_json::Result<GenerateRequest> {
        serde_json::from_value(self.request.clone())
    }

    /// Decode the result payload, if the job completed.
    pub fn decode_result(&self) -> Option<serde_json::Result<ProgramTemplate>> {
        self.result
            .as_ref()
            .map(|value| serde_json::from_value(value.clone()))
    }
}

/// A read-only exercise definition from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
    pub movement_pattern: String,
    pub primary_muscle_group: String,
    #[serde(default)]
    pub secondary_muscle_group: Option<String>,
    pub difficulty: ExperienceLevel,
    pub exercise_type: ExerciseType,
}

// ---------------------------------------------------------------------------
// Program template aggregate
// ---------------------------------------------------------------------------

/// The persistent, validated program produced by a completed job.
///
/// Ownership is strictly hierarchical: a template owns its weeks, a week
/// owns its days, a day owns its exercises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub duration_weeks: i32,
    pub experience_level: ExperienceLevel,
    pub created_by: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub weeks: Vec<TemplateWeek>,
}

impl ProgramTemplate {
    /// Iterate over every exercise in the template, in tree order.
    pub fn exercises(&self) -> impl Iterator<Item = &WorkoutExercise> {
        self.weeks
            .iter()
            .flat_map(|w| w.days.iter())
            .flat_map(|d| d.exercises.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateWeek {
    pub id: Uuid,
    pub week_number: i32,
    pub notes: Option<String>,
    pub days: Vec<WorkoutDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutDay {
    pub id: Uuid,
    /// Zero-based position of the day within its week.
    pub position: i32,
    pub name: String,
    pub description: Option<String>,
    pub is_rest_day: bool,
    pub exercises: Vec<WorkoutExercise>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutExercise {
    pub id: Uuid,
    /// Catalog id of the exercise definition.
    pub exercise_id: i64,
    pub order_index: i32,
    pub target_sets: i32,
    pub target_reps: i32,
    pub target_weight: Option<f64>,
    pub target_duration_seconds: Option<i32>,
    pub target_distance: Option<f64>,
    pub rest_seconds: Option<i32>,
    pub target_rpe: Option<f64>,
    pub superset_group: Option<i32>,
    pub superset_rest_seconds: Option<i32>,
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
