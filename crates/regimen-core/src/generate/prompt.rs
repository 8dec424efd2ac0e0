//! Prompt construction for program generation.
//!
//! Pure logic: the caller supplies the request and the already-filtered
//! catalog subset (see [`crate::catalog::eligible_entries`]).

use regimen_db::models::{CatalogEntry, ExperienceLevel, GenerateRequest};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("no catalog exercises are eligible for experience level {0}")]
    EmptyCatalog(ExperienceLevel),
}

/// JSON shape reference included in every prompt.
const SCHEMA_REFERENCE: &str = r#"## Output Schema

```json
{
  "programName": "string",
  "description": "string",
  "weeks": [
    {
      "weekNumber": 1,
      "notes": "string or null",
      "workoutDays": [
        {
          "name": "string",
          "description": "string or null",
          "isRestDay": false,
          "exercises": [
            {
              "exerciseId": 1,
              "orderIndex": 0,
              "targetSets": 3,
              "targetReps": 10,
              "targetWeight": null,
              "targetDurationSeconds": null,
              "targetDistance": null,
              "restSeconds": 90,
              "targetRpe": 7.5,
              "supersetGroupId": null,
              "supersetRestSeconds": null,
              "notes": "string or null"
            }
          ]
        }
      ]
    }
  ]
}
```
"#;

/// Rules the generated program must follow.
const RULES: &str = r#"## Rules

1. Use ONLY the exercise ids listed under "Available Exercises". Any other id invalidates the whole program.
2. Produce exactly one entry in `weeks` per week, numbered from 1 with no gaps or repeats.
3. Each week lists the workout days named below, in the order given.
4. A rest day has `"isRestDay": true` and an empty `exercises` array.
5. Every exercise on a training day has non-null integer `targetSets` and `targetReps`.
6. `orderIndex` starts at 0 within each day and increases by one per exercise.
7. Exercises sharing a `supersetGroupId` are performed back to back.
"#;

/// Build the generation prompt for `request`, offering only `catalog`.
pub fn build_prompt(
    request: &GenerateRequest,
    catalog: &[CatalogEntry],
) -> Result<String, PromptError> {
    if catalog.is_empty() {
        return Err(PromptError::EmptyCatalog(request.experience_level));
    }

    let mut prompt = String::with_capacity(4096);

    prompt.push_str("# Training Program Designer\n\n");
    prompt.push_str(
        "You design multi-week strength and conditioning programs. \
         Produce a complete program for the athlete described below.\n\n",
    );

    prompt.push_str("## Request\n\n");
    prompt.push_str(&format!("- **Program name:** {}\n", request.program_name));
    if !request.description.trim().is_empty() {
        prompt.push_str(&format!("- **Goals:** {}\n", request.description.trim()));
    }
    prompt.push_str(&format!("- **Experience level:** {}\n", request.experience_level));
    prompt.push_str(&format!("- **Duration:** {} weeks\n", request.duration_weeks));
    prompt.push_str(&format!(
        "- **Workout days per week ({}):** {}\n",
        request.workout_days.len(),
        request.workout_days.join(", ")
    ));
    prompt.push('\n');

    prompt.push_str("## Available Exercises\n\n");
    for entry in catalog {
        let muscles = match &entry.secondary_muscle_group {
            Some(secondary) => format!("{}, {}", entry.primary_muscle_group, secondary),
            None => entry.primary_muscle_group.clone(),
        };
        prompt.push_str(&format!(
            "- id {}: {} (pattern: {}; muscles: {}; difficulty: {})\n",
            entry.id, entry.name, entry.movement_pattern, muscles, entry.difficulty
        ));
    }
    prompt.push('\n');

    prompt.push_str(SCHEMA_REFERENCE);
    prompt.push('\n');
    prompt.push_str(RULES);
    prompt.push('\n');

    prompt.push_str(
        "Respond with the raw JSON object only. \
         Do not wrap it in Markdown and do not add commentary.\n",
    );

    Ok(prompt)
}
