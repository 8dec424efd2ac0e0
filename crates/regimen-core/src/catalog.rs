//! Selection of the catalog subset offered to the generator.

use regimen_db::models::{CatalogEntry, ExerciseType, ExperienceLevel};

/// Entries a program for `level` may reference: difficulty at or below the
/// requested level, flexibility work excluded. Catalog order is preserved.
pub fn eligible_entries(entries: &[CatalogEntry], level: ExperienceLevel) -> Vec<CatalogEntry> {
    entries
        .iter()
        .filter(|e| e.difficulty <= level && e.exercise_type != ExerciseType::Flexibility)
        .cloned()
        .collect()
}
