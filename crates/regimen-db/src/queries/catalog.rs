//! Database query functions for the `exercises` catalog table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::CatalogEntry;

/// List every catalog entry, ordered by id.
pub async fn list_all(pool: &PgPool) -> Result<Vec<CatalogEntry>> {
    let entries = sqlx::query_as::<_, CatalogEntry>(
        "SELECT id, name, movement_pattern, primary_muscle_group, secondary_muscle_group, \
                difficulty, exercise_type \
         FROM exercises \
         ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list exercise catalog")?;

    Ok(entries)
}

/// Insert or replace a catalog entry by id.
///
/// Catalog ownership sits outside this system; this exists so a deployment
/// can be seeded from a file.
pub async fn upsert_entry(pool: &PgPool, entry: &CatalogEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO exercises \
             (id, name, movement_pattern, primary_muscle_group, secondary_muscle_group, \
              difficulty, exercise_type) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (id) DO UPDATE SET \
             name = EXCLUDED.name, \
             movement_pattern = EXCLUDED.movement_pattern, \
             primary_muscle_group = EXCLUDED.primary_muscle_group, \
             secondary_muscle_group = EXCLUDED.secondary_muscle_group, \
             difficulty = EXCLUDED.difficulty, \
             exercise_type = EXCLUDED.exercise_type",
    )
    .bind(entry.id)
    .bind(&entry.name)
    .bind(&entry.movement_pattern)
    .bind(&entry.primary_muscle_group)
    .bind(&entry.secondary_muscle_group)
    .bind(entry.difficulty)
    .bind(entry.exercise_type)
    .execute(pool)
    .await
    .with_context(|| format!("failed to upsert catalog entry {} ({:?})", entry.id, entry.name))?;

    Ok(())
}
