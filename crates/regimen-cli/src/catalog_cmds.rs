//! Operator CLI handlers for `regimen catalog` subcommands.
//!
//! Implements:
//! - `regimen catalog import <file>` -- upsert exercises from a TOML file
//! - `regimen catalog list [--level]` -- list the catalog, optionally only
//!   what a given experience level would be offered

use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use regimen_core::catalog::eligible_entries;
use regimen_db::models::{CatalogEntry, ExperienceLevel};
use regimen_db::queries::catalog as catalog_db;
use regimen_db::store::{CatalogReader, PgStore};

use crate::CatalogCommands;

/// Dispatch a `CatalogCommands` variant to the appropriate handler.
pub async fn run_catalog_command(command: CatalogCommands, store: &PgStore) -> Result<()> {
    match command {
        CatalogCommands::Import { file } => cmd_import(store, &file).await,
        CatalogCommands::List { level } => cmd_list(store, level).await,
    }
}

// -----------------------------------------------------------------------
// File format
// -----------------------------------------------------------------------

/// A catalog file: a list of `[[exercises]]` tables.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    exercises: Vec<CatalogEntry>,
}

/// Parse and check a catalog TOML document.
pub fn parse_catalog_toml(content: &str) -> Result<Vec<CatalogEntry>> {
    let file: CatalogFile = toml::from_str(content).context("invalid catalog TOML")?;

    if file.exercises.is_empty() {
        bail!("catalog file contains no [[exercises]] entries");
    }

    let mut seen = HashSet::new();
    for entry in &file.exercises {
        if entry.id <= 0 {
            bail!("exercise {:?} has non-positive id {}", entry.name, entry.id);
        }
        if entry.name.trim().is_empty() {
            bail!("exercise {} has a blank name", entry.id);
        }
        if !seen.insert(entry.id) {
            bail!("exercise id {} appears more than once", entry.id);
        }
    }

    Ok(file.exercises)
}

// -----------------------------------------------------------------------
// regimen catalog import <file>
// -----------------------------------------------------------------------

async fn cmd_import(store: &PgStore, file_path: &str) -> Result<()> {
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("failed to read catalog file: {file_path}"))?;
    let entries = parse_catalog_toml(&content)
        .with_context(|| format!("failed to parse catalog file: {file_path}"))?;

    for entry in &entries {
        catalog_db::upsert_entry(store.pool(), entry).await?;
    }
    tracing::info!(count = entries.len(), file = file_path, "catalog imported");

    println!("Imported {} exercise(s) from {file_path}.", entries.len());
    Ok(())
}

// -----------------------------------------------------------------------
// regimen catalog list [--level]
// -----------------------------------------------------------------------

async fn cmd_list(reader: &dyn CatalogReader, level: Option<ExperienceLevel>) -> Result<()> {
    let all = reader.list_all().await?;
    let entries = select_entries(&all, level);

    if entries.is_empty() {
        match level {
            Some(level) => println!("No exercises are eligible for level {level}."),
            None => println!(
                "Catalog is empty. Use `regimen catalog import <file>` to load one."
            ),
        }
        return Ok(());
    }

    for line in render_table(&entries) {
        println!("{line}");
    }
    Ok(())
}

/// The whole catalog, or only the entries offered at `level`.
fn select_entries(all: &[CatalogEntry], level: Option<ExperienceLevel>) -> Vec<CatalogEntry> {
    match level {
        Some(level) => eligible_entries(all, level),
        None => all.to_vec(),
    }
}

fn render_table(entries: &[CatalogEntry]) -> Vec<String> {
    let id_w = entries
        .iter()
        .map(|e| e.id.to_string().len())
        .max()
        .unwrap_or(2)
        .max(2);
    let name_w = entries.iter().map(|e| e.name.len()).max().unwrap_or(4).max(4);
    let type_w = 11;
    let level_w = 12;

    let mut lines = Vec::with_capacity(entries.len() + 1);
    lines.push(format!(
        "{:>id_w$}  {:<name_w$}  {:<type_w$}  {:<level_w$}  MUSCLES",
        "ID", "NAME", "TYPE", "DIFFICULTY",
    ));
    for e in entries {
        let muscles = match &e.secondary_muscle_group {
            Some(secondary) => format!("{}, {secondary}", e.primary_muscle_group),
            None => e.primary_muscle_group.clone(),
        };
        lines.push(format!(
            "{:>id_w$}  {:<name_w$}  {:<type_w$}  {:<level_w$}  {muscles}",
            e.id,
            e.name,
            e.exercise_type.to_string(),
            e.difficulty.to_string(),
        ));
    }
    lines
}
