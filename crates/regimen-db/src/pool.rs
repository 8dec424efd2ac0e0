//! Connection pools, the embedded schema, and database bootstrap for
//! `regimen db-init`.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/regimen-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Tables owned by the regimen schema, parents before children.
pub const TABLES: &[&str] = &[
    "exercises",
    "program_templates",
    "template_weeks",
    "workout_days",
    "workout_exercises",
    "generation_jobs",
];

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Row count of one schema table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: i64,
}

/// What [`bootstrap`] found and did.
#[derive(Debug, Clone)]
pub struct SchemaReport {
    /// Whether the database had to be created.
    pub created: bool,
    pub applied_migrations: usize,
    pub embedded_migrations: usize,
    pub tables: Vec<TableCount>,
}

/// Create a connection pool for the configured database.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.database_url))
}

/// Single-connection pool on the server's `postgres` database, for creating
/// and dropping databases.
pub async fn maintenance_pool(config: &DbConfig) -> Result<PgPool> {
    let url = config.maintenance_url();
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&url)
        .await
        .with_context(|| format!("failed to connect to maintenance database at {url}"))
}

/// Apply every embedded migration not yet recorded in the database.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    tracing::info!(embedded = MIGRATOR.iter().count(), "schema migrated");
    Ok(())
}

/// Create the configured database unless it already exists. Returns whether
/// it was created.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let Some(name) = config.database_name() else {
        bail!("no database name in URL {}", config.database_url);
    };

    let maint = maintenance_pool(config).await?;
    let result = create_if_missing(&maint, name).await;
    maint.close().await;

    let created = result?;
    if created {
        tracing::info!(db = name, "database created");
    } else {
        tracing::debug!(db = name, "database already present");
    }
    Ok(created)
}

async fn create_if_missing(maint: &PgPool, name: &str) -> Result<bool> {
    let present: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(name)
            .fetch_one(maint)
            .await
            .context("failed to look up database")?;
    if present {
        return Ok(false);
    }

    let stmt = format!("CREATE DATABASE {}", quote_ident(name));
    maint
        .execute(stmt.as_str())
        .await
        .with_context(|| format!("failed to create database {name}"))?;
    Ok(true)
}

/// Create (if needed) and migrate the configured database, returning a pool
/// on it and a summary of the schema.
pub async fn bootstrap(config: &DbConfig) -> Result<(PgPool, SchemaReport)> {
    let created = ensure_database_exists(config).await?;
    let pool = create_pool(config).await?;

    let report = async {
        run_migrations(&pool).await?;
        let applied: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success")
                .fetch_one(&pool)
                .await
                .context("failed to read migration history")?;
        Ok::<_, anyhow::Error>(SchemaReport {
            created,
            applied_migrations: usize::try_from(applied).unwrap_or(0),
            embedded_migrations: MIGRATOR.iter().count(),
            tables: table_counts(&pool).await?,
        })
    }
    .await;

    match report {
        Ok(report) => Ok((pool, report)),
        Err(e) => {
            pool.close().await;
            Err(e)
        }
    }
}

/// Row counts for every table in [`TABLES`], in that order.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<TableCount>> {
    let rows: Vec<(i32, i64)> = sqlx::query_as(&count_query(TABLES))
        .fetch_all(pool)
        .await
        .context("failed to count schema rows")?;

    Ok(rows
        .into_iter()
        .filter_map(|(ord, rows)| {
            let table = *TABLES.get(usize::try_from(ord).ok()?)?;
            Some(TableCount { table, rows })
        })
        .collect())
}

/// One `UNION ALL` query counting each table, tagged with its index.
fn count_query(tables: &[&str]) -> String {
    let mut sql = tables
        .iter()
        .enumerate()
        .map(|(i, t)| format!("SELECT {i}::int4 AS ord, COUNT(*) AS n FROM {}", quote_ident(t)))
        .collect::<Vec<_>>()
        .join(" UNION ALL ");
    sql.push_str(" ORDER BY ord");
    sql
}

/// Quote a PostgreSQL identifier (`CREATE DATABASE` cannot take a bind
/// parameter).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
