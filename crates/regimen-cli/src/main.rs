mod catalog_cmds;
mod config;
mod status_cmd;
mod submit_cmd;
mod worker_cmd;

use clap::{Parser, Subcommand};

use regimen_core::generate::ValidationPolicy;
use regimen_db::models::ExperienceLevel;
use regimen_db::pool;
use regimen_db::store::PgStore;

use config::RegimenConfig;
use worker_cmd::WorkerOverrides;

#[derive(Parser)]
#[command(name = "regimen", about = "AI training-program generation with a durable job queue")]
struct Cli {
    /// Database URL (overrides REGIMEN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a regimen config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/regimen")]
        db_url: String,
        /// API key for the generation service
        #[arg(long)]
        api_key: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the regimen database (requires config file or env vars)
    DbInit,
    /// Exercise catalog management
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
    /// Queue a program generation request
    Submit {
        /// Path to a request TOML file
        file: String,
        /// Requester UUID (overrides requester_id in the file)
        #[arg(long)]
        requester: Option<String>,
        /// Poll until the job completes or fails
        #[arg(long)]
        wait: bool,
    },
    /// Show a job's outcome, or list recent jobs
    Status {
        /// Job ID (omit to list recent jobs)
        job_id: Option<String>,
        /// How many jobs to list
        #[arg(long, default_value_t = 20)]
        limit: i64,
        /// Print the job report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the generation worker until Ctrl-C
    Worker {
        /// Seconds to wait before re-polling an empty queue
        #[arg(long)]
        poll_interval: Option<u64>,
        /// Seconds to back off after a database error
        #[arg(long)]
        backoff: Option<u64>,
        /// Seconds allowed for one generation call
        #[arg(long)]
        timeout: Option<u64>,
        /// Structure validation policy (strict or catalog_only)
        #[arg(long)]
        validation: Option<ValidationPolicy>,
    },
}

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// Insert or replace catalog exercises from a TOML file
    Import {
        /// Path to a catalog TOML file with [[exercises]] entries
        file: String,
    },
    /// List catalog exercises
    List {
        /// Only show exercises offered at this experience level
        #[arg(long)]
        level: Option<ExperienceLevel>,
    },
}

/// Execute the `regimen init` command: write config file.
fn cmd_init(db_url: &str, api_key: Option<&str>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        generation: config::GenerationSection {
            api_key: api_key.map(str::to_string),
            ..Default::default()
        },
        worker: config::WorkerSection::default(),
    };

    config::save_config_to(&path, &cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    match api_key {
        Some(_) => println!("  generation.api_key = (set)"),
        None => println!(
            "  generation.api_key is unset; export {} before running the worker",
            config::API_KEY_ENV
        ),
    }
    println!();
    println!("Next: run `regimen db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `regimen db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = RegimenConfig::resolve(cli_db_url)?;

    println!("Initializing regimen database...");

    let (db_pool, report) = pool::bootstrap(&resolved.db_config).await?;

    if report.created {
        println!("Created database {}.", resolved.db_config.database_url);
    }
    println!(
        "Migrations: {} of {} applied.",
        report.applied_migrations, report.embedded_migrations
    );
    println!("Tables:");
    for count in &report.tables {
        println!("  {}: {} rows", count.table, count.rows);
    }

    db_pool.close().await;

    println!("regimen db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            api_key,
            force,
        } => {
            cmd_init(&db_url, api_key.as_deref(), force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Catalog { command } => {
            let resolved = RegimenConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let store = PgStore::new(db_pool.clone());
            let result = catalog_cmds::run_catalog_command(command, &store).await;
            db_pool.close().await;
            result?;
        }
        Commands::Submit {
            file,
            requester,
            wait,
        } => {
            let resolved = RegimenConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let store = PgStore::new(db_pool.clone());
            let result =
                submit_cmd::run_submit(&store, &file, requester.as_deref(), wait).await;
            db_pool.close().await;
            result?;
        }
        Commands::Status {
            job_id,
            limit,
            json,
        } => {
            let resolved = RegimenConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let store = PgStore::new(db_pool.clone());
            let result = status_cmd::run_status(&store, job_id.as_deref(), limit, json).await;
            db_pool.close().await;
            result?;
        }
        Commands::Worker {
            poll_interval,
            backoff,
            timeout,
            validation,
        } => {
            let resolved = RegimenConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let overrides = WorkerOverrides {
                poll_interval_secs: poll_interval,
                backoff_secs: backoff,
                timeout_secs: timeout,
                validation,
            };
            let result =
                worker_cmd::run_worker(PgStore::new(db_pool.clone()), &resolved, &overrides)
                    .await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
