//! `regimen worker` command: run the generation worker until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use regimen_core::generate::{HttpGenerationClient, ValidationPolicy};
use regimen_core::worker::{Worker, WorkerConfig};
use regimen_db::store::PgStore;

use crate::config::RegimenConfig;

/// Command-line overrides for the resolved worker settings.
#[derive(Debug, Default, Clone)]
pub struct WorkerOverrides {
    pub poll_interval_secs: Option<u64>,
    pub backoff_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub validation: Option<ValidationPolicy>,
}

impl WorkerOverrides {
    fn apply(&self, mut config: WorkerConfig) -> WorkerConfig {
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = self.backoff_secs {
            config.error_backoff = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = self.timeout_secs {
            config.generation_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(policy) = self.validation {
            config.validation = policy;
        }
        config
    }
}

/// Run the worker loop against `store` until interrupted.
pub async fn run_worker(
    store: PgStore,
    resolved: &RegimenConfig,
    overrides: &WorkerOverrides,
) -> Result<()> {
    let generation = resolved.generation_config()?;
    let client = HttpGenerationClient::new(generation)?;
    let config = overrides.apply(resolved.worker.clone());

    println!(
        "Worker running (model {}, poll every {}s, {} validation). Ctrl-C to stop.",
        resolved.model,
        config.poll_interval.as_secs(),
        config.validation,
    );

    let store = Arc::new(store);
    let worker = Worker::new(store.clone(), store, Arc::new(client), config);

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl-C; stopping worker"),
        }
        signal.cancel();
    });

    worker.run(cancel).await;
    println!("Worker stopped.");
    Ok(())
}
