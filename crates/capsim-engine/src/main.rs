//! CAPSIM engine binary.
//!
//! Wires together configuration, the durable store, and the simulation
//! engine, then runs one simulation to completion. SIGINT triggers the
//! graceful shutdown drain.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `capsim-config.yaml` (or `--config`)
//! 3. Connect the store (`PostgreSQL`, or in-memory with `--memory`)
//! 4. Pre-warm the static lookup tables
//! 5. Bootstrap the engine (single-active-run lock, population spawn)
//! 6. Install the SIGINT handler
//! 7. Run the loop and report the outcome

use std::path::PathBuf;
use std::sync::Arc;

use capsim_core::engine::{ActiveRunLock, SimulationEngine};
use capsim_core::SimulationConfig;
use capsim_db::{MemoryStore, PgStore, PostgresConfig, Store, TableCache};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Default configuration file path, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "capsim-config.yaml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Structured logging with env-filter control.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Configuration.
    let args: Vec<String> = std::env::args().collect();
    let config_path = arg_value(&args, "--config")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let use_memory_store = args.iter().any(|a| a == "--memory");

    let config = if config_path.exists() {
        SimulationConfig::from_file(&config_path)?
    } else {
        info!(path = %config_path.display(), "config file not found, using defaults");
        SimulationConfig::default()
    };
    info!(
        agents = config.simulation.num_agents,
        days = config.simulation.duration_days,
        seed = config.simulation.seed,
        realtime = config.simulation.realtime,
        "configuration loaded"
    );

    // 3. Store.
    let store: Arc<dyn Store> = if use_memory_store {
        info!("using the in-memory store (no durability)");
        Arc::new(MemoryStore::new())
    } else {
        let pg_config = PostgresConfig::new(&config.persistence.database_url);
        Arc::new(PgStore::connect(&pg_config).await?)
    };

    // 4. Pre-warm the static tables through the TTL cache.
    let table_cache = TableCache::new(config.persistence.cache_ttl_min);
    let tables = table_cache.load(store.as_ref()).await?;
    info!(
        affinity_entries = tables.affinity.len(),
        "static lookup tables loaded"
    );

    // 5. Bootstrap.
    let lock = ActiveRunLock::global();
    let mut engine = SimulationEngine::bootstrap(config, store, &lock).await?;
    info!(sim_id = %engine.run_id(), "engine bootstrapped");

    // 6. SIGINT triggers the graceful drain.
    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, requesting graceful shutdown");
            shutdown.trigger();
        }
    });

    // 7. Run to completion.
    match engine.run().await {
        Ok(outcome) => {
            info!(
                sim_id = %outcome.run_id,
                status = outcome.status.as_str(),
                events = outcome.events_processed,
                final_sim_time = outcome.final_sim_time,
                "simulation run finished"
            );
            let snapshot = engine.metrics().snapshot();
            info!(
                events_processed = snapshot.events_processed_total,
                queue_full = snapshot.queue_full_total,
                batch_errors = snapshot.batch_commit_errors_total,
                "final metrics"
            );
            engine.close().await;
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "simulation run failed");
            Err(err.into())
        }
    }
}

/// The value following a `--flag` argument, if present.
fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}
