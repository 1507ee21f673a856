//! The durable store contract.
//!
//! The simulation engine talks to persistence exclusively through
//! [`Store`]. Two implementations exist: [`PgStore`] for production and
//! [`MemoryStore`] for tests and fast analysis runs. Every mutating
//! method is idempotent on the natural key of its rows, so a batch that
//! partially failed can be re-delivered wholesale.
//!
//! [`PgStore`]: crate::postgres::PgStore
//! [`MemoryStore`]: crate::memory::MemoryStore

use std::time::{Duration, Instant};

use async_trait::async_trait;
use capsim_types::{
    AgentState, AttributeChange, DailyTrendSummary, EventAudit, RunId, RunStatus, SimulationRun,
    StaticTables, Trend, TrendId,
};
use tokio::sync::Mutex;

use crate::error::DbError;

/// Durable storage operations used by the engine and the repository.
///
/// Object-safe so the engine can hold an `Arc<dyn Store>` and tests can
/// substitute the in-memory implementation.
#[async_trait]
pub trait Store: Send + Sync {
    /// Runs whose status is non-terminal. Bootstrap refuses to start
    /// unless this is empty.
    async fn get_active_runs(&self) -> Result<Vec<SimulationRun>, DbError>;

    /// Insert a new run row. Idempotent on the run id.
    async fn create_run(&self, run: &SimulationRun) -> Result<(), DbError>;

    /// Update a run's lifecycle status.
    async fn update_run_status(&self, id: RunId, status: RunStatus) -> Result<(), DbError>;

    /// Load the static lookup tables, falling back to the built-in
    /// values when the store holds none.
    async fn load_static_tables(&self) -> Result<StaticTables, DbError>;

    /// Upsert a batch of agent states, keyed by agent id.
    async fn persist_agents(&self, agents: &[AgentState]) -> Result<(), DbError>;

    /// Upsert a batch of trends, keyed by trend id.
    async fn persist_trends(&self, trends: &[Trend]) -> Result<(), DbError>;

    /// Append a batch of event audit rows, keyed by event id.
    async fn persist_events(&self, events: &[EventAudit]) -> Result<(), DbError>;

    /// Append a batch of attribute-history rows, keyed by
    /// `(agent_id, attribute, sim_minute)`.
    async fn persist_history(&self, changes: &[AttributeChange]) -> Result<(), DbError>;

    /// Upsert a batch of daily trend summaries, keyed by
    /// `(simulation_id, topic, day)`.
    async fn persist_daily_summaries(
        &self,
        summaries: &[DailyTrendSummary],
    ) -> Result<(), DbError>;

    /// Mark a trend archived. Its final state stays persisted.
    async fn archive_trend(&self, trend_id: TrendId) -> Result<(), DbError>;
}

/// TTL cache in front of [`Store::load_static_tables`].
///
/// The tables are read-only after boot, but long-lived processes that
/// bootstrap several runs re-read them; the TTL bounds staleness.
pub struct TableCache {
    ttl: Duration,
    cached: Mutex<Option<(Instant, StaticTables)>>,
}

impl TableCache {
    /// Create a cache with the given TTL in minutes.
    pub const fn new(ttl_min: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_min * 60),
            cached: Mutex::const_new(None),
        }
    }

    /// Load through the cache.
    ///
    /// # Errors
    ///
    /// Propagates the store error on a cache miss.
    pub async fn load(&self, store: &dyn Store) -> Result<StaticTables, DbError> {
        let mut guard = self.cached.lock().await;
        if let Some((loaded_at, tables)) = guard.as_ref() {
            if loaded_at.elapsed() < self.ttl {
                return Ok(tables.clone());
            }
        }
        let tables = store.load_static_tables().await?;
        *guard = Some((Instant::now(), tables.clone()));
        Ok(tables)
    }

    /// Drop the cached entry.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
