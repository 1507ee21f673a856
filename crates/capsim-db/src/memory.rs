//! In-memory [`Store`] implementation.
//!
//! Used by tests and fast analysis runs that do not need durability.
//! Mirrors the idempotence semantics of the `PostgreSQL` store: every
//! collection is keyed by the row's natural key, so re-delivering a
//! batch never duplicates data. Failure injection lets repository tests
//! exercise the retry and drop paths.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use capsim_types::{
    AgentId, AgentState, AttributeChange, AttributeName, DailyTrendSummary, EventAudit, EventId,
    RunId, RunStatus, SimulationRun, StaticTables, Trend, TrendId, TrendTopic,
};

use crate::error::DbError;
use crate::store::Store;

/// Natural key of an attribute-history row.
type HistoryKey = (AgentId, AttributeName, u64);

/// Natural key of a daily-summary row.
type SummaryKey = (RunId, TrendTopic, u32);

#[derive(Debug, Default)]
struct Inner {
    runs: BTreeMap<RunId, SimulationRun>,
    agents: BTreeMap<AgentId, AgentState>,
    trends: BTreeMap<TrendId, Trend>,
    events: BTreeMap<EventId, EventAudit>,
    history: BTreeMap<HistoryKey, AttributeChange>,
    summaries: BTreeMap<SummaryKey, DailyTrendSummary>,
    archived: BTreeSet<TrendId>,
}

/// In-memory store with failure injection.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    tables: StaticTables,
    fail_remaining: AtomicU32,
    commit_calls: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store serving the built-in static tables.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            tables: StaticTables::builtin(),
            fail_remaining: AtomicU32::new(0),
            commit_calls: AtomicU64::new(0),
        }
    }

    /// Make the next `n` mutating calls fail with
    /// [`DbError::Unavailable`]. Pass `u32::MAX` for a persistently
    /// failing store.
    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Number of successful mutating calls so far.
    pub fn commit_calls(&self) -> u64 {
        self.commit_calls.load(Ordering::SeqCst)
    }

    /// Pre-seed a run row (test setup helper).
    pub fn seed_run(&self, run: SimulationRun) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.runs.insert(run.id, run);
        }
    }

    /// Current status of a run, if present.
    pub fn run_status(&self, id: RunId) -> Option<RunStatus> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.runs.get(&id).map(|run| run.status))
    }

    /// Number of persisted agents.
    pub fn agent_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.agents.len()).unwrap_or(0)
    }

    /// Number of persisted trends.
    pub fn trend_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.trends.len()).unwrap_or(0)
    }

    /// Number of audited events.
    pub fn event_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.events.len()).unwrap_or(0)
    }

    /// All audited event kind names in insertion-key order.
    pub fn event_kinds(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.events.values().map(|e| e.kind.clone()).collect())
            .unwrap_or_default()
    }

    /// History rows for one agent, ordered by natural key.
    pub fn history_for(&self, agent_id: AgentId) -> Vec<AttributeChange> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .history
                    .values()
                    .filter(|change| change.agent_id == agent_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether a trend has been archived.
    pub fn is_archived(&self, trend_id: TrendId) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.archived.contains(&trend_id))
            .unwrap_or(false)
    }

    /// Persisted daily summaries, ordered by natural key.
    pub fn daily_summaries(&self) -> Vec<DailyTrendSummary> {
        self.inner
            .lock()
            .map(|inner| inner.summaries.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of one persisted agent.
    pub fn agent(&self, id: AgentId) -> Option<AgentState> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.agents.get(&id).cloned())
    }

    /// Snapshot of one persisted trend.
    pub fn trend(&self, id: TrendId) -> Option<Trend> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.trends.get(&id).cloned())
    }

    fn check_available(&self) -> Result<(), DbError> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            // A persistently failing store never decrements.
            if remaining != u32::MAX {
                self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(DbError::Unavailable(String::from(
                "injected failure (MemoryStore)",
            )));
        }
        Ok(())
    }

    fn record_commit(&self) {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_active_runs(&self) -> Result<Vec<SimulationRun>, DbError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| DbError::Unavailable(String::from("poisoned lock")))?;
        Ok(inner
            .runs
            .values()
            .filter(|run| !run.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn create_run(&self, run: &SimulationRun) -> Result<(), DbError> {
        self.check_available()?;
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| DbError::Unavailable(String::from("poisoned lock")))?;
        inner.runs.insert(run.id, run.clone());
        drop(inner);
        self.record_commit();
        Ok(())
    }

    async fn update_run_status(&self, id: RunId, status: RunStatus) -> Result<(), DbError> {
        self.check_available()?;
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| DbError::Unavailable(String::from("poisoned lock")))?;
        if let Some(run) = inner.runs.get_mut(&id) {
            run.status = status;
        }
        drop(inner);
        self.record_commit();
        Ok(())
    }

    async fn load_static_tables(&self) -> Result<StaticTables, DbError> {
        self.check_available()?;
        Ok(self.tables.clone())
    }

    async fn persist_agents(&self, agents: &[AgentState]) -> Result<(), DbError> {
        self.check_available()?;
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| DbError::Unavailable(String::from("poisoned lock")))?;
        for agent in agents {
            inner.agents.insert(agent.id, agent.clone());
        }
        drop(inner);
        self.record_commit();
        Ok(())
    }

    async fn persist_trends(&self, trends: &[Trend]) -> Result<(), DbError> {
        self.check_available()?;
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| DbError::Unavailable(String::from("poisoned lock")))?;
        for trend in trends {
            inner.trends.insert(trend.id, trend.clone());
        }
        drop(inner);
        self.record_commit();
        Ok(())
    }

    async fn persist_events(&self, events: &[EventAudit]) -> Result<(), DbError> {
        self.check_available()?;
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| DbError::Unavailable(String::from("poisoned lock")))?;
        for event in events {
            // Keyed by event id: re-delivery cannot duplicate.
            inner.events.insert(event.event_id, event.clone());
        }
        drop(inner);
        self.record_commit();
        Ok(())
    }

    async fn persist_history(&self, changes: &[AttributeChange]) -> Result<(), DbError> {
        self.check_available()?;
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| DbError::Unavailable(String::from("poisoned lock")))?;
        for change in changes {
            let key = (change.agent_id, change.attribute, change.sim_minute.to_bits());
            inner.history.insert(key, change.clone());
        }
        drop(inner);
        self.record_commit();
        Ok(())
    }

    async fn persist_daily_summaries(
        &self,
        summaries: &[DailyTrendSummary],
    ) -> Result<(), DbError> {
        self.check_available()?;
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| DbError::Unavailable(String::from("poisoned lock")))?;
        for summary in summaries {
            let key = (summary.simulation_id, summary.topic, summary.day);
            inner.summaries.insert(key, summary.clone());
        }
        drop(inner);
        self.record_commit();
        Ok(())
    }

    async fn archive_trend(&self, trend_id: TrendId) -> Result<(), DbError> {
        self.check_available()?;
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| DbError::Unavailable(String::from("poisoned lock")))?;
        inner.archived.insert(trend_id);
        drop(inner);
        self.record_commit();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use capsim_types::ChangeReason;
    use chrono::Utc;

    use super::*;

    fn make_run(status: RunStatus) -> SimulationRun {
        SimulationRun {
            id: RunId::new(),
            status,
            started_at: Utc::now(),
            horizon_min: 1440.0,
            num_agents: 10,
            seed: 42,
            configuration: serde_json::Value::Null,
        }
    }

    fn make_change(agent_id: AgentId, sim_minute: f64) -> AttributeChange {
        AttributeChange {
            agent_id,
            attribute: AttributeName::EnergyLevel,
            old_value: 2.0,
            new_value: 2.5,
            delta: 0.5,
            sim_minute,
            reason: ChangeReason::EnergyRecovery,
            source_trend_id: None,
        }
    }

    #[tokio::test]
    async fn active_runs_excludes_terminal() {
        let store = MemoryStore::new();
        store.create_run(&make_run(RunStatus::Running)).await.unwrap();
        store.create_run(&make_run(RunStatus::Completed)).await.unwrap();
        store.create_run(&make_run(RunStatus::Failed)).await.unwrap();

        let active = store.get_active_runs().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, RunStatus::Running);
    }

    #[tokio::test]
    async fn history_redelivery_is_idempotent() {
        let store = MemoryStore::new();
        let agent_id = AgentId::new();
        let batch = vec![make_change(agent_id, 10.0), make_change(agent_id, 20.0)];

        store.persist_history(&batch).await.unwrap();
        // Re-deliver the same batch, as the repository does after a
        // partial failure.
        store.persist_history(&batch).await.unwrap();

        assert_eq!(store.history_for(agent_id).len(), 2);
    }

    #[tokio::test]
    async fn failure_injection_counts_down() {
        let store = MemoryStore::new();
        store.fail_next(2);

        assert!(store.persist_agents(&[]).await.is_err());
        assert!(store.persist_agents(&[]).await.is_err());
        assert!(store.persist_agents(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn persistent_failure_never_recovers() {
        let store = MemoryStore::new();
        store.fail_next(u32::MAX);
        for _ in 0..10 {
            assert!(store.persist_trends(&[]).await.is_err());
        }
    }

    #[tokio::test]
    async fn update_run_status_transitions() {
        let store = MemoryStore::new();
        let run = make_run(RunStatus::Initializing);
        let id = run.id;
        store.create_run(&run).await.unwrap();

        store.update_run_status(id, RunStatus::Running).await.unwrap();
        assert_eq!(store.run_status(id), Some(RunStatus::Running));

        store
            .update_run_status(id, RunStatus::Completed)
            .await
            .unwrap();
        assert!(store.get_active_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn static_tables_are_builtin() {
        let store = MemoryStore::new();
        let tables = store.load_static_tables().await.unwrap();
        assert_eq!(tables, StaticTables::builtin());
    }
}
