//! Batched, retrying repository in front of a [`Store`].
//!
//! The simulation loop submits writes and forgets them; a background
//! flusher task owns the buffer and commits it when the buffered count
//! reaches the batch size, when the commit interval elapses (one
//! simulation minute of equivalent real time), or on an explicit
//! [`flush`]. Commit failures retry on the configured back-off
//! schedule; a batch that exhausts its retries is dropped with a
//! CRITICAL log and a counter increment so a persistently failing
//! store can never deadlock the simulation.
//!
//! [`flush`]: Repository::flush

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use capsim_types::{
    AgentState, AttributeChange, DailyTrendSummary, EventAudit, Trend, TrendId,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::store::Store;

/// One buffered mutation.
#[derive(Debug, Clone)]
pub enum BufferedWrite {
    /// Upsert an agent's full state.
    Agent(AgentState),
    /// Upsert a trend.
    Trend(Trend),
    /// Append an event audit row.
    Event(EventAudit),
    /// Append an attribute-history row.
    History(AttributeChange),
    /// Upsert a daily trend summary.
    Summary(DailyTrendSummary),
    /// Mark a trend archived.
    ArchiveTrend(TrendId),
}

enum Command {
    Write(BufferedWrite),
    Flush(oneshot::Sender<()>),
}

/// Tuning for the repository's flusher task.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Buffered-write count that triggers a commit.
    pub batch_size: usize,
    /// Wall-clock interval that triggers a commit of a non-empty buffer.
    pub commit_interval: Duration,
    /// Back-off schedule between retries of a failed commit.
    pub retry_backoffs: Vec<Duration>,
    /// Capacity of the submission channel; submitting past this
    /// applies backpressure to the loop.
    pub channel_capacity: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            commit_interval: Duration::from_secs(1),
            retry_backoffs: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            channel_capacity: 1024,
        }
    }
}

impl RepositoryConfig {
    /// Derive the commit interval from the simulation speed factor:
    /// one simulation minute of equivalent real time, floored at 10ms.
    #[must_use]
    pub fn with_speed_factor(mut self, speed_factor: f64) -> Self {
        let secs = (60.0 / speed_factor.max(0.1)).max(0.01);
        self.commit_interval = Duration::from_secs_f64(secs);
        self
    }
}

/// Handle to the background flusher task.
pub struct Repository {
    tx: mpsc::Sender<Command>,
    errors_total: Arc<AtomicU64>,
    batches_committed: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl Repository {
    /// Spawn the flusher task on the current runtime.
    pub fn spawn(store: Arc<dyn Store>, config: RepositoryConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let errors_total = Arc::new(AtomicU64::new(0));
        let batches_committed = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(flusher_loop(
            store,
            rx,
            config,
            Arc::clone(&errors_total),
            Arc::clone(&batches_committed),
        ));

        Self {
            tx,
            errors_total,
            batches_committed,
            handle,
        }
    }

    /// Submit one write. Fire-and-forget: the caller never observes
    /// commit errors, only the error counter does.
    pub async fn submit(&self, write: BufferedWrite) {
        if self.tx.send(Command::Write(write)).await.is_err() {
            warn!("repository flusher is gone, write dropped");
        }
    }

    /// Block until everything buffered so far has been committed or
    /// dropped after exhausting its retries.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).await.is_err() {
            return;
        }
        let _ = done.await;
    }

    /// Close the channel and wait for the flusher to drain and exit.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.handle.await {
            warn!(error = %err, "repository flusher task panicked");
        }
    }

    /// Total batches dropped after exhausting their retries.
    pub fn commit_errors_total(&self) -> u64 {
        self.errors_total.load(Ordering::SeqCst)
    }

    /// Total batches committed successfully.
    pub fn batches_committed(&self) -> u64 {
        self.batches_committed.load(Ordering::SeqCst)
    }
}

async fn flusher_loop(
    store: Arc<dyn Store>,
    mut rx: mpsc::Receiver<Command>,
    config: RepositoryConfig,
    errors_total: Arc<AtomicU64>,
    batches_committed: Arc<AtomicU64>,
) {
    let mut buffer: Vec<BufferedWrite> = Vec::with_capacity(config.batch_size);
    let mut ticker = tokio::time::interval(config.commit_interval.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Write(write)) => {
                    buffer.push(write);
                    if buffer.len() >= config.batch_size {
                        commit_batch(&*store, &mut buffer, &config, &errors_total, &batches_committed)
                            .await;
                        ticker.reset();
                    }
                }
                Some(Command::Flush(ack)) => {
                    commit_batch(&*store, &mut buffer, &config, &errors_total, &batches_committed)
                        .await;
                    ticker.reset();
                    let _ = ack.send(());
                }
                None => {
                    // Channel closed: final drain, then exit.
                    commit_batch(&*store, &mut buffer, &config, &errors_total, &batches_committed)
                        .await;
                    debug!("repository flusher drained and stopped");
                    return;
                }
            },
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    commit_batch(&*store, &mut buffer, &config, &errors_total, &batches_committed)
                        .await;
                }
            }
        }
    }
}

/// Commit the buffer, retrying per the back-off schedule.
///
/// The buffer is always emptied: either into the store or, after the
/// last failed attempt, onto the floor with a CRITICAL log.
async fn commit_batch(
    store: &dyn Store,
    buffer: &mut Vec<BufferedWrite>,
    config: &RepositoryConfig,
    errors_total: &AtomicU64,
    batches_committed: &AtomicU64,
) {
    if buffer.is_empty() {
        return;
    }
    let writes = std::mem::take(buffer);
    let grouped = GroupedWrites::from_writes(writes);
    let total_attempts = config.retry_backoffs.len() + 1;

    for attempt in 1..=total_attempts {
        match grouped.commit(store).await {
            Ok(()) => {
                batches_committed.fetch_add(1, Ordering::SeqCst);
                debug!(
                    records = grouped.len(),
                    attempt, "batch commit succeeded"
                );
                return;
            }
            Err(err) if attempt < total_attempts => {
                let backoff = config
                    .retry_backoffs
                    .get(attempt - 1)
                    .copied()
                    .unwrap_or(Duration::from_secs(1));
                warn!(
                    error = %err,
                    attempt,
                    backoff_secs = backoff.as_secs_f64(),
                    "batch commit failed, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => {
                errors_total.fetch_add(1, Ordering::SeqCst);
                error!(
                    critical = true,
                    error = %err,
                    records_lost = grouped.len(),
                    "batch commit failed after all retries, dropping batch"
                );
                return;
            }
        }
    }
}

/// Writes grouped per store call, deduplicated on natural keys.
struct GroupedWrites {
    agents: Vec<AgentState>,
    trends: Vec<Trend>,
    events: Vec<EventAudit>,
    history: Vec<AttributeChange>,
    summaries: Vec<DailyTrendSummary>,
    archived: Vec<TrendId>,
}

impl GroupedWrites {
    fn from_writes(writes: Vec<BufferedWrite>) -> Self {
        let mut agents = BTreeMap::new();
        let mut trends = BTreeMap::new();
        let mut events = Vec::new();
        let mut history = Vec::new();
        let mut summaries = Vec::new();
        let mut archived = Vec::new();

        for write in writes {
            match write {
                // Later agent/trend states supersede earlier ones
                // within the same batch.
                BufferedWrite::Agent(agent) => {
                    agents.insert(agent.id, agent);
                }
                BufferedWrite::Trend(trend) => {
                    trends.insert(trend.id, trend);
                }
                BufferedWrite::Event(event) => events.push(event),
                BufferedWrite::History(change) => history.push(change),
                BufferedWrite::Summary(summary) => summaries.push(summary),
                BufferedWrite::ArchiveTrend(trend_id) => archived.push(trend_id),
            }
        }

        Self {
            agents: agents.into_values().collect(),
            trends: trends.into_values().collect(),
            events,
            history,
            summaries,
            archived,
        }
    }

    fn len(&self) -> usize {
        self.agents.len()
            + self.trends.len()
            + self.events.len()
            + self.history.len()
            + self.summaries.len()
            + self.archived.len()
    }

    /// Commit every group. Trends go before events and history so
    /// references to freshly created trends always resolve.
    async fn commit(&self, store: &dyn Store) -> Result<(), crate::error::DbError> {
        store.persist_agents(&self.agents).await?;
        store.persist_trends(&self.trends).await?;
        store.persist_events(&self.events).await?;
        store.persist_history(&self.history).await?;
        store.persist_daily_summaries(&self.summaries).await?;
        for trend_id in &self.archived {
            store.archive_trend(*trend_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use capsim_types::{AgentId, AttributeName, ChangeReason, Profession, PurchaseTimestamps, RunId};
    use chrono::Utc;

    use super::*;
    use crate::memory::MemoryStore;

    fn make_agent(energy: f64) -> AgentState {
        AgentState {
            id: AgentId::new(),
            simulation_id: RunId::new(),
            profession: Profession::Worker,
            financial_capability: 2.0,
            trend_receptivity: 2.0,
            social_status: 2.0,
            energy_level: energy,
            time_budget: 3.0,
            interests: BTreeMap::new(),
            exposure_history: BTreeMap::new(),
            purchases_today: 0,
            last_post_ts: None,
            last_selfdev_ts: None,
            last_purchase_ts: PurchaseTimestamps::default(),
            created_at: Utc::now(),
        }
    }

    fn make_change(agent_id: AgentId, minute: f64) -> AttributeChange {
        AttributeChange {
            agent_id,
            attribute: AttributeName::EnergyLevel,
            old_value: 1.0,
            new_value: 2.0,
            delta: 1.0,
            sim_minute: minute,
            reason: ChangeReason::EnergyRecovery,
            source_trend_id: None,
        }
    }

    fn test_config() -> RepositoryConfig {
        RepositoryConfig {
            batch_size: 100,
            commit_interval: Duration::from_secs(3600),
            retry_backoffs: vec![Duration::from_secs(1), Duration::from_secs(2)],
            channel_capacity: 64,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn flush_commits_buffered_writes() {
        let store = Arc::new(MemoryStore::new());
        let repo = Repository::spawn(Arc::clone(&store) as Arc<dyn Store>, test_config());

        repo.submit(BufferedWrite::Agent(make_agent(3.0))).await;
        repo.submit(BufferedWrite::History(make_change(AgentId::new(), 1.0)))
            .await;
        repo.flush().await;

        assert_eq!(store.agent_count(), 1);
        assert_eq!(repo.batches_committed(), 1);
        assert_eq!(repo.commit_errors_total(), 0);
        repo.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn size_threshold_triggers_commit() {
        let store = Arc::new(MemoryStore::new());
        let mut config = test_config();
        config.batch_size = 2;
        let repo = Repository::spawn(Arc::clone(&store) as Arc<dyn Store>, config);

        repo.submit(BufferedWrite::Agent(make_agent(1.0))).await;
        repo.submit(BufferedWrite::Agent(make_agent(2.0))).await;

        // The commit happens on the flusher task; wait for it without
        // relying on flush().
        for _ in 0..100 {
            if store.agent_count() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.agent_count(), 2);
        repo.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn interval_triggers_commit() {
        let store = Arc::new(MemoryStore::new());
        let mut config = test_config();
        config.commit_interval = Duration::from_millis(500);
        let repo = Repository::spawn(Arc::clone(&store) as Arc<dyn Store>, config);

        repo.submit(BufferedWrite::Agent(make_agent(1.0))).await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(store.agent_count(), 1);
        repo.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retries_and_recovers() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(1);
        let repo = Repository::spawn(Arc::clone(&store) as Arc<dyn Store>, test_config());

        repo.submit(BufferedWrite::Agent(make_agent(2.0))).await;
        repo.flush().await;

        assert_eq!(store.agent_count(), 1);
        assert_eq!(repo.commit_errors_total(), 0);
        repo.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_drop_batch_and_continue() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(u32::MAX);
        let repo = Repository::spawn(Arc::clone(&store) as Arc<dyn Store>, test_config());

        repo.submit(BufferedWrite::Agent(make_agent(2.0))).await;
        repo.flush().await;

        assert_eq!(repo.commit_errors_total(), 1);
        assert_eq!(store.agent_count(), 0);

        // The store recovers; later writes commit normally.
        store.fail_next(0);
        repo.submit(BufferedWrite::Agent(make_agent(4.0))).await;
        repo.flush().await;
        assert_eq!(store.agent_count(), 1);
        assert_eq!(repo.commit_errors_total(), 1);
        repo.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drains_pending_writes() {
        let store = Arc::new(MemoryStore::new());
        let repo = Repository::spawn(Arc::clone(&store) as Arc<dyn Store>, test_config());

        repo.submit(BufferedWrite::Agent(make_agent(2.0))).await;
        repo.shutdown().await;

        assert_eq!(store.agent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_agent_writes_collapse_to_latest() {
        let store = Arc::new(MemoryStore::new());
        let repo = Repository::spawn(Arc::clone(&store) as Arc<dyn Store>, test_config());

        let mut agent = make_agent(1.0);
        let id = agent.id;
        repo.submit(BufferedWrite::Agent(agent.clone())).await;
        agent.energy_level = 4.5;
        repo.submit(BufferedWrite::Agent(agent)).await;
        repo.flush().await;

        assert_eq!(store.agent_count(), 1);
        assert_eq!(store.agent(id).map(|a| a.energy_level), Some(4.5));
        repo.shutdown().await;
    }

    #[test]
    fn speed_factor_sets_commit_interval() {
        let config = RepositoryConfig::default().with_speed_factor(60.0);
        assert_eq!(config.commit_interval, Duration::from_secs(1));
        let slow = RepositoryConfig::default().with_speed_factor(1.0);
        assert_eq!(slow.commit_interval, Duration::from_secs(60));
    }
}
