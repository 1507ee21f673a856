//! The simulation engine: bootstrap, main loop, system events, shutdown.
//!
//! The engine owns every piece of mutable simulation state (clock,
//! queue, agents, trends, RNG) and runs the single-threaded event loop.
//! The only other task is the repository flusher, fed through a bounded
//! channel. Exactly one suspension point exists per event: the clock
//! wait before dispatch.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use capsim_agents::{
    apply_delta, day_index, decide_action, spawn_population, ActionRules, TrendContext,
    MINUTES_PER_DAY,
};
use capsim_db::{BufferedWrite, Repository, RepositoryConfig, Store};
use capsim_types::{
    ActionKind, AgentId, AgentState, AttributeName, ChangeReason, DailyTrendSummary, EventAudit,
    EventId, InterestCategory, RunId, RunStatus, SimEvent, SimulationRun, StaticTables, Trend,
    TrendId, TrendTopic,
};
use chrono::Utc;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, WaitOutcome};
use crate::config::SimulationConfig;
use crate::error::EngineError;
use crate::metrics::SimMetrics;
use crate::queue::{EventQueue, QueueError, ScheduledEvent};
use crate::shutdown::{shutdown_channel, ShutdownHandle, ShutdownToken};

/// Sim-minutes between agent decision passes.
const DECISION_INTERVAL_MIN: f64 = 15.0;

/// Tolerance for the monotonic-time defensive check.
const TIME_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Active-run lock
// ---------------------------------------------------------------------------

/// Process-wide mutual exclusion for the single-active-run invariant.
///
/// The default lock is a process global; tests create isolated locks so
/// parallel test threads do not contend.
#[derive(Debug, Clone)]
pub struct ActiveRunLock(Arc<AtomicBool>);

impl Default for ActiveRunLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveRunLock {
    /// A fresh, independent lock.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// The shared process-wide lock.
    pub fn global() -> Self {
        static GLOBAL: OnceLock<ActiveRunLock> = OnceLock::new();
        GLOBAL.get_or_init(Self::new).clone()
    }

    /// Try to acquire the lock. Returns `None` when another run holds it.
    pub fn try_acquire(&self) -> Option<ActiveRunGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then(|| ActiveRunGuard(Arc::clone(&self.0)))
    }
}

/// RAII guard: every termination path releases the lock on drop.
#[derive(Debug)]
pub struct ActiveRunGuard(Arc<AtomicBool>);

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Run outcome
// ---------------------------------------------------------------------------

/// Why the main loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The next pending event lies past the planned horizon.
    HorizonReached,
    /// No pending events remain.
    QueueDrained,
    /// The shutdown token was triggered.
    ShutdownRequested,
}

/// Final report of a completed (or stopped) run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The run's identifier.
    pub run_id: RunId,
    /// Terminal status the run ended in.
    pub status: RunStatus,
    /// Why the loop stopped.
    pub end_reason: EndReason,
    /// Total events dispatched.
    pub events_processed: u64,
    /// Simulation time of the last popped event.
    pub final_sim_time: f64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Central coordinator of one simulation run.
pub struct SimulationEngine {
    pub(crate) config: SimulationConfig,
    pub(crate) rules: ActionRules,
    pub(crate) tables: StaticTables,
    store: Arc<dyn Store>,
    pub(crate) repository: Repository,
    pub(crate) metrics: Arc<SimMetrics>,
    clock: Clock,
    pub(crate) queue: EventQueue,
    pub(crate) rng: SmallRng,
    pub(crate) agents: BTreeMap<AgentId, AgentState>,
    pub(crate) trends: BTreeMap<TrendId, Trend>,
    pub(crate) run_id: RunId,
    status: RunStatus,
    pub(crate) current_time: f64,
    horizon: f64,
    next_decision_at: f64,
    prev_day_virality: BTreeMap<TrendTopic, f64>,
    events_processed: u64,
    shutdown_handle: ShutdownHandle,
    token: ShutdownToken,
    _guard: ActiveRunGuard,
}

impl SimulationEngine {
    /// Bootstrap a new run: acquire the single-run lock, persist the
    /// run row, load static tables, spawn the population, and schedule
    /// the first system events.
    ///
    /// # Errors
    ///
    /// [`EngineError::ActiveSimulationExists`] when another run is live
    /// (process-wide or in the store); [`EngineError::Bootstrap`] when
    /// a store operation fails before buffering is available.
    pub async fn bootstrap(
        config: SimulationConfig,
        store: Arc<dyn Store>,
        lock: &ActiveRunLock,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let guard = lock
            .try_acquire()
            .ok_or(EngineError::ActiveSimulationExists)?;

        if !store.get_active_runs().await?.is_empty() {
            return Err(EngineError::ActiveSimulationExists);
        }

        let run_id = RunId::new();
        let horizon = config.horizon_min();
        let run = SimulationRun {
            id: run_id,
            status: RunStatus::Initializing,
            started_at: Utc::now(),
            horizon_min: horizon,
            num_agents: config.simulation.num_agents,
            seed: config.simulation.seed,
            configuration: serde_json::json!({
                "speed_factor": config.simulation.speed_factor,
                "realtime": config.simulation.realtime,
                "duration_days": config.simulation.duration_days,
                "batch_size": config.persistence.batch_size,
                "max_queue_size": config.queue.max_size,
                "archive_threshold_days": config.trends.archive_threshold_days,
            }),
        };
        store.create_run(&run).await?;

        let tables = store.load_static_tables().await?;
        let mut rng = SmallRng::seed_from_u64(config.simulation.seed);

        let population =
            spawn_population(config.simulation.num_agents, run_id, &tables, &mut rng);
        store.persist_agents(&population).await?;
        let agents: BTreeMap<AgentId, AgentState> =
            population.into_iter().map(|a| (a.id, a)).collect();

        let metrics = SimMetrics::shared();
        let repository = Repository::spawn(
            Arc::clone(&store),
            RepositoryConfig {
                batch_size: config.persistence.batch_size,
                retry_backoffs: config
                    .persistence
                    .retry_backoff_secs
                    .iter()
                    .map(|secs| Duration::from_secs_f64(secs.max(0.0)))
                    .collect(),
                ..RepositoryConfig::default()
            }
            .with_speed_factor(config.simulation.speed_factor),
        );

        let clock = if config.simulation.realtime {
            Clock::real_time(config.simulation.speed_factor)
        } else {
            Clock::fast()
        };

        let (shutdown_handle, token) = shutdown_channel();

        let mut engine = Self {
            rules: config.action_rules(),
            queue: EventQueue::with_capacity(config.queue.max_size),
            config,
            tables,
            store,
            repository,
            metrics,
            clock,
            rng,
            agents,
            trends: BTreeMap::new(),
            run_id,
            status: RunStatus::Initializing,
            current_time: 0.0,
            horizon,
            next_decision_at: DECISION_INTERVAL_MIN,
            prev_day_virality: BTreeMap::new(),
            events_processed: 0,
            shutdown_handle,
            token,
            _guard: guard,
        };

        engine.schedule_initial_events();
        engine.set_status(RunStatus::Running).await;
        engine.metrics.set_simulations_active(1);

        info!(
            sim_id = %engine.run_id,
            agents = engine.agents.len(),
            horizon_min = engine.horizon,
            seed = engine.config.simulation.seed,
            queued = engine.queue.len(),
            "simulation bootstrapped"
        );

        Ok(engine)
    }

    /// Handle used to request a graceful stop (wire to SIGINT/SIGTERM).
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown_handle.clone()
    }

    /// The metrics sink, for periodic reporting.
    pub fn metrics(&self) -> Arc<SimMetrics> {
        Arc::clone(&self.metrics)
    }

    /// This run's identifier.
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Current simulation time in minutes.
    pub const fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Immutable view of the agent population (used by scenario tests).
    pub const fn agents(&self) -> &BTreeMap<AgentId, AgentState> {
        &self.agents
    }

    /// Immutable view of the active trends.
    pub const fn active_trends(&self) -> &BTreeMap<TrendId, Trend> {
        &self.trends
    }

    /// Inject an event into the queue (operator hook).
    ///
    /// Subject to the same admission control as engine-scheduled
    /// events.
    pub fn inject_event(&mut self, timestamp: f64, event: SimEvent) {
        self.schedule(timestamp, event);
    }

    /// Number of pending events.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Timestamp of the next pending event, if any.
    pub fn next_event_ts(&self) -> Option<f64> {
        self.queue.peek_ts()
    }

    /// Run the main loop to completion and finalize the run.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvariantViolation`] after the FAILED
    /// abort path ran (state flushed, lock released via drop).
    pub async fn run(&mut self) -> Result<RunOutcome, EngineError> {
        let loop_result = self.run_loop().await;

        match loop_result {
            Ok(end_reason) => {
                let status = self.finalize(end_reason).await;
                self.metrics.set_simulations_active(0);
                info!(
                    sim_id = %self.run_id,
                    status = status.as_str(),
                    events = self.events_processed,
                    final_time = self.current_time,
                    "simulation finished"
                );
                Ok(RunOutcome {
                    run_id: self.run_id,
                    status,
                    end_reason,
                    events_processed: self.events_processed,
                    final_sim_time: self.current_time,
                })
            }
            Err(fatal) => {
                error!(
                    critical = true,
                    sim_id = %self.run_id,
                    error = %fatal,
                    "fatal error, aborting run"
                );
                self.set_status(RunStatus::Failed).await;
                self.repository.flush().await;
                self.metrics.set_simulations_active(0);
                Err(fatal)
            }
        }
    }

    /// Flush and stop the repository flusher. Call after [`run`] when
    /// the process is about to exit cleanly.
    ///
    /// [`run`]: Self::run
    pub async fn close(self) {
        self.repository.shutdown().await;
    }

    async fn run_loop(&mut self) -> Result<EndReason, EngineError> {
        loop {
            if self.token.is_triggered() {
                return Ok(EndReason::ShutdownRequested);
            }

            let Some(next_ts) = self.queue.peek_ts() else {
                return Ok(EndReason::QueueDrained);
            };
            if next_ts >= self.horizon {
                return Ok(EndReason::HorizonReached);
            }

            // The single suspension point per event.
            let mut token = self.token.clone();
            if self.clock.wait_until(next_ts, &mut token).await == WaitOutcome::Interrupted {
                return Ok(EndReason::ShutdownRequested);
            }

            let Some(scheduled) = self.queue.pop() else {
                continue;
            };
            self.metrics.set_queue_length(self.queue.len());

            if scheduled.timestamp < self.current_time - TIME_EPSILON {
                return Err(EngineError::InvariantViolation {
                    context: format!(
                        "time went backwards: popped t={} at current t={}",
                        scheduled.timestamp, self.current_time
                    ),
                });
            }
            self.current_time = self.current_time.max(scheduled.timestamp);

            self.process_event(&scheduled).await?;

            if self.current_time >= self.next_decision_at {
                self.decision_pass().await?;
                self.next_decision_at = ((self.current_time / DECISION_INTERVAL_MIN).floor()
                    + 1.0)
                    * DECISION_INTERVAL_MIN;
            }

            self.metrics
                .set_batch_commit_errors(self.repository.commit_errors_total());
        }
    }

    /// Dispatch one event and append its audit record.
    async fn process_event(&mut self, scheduled: &ScheduledEvent) -> Result<(), EngineError> {
        let started = std::time::Instant::now();
        let ts = scheduled.timestamp;

        match &scheduled.event {
            SimEvent::PublishPost {
                agent_id,
                topic,
                parent_trend_id,
            } => {
                self.execute_publish_post(*agent_id, *topic, *parent_trend_id, ts)
                    .await?;
            }
            SimEvent::Purchase { agent_id, level } => {
                self.execute_purchase(*agent_id, *level, ts).await?;
            }
            SimEvent::SelfDev { agent_id } => {
                self.execute_self_dev(*agent_id, ts).await?;
            }
            SimEvent::TrendInfluence { trend_id } => {
                self.process_trend_influence(*trend_id, ts).await?;
            }
            SimEvent::DailyReset => self.handle_daily_reset(ts).await?,
            SimEvent::EnergyRecovery => self.handle_energy_recovery(ts).await?,
            SimEvent::SaveDailyTrend => self.handle_save_daily_trend(ts).await,
            SimEvent::Law {
                law_type,
                impact_factor,
            } => {
                info!(
                    sim_id = %self.run_id,
                    law_type = law_type.as_str(),
                    impact_factor,
                    t = ts,
                    "law event processed"
                );
            }
            SimEvent::Weather {
                weather_type,
                severity,
            } => {
                info!(
                    sim_id = %self.run_id,
                    weather_type = weather_type.as_str(),
                    severity,
                    t = ts,
                    "weather event processed"
                );
            }
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.observe_latency_ms(elapsed_ms);
        self.metrics.incr_events_processed();
        self.events_processed += 1;

        self.audit_event(scheduled, elapsed_ms).await;
        Ok(())
    }

    async fn audit_event(&mut self, scheduled: &ScheduledEvent, processing_ms: f64) {
        let payload = serde_json::to_value(&scheduled.event).unwrap_or(serde_json::Value::Null);
        self.repository
            .submit(BufferedWrite::Event(EventAudit {
                event_id: scheduled.id,
                simulation_id: self.run_id,
                kind: scheduled.event.kind().to_owned(),
                priority: scheduled.priority,
                sim_minute: scheduled.timestamp,
                agent_id: scheduled.event.agent_id(),
                trend_id: scheduled.event.trend_id(),
                payload,
                processing_ms,
            }))
            .await;
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    fn schedule_initial_events(&mut self) {
        self.schedule(MINUTES_PER_DAY, SimEvent::DailyReset);
        self.schedule(
            self.config.recovery.energy_interval_min as f64,
            SimEvent::EnergyRecovery,
        );
        self.schedule(MINUTES_PER_DAY, SimEvent::SaveDailyTrend);

        if self.config.simulation.seed_initial_posts {
            self.seed_initial_posts();
        }
    }

    /// Seed one post per twenty agents, spread evenly across the first
    /// hour with uniform jitter.
    fn seed_initial_posts(&mut self) {
        let seeds = (self.agents.len() / 20).max(1);
        let slot = 60.0 / seeds as f64;
        let authors: Vec<AgentId> = self
            .agents
            .keys()
            .step_by((self.agents.len() / seeds).max(1))
            .take(seeds)
            .copied()
            .collect();

        for (i, agent_id) in authors.into_iter().enumerate() {
            let topic = self
                .agents
                .get(&agent_id)
                .map_or(TrendTopic::Economic, |agent| {
                    best_topic(agent, &self.tables)
                });
            let jitter: f64 = self.rng.random_range(0.0..slot);
            let ts = i as f64 * slot + jitter;
            self.schedule(
                ts,
                SimEvent::PublishPost {
                    agent_id,
                    topic,
                    parent_trend_id: None,
                },
            );
        }
    }

    /// Admit an event, absorbing queue-full refusals into a WARNING and
    /// the overflow counter.
    pub(crate) fn schedule(&mut self, timestamp: f64, event: SimEvent) {
        let id = EventId::from_rng(&mut self.rng);
        match self.queue.push(id, timestamp, event) {
            Ok(None) => {}
            Ok(Some(evicted)) => {
                self.metrics.incr_queue_full();
                warn!(
                    sim_id = %self.run_id,
                    evicted_kind = evicted.event.kind(),
                    evicted_ts = evicted.timestamp,
                    "queue full, evicted worst pending event"
                );
            }
            Err(QueueError::Full {
                kind, timestamp, ..
            }) => {
                self.metrics.incr_queue_full();
                warn!(
                    sim_id = %self.run_id,
                    kind,
                    t = timestamp,
                    "queue full, event dropped"
                );
            }
            Err(err) => {
                error!(sim_id = %self.run_id, error = %err, "event rejected");
            }
        }
        self.metrics.set_queue_length(self.queue.len());
    }

    // -----------------------------------------------------------------------
    // Decision pass
    // -----------------------------------------------------------------------

    /// Let every agent pick an action; schedule the chosen actions with
    /// a short random delay.
    async fn decision_pass(&mut self) -> Result<(), EngineError> {
        let t = self.current_time;

        // The most viral active trend provides the decision context.
        let context_trend = self
            .trends
            .values()
            .max_by(|a, b| {
                capsim_agents::current_virality(a)
                    .total_cmp(&capsim_agents::current_virality(b))
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned();

        let mut planned: Vec<(f64, SimEvent)> = Vec::new();
        {
            // Disjoint field borrows: the population is read while the
            // engine RNG draws.
            let agents = &self.agents;
            let rules = &self.rules;
            let tables = &self.tables;
            let rng = &mut self.rng;

            // Eligibility is decided entirely by the per-action gates
            // inside the selector: self-dev needs no energy, purchases
            // need no time budget.
            for agent in agents.values() {
                let context = context_trend
                    .as_ref()
                    .map(|trend| TrendContext { trend });
                let Some(action) = decide_action(agent, t, context, rules, rng) else {
                    continue;
                };

                let delay: f64 = rng.random_range(1.0..30.0);
                let event = match action {
                    ActionKind::Post => SimEvent::PublishPost {
                        agent_id: agent.id,
                        topic: best_topic(agent, tables),
                        parent_trend_id: None,
                    },
                    ActionKind::SelfDev => SimEvent::SelfDev { agent_id: agent.id },
                    ActionKind::Purchase(level) => SimEvent::Purchase {
                        agent_id: agent.id,
                        level,
                    },
                };
                planned.push((t + delay, event));
            }
        }

        let scheduled = planned.len();
        for (ts, event) in planned {
            self.schedule(ts, event);
        }
        if scheduled > 0 {
            debug!(sim_id = %self.run_id, t, scheduled, "decision pass scheduled actions");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // System event handlers
    // -----------------------------------------------------------------------

    /// DAILY_RESET: zero the purchase counters, restore time budgets to
    /// the profession midpoint, reschedule a day ahead.
    async fn handle_daily_reset(&mut self, ts: f64) -> Result<(), EngineError> {
        let ids: Vec<AgentId> = self.agents.keys().copied().collect();
        let mut reset_count = 0u32;

        for id in ids {
            let Some(agent) = self.agents.get_mut(&id) else {
                continue;
            };
            agent.purchases_today = 0;

            let midpoint = self
                .tables
                .profession_ranges
                .time_budget_midpoint(agent.profession);
            let delta = midpoint - agent.time_budget;
            let change = apply_delta(
                agent,
                AttributeName::TimeBudget,
                delta,
                ChangeReason::DailyReset,
                None,
                ts,
            )?;

            let snapshot = agent.clone();
            if let Some(change) = change {
                reset_count += 1;
                self.repository.submit(BufferedWrite::History(change)).await;
            }
            self.repository.submit(BufferedWrite::Agent(snapshot)).await;
        }

        self.schedule(ts + MINUTES_PER_DAY, SimEvent::DailyReset);
        info!(
            sim_id = %self.run_id,
            t = ts,
            clock = %capsim_agents::human_clock(ts),
            budgets_restored = reset_count,
            next_reset = ts + MINUTES_PER_DAY,
            "daily reset completed"
        );
        Ok(())
    }

    /// ENERGY_RECOVERY: below 3.0 jumps to full, otherwise +2.0 capped
    /// at 5.0.
    async fn handle_energy_recovery(&mut self, ts: f64) -> Result<(), EngineError> {
        let ids: Vec<AgentId> = self.agents.keys().copied().collect();
        let mut recovered = 0u32;

        for id in ids {
            let Some(agent) = self.agents.get_mut(&id) else {
                continue;
            };
            let target = if agent.energy_level < 3.0 {
                5.0
            } else {
                (agent.energy_level + 2.0).min(5.0)
            };
            let delta = target - agent.energy_level;
            let change = apply_delta(
                agent,
                AttributeName::EnergyLevel,
                delta,
                ChangeReason::EnergyRecovery,
                None,
                ts,
            )?;

            let snapshot = agent.clone();
            if let Some(change) = change {
                recovered += 1;
                self.repository.submit(BufferedWrite::History(change)).await;
                self.repository.submit(BufferedWrite::Agent(snapshot)).await;
            }
        }

        let interval = self.config.recovery.energy_interval_min as f64;
        self.schedule(ts + interval, SimEvent::EnergyRecovery);
        info!(
            sim_id = %self.run_id,
            t = ts,
            agents_recovered = recovered,
            next_recovery = ts + interval,
            "energy recovery completed"
        );
        Ok(())
    }

    /// SAVE_DAILY_TREND: persist per-topic aggregates for the day that
    /// just ended, then archive stale trends.
    async fn handle_save_daily_trend(&mut self, ts: f64) {
        let day = day_index(ts).saturating_sub(1);

        #[derive(Default)]
        struct TopicAgg {
            interactions: u64,
            virality_sum: f64,
            trend_count: u32,
            authors: std::collections::BTreeSet<AgentId>,
            top: Option<(f64, TrendId)>,
        }

        let mut per_topic: BTreeMap<TrendTopic, TopicAgg> = BTreeMap::new();
        for trend in self.trends.values() {
            let agg = per_topic.entry(trend.topic).or_default();
            let virality = capsim_agents::current_virality(trend);
            agg.interactions += trend.total_interactions;
            agg.virality_sum += virality;
            agg.trend_count += 1;
            agg.authors.insert(trend.originator_id);
            let better = agg
                .top
                .is_none_or(|(best, best_id)| (virality, trend.id) > (best, best_id));
            if better {
                agg.top = Some((virality, trend.id));
            }
        }

        for (topic, agg) in &per_topic {
            let avg_virality = agg.virality_sum / f64::from(agg.trend_count.max(1));
            let pct_change = self.prev_day_virality.get(topic).map(|prev| {
                if *prev == 0.0 {
                    0.0
                } else {
                    (avg_virality - prev) / prev * 100.0
                }
            });
            self.repository
                .submit(BufferedWrite::Summary(DailyTrendSummary {
                    simulation_id: self.run_id,
                    topic: *topic,
                    day,
                    total_interactions: agg.interactions,
                    avg_virality,
                    unique_authors: agg.authors.len() as u32,
                    top_trend_id: agg.top.map(|(_, id)| id),
                    pct_change_virality: pct_change,
                }))
                .await;
            self.prev_day_virality.insert(*topic, avg_virality);
        }

        // Archival pass runs after the aggregates so the final day a
        // trend was active is still counted.
        let stale: Vec<TrendId> = self
            .trends
            .values()
            .filter(|trend| {
                capsim_agents::is_stale(trend, ts, self.config.trends.archive_threshold_days)
            })
            .map(|trend| trend.id)
            .collect();
        let archived = stale.len();
        for trend_id in stale {
            if let Some(trend) = self.trends.remove(&trend_id) {
                self.repository.submit(BufferedWrite::Trend(trend)).await;
                self.repository
                    .submit(BufferedWrite::ArchiveTrend(trend_id))
                    .await;
            }
        }

        self.schedule(ts + MINUTES_PER_DAY, SimEvent::SaveDailyTrend);
        info!(
            sim_id = %self.run_id,
            t = ts,
            day,
            topics = per_topic.len(),
            archived,
            active_remaining = self.trends.len(),
            "daily trend statistics saved"
        );
    }

    // -----------------------------------------------------------------------
    // Finalization
    // -----------------------------------------------------------------------

    /// Transition into a terminal status, draining and flushing within
    /// the shutdown budget.
    async fn finalize(&mut self, end_reason: EndReason) -> RunStatus {
        let timeout = Duration::from_secs(self.config.shutdown.timeout_sec.max(1));

        if end_reason == EndReason::ShutdownRequested {
            self.set_status(RunStatus::Stopping).await;
        }

        let drain = async {
            if end_reason == EndReason::ShutdownRequested {
                self.drain_due_actions().await?;
            }
            self.repository.flush().await;
            Ok::<(), EngineError>(())
        };

        let status = match tokio::time::timeout(timeout, drain).await {
            Ok(Ok(())) => RunStatus::Completed,
            Ok(Err(err)) => {
                error!(critical = true, sim_id = %self.run_id, error = %err, "drain failed");
                RunStatus::Failed
            }
            Err(_elapsed) => {
                error!(
                    critical = true,
                    sim_id = %self.run_id,
                    timeout_sec = timeout.as_secs(),
                    "shutdown drain exceeded its timeout"
                );
                RunStatus::ForceStopped
            }
        };

        self.set_status(status).await;
        status
    }

    /// Process the already-due agent actions, then drop the rest.
    async fn drain_due_actions(&mut self) -> Result<(), EngineError> {
        let cutoff = self.current_time;
        let mut drained = 0u32;

        while let Some(next_ts) = self.queue.peek_ts() {
            if next_ts > cutoff {
                break;
            }
            let Some(scheduled) = self.queue.pop() else {
                break;
            };
            if scheduled.event.is_system() {
                continue;
            }
            self.current_time = self.current_time.max(scheduled.timestamp);
            self.process_event(&scheduled).await?;
            drained += 1;
        }

        let dropped = self.queue.len();
        self.queue.clear();
        info!(
            sim_id = %self.run_id,
            drained,
            dropped,
            "shutdown drain finished"
        );
        Ok(())
    }

    /// Update the run status in the store, absorbing persistence
    /// failures (the engine-side status stays authoritative).
    async fn set_status(&mut self, status: RunStatus) {
        self.status = status;
        if let Err(err) = self.store.update_run_status(self.run_id, status).await {
            warn!(
                sim_id = %self.run_id,
                status = status.as_str(),
                error = %err,
                "failed to persist run status"
            );
        }
    }

    /// The engine's view of the run status.
    pub const fn status(&self) -> RunStatus {
        self.status
    }
}

/// The topic whose mapped interest category the agent cares most about.
/// Ties break in topic declaration order.
pub(crate) fn best_topic(agent: &AgentState, tables: &StaticTables) -> TrendTopic {
    let mut best = TrendTopic::Economic;
    let mut best_interest = f64::MIN;
    for topic in TrendTopic::ALL {
        let category: InterestCategory = tables.topic_mapping.interest_category(topic);
        let interest = agent.interest(category);
        if interest > best_interest {
            best_interest = interest;
            best = topic;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_run_lock_is_exclusive() {
        let lock = ActiveRunLock::new();
        let guard = lock.try_acquire();
        assert!(guard.is_some());
        assert!(lock.try_acquire().is_none());

        drop(guard);
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn global_lock_is_shared() {
        let a = ActiveRunLock::global();
        let b = ActiveRunLock::global();
        let guard = a.try_acquire();
        assert!(guard.is_some());
        assert!(b.try_acquire().is_none());
        drop(guard);
    }
}
