//! Action execution: applies effect tables and emits follow-up events.
//!
//! Gates are re-checked here at execution time; attributes may have
//! changed since the decision was made, and a failed re-check cancels
//! the action silently (debug log only, no effects, no history).
//! Enqueue failures surface as WARNING plus a counter and never crash
//! the loop.

use capsim_agents::{apply_delta, can_post, can_purchase, can_self_dev, create_trend};
use capsim_db::BufferedWrite;
use capsim_types::{
    AgentId, AttributeChange, AttributeName, ChangeReason, PurchaseLevel, SimEvent, TrendId,
    TrendTopic,
};
use tracing::{debug, info, warn};

use crate::engine::SimulationEngine;
use crate::error::EngineError;

/// Delay between a post and its influence propagation, in sim-minutes.
pub(crate) const INFLUENCE_DELAY_MIN: f64 = 5.0;

impl SimulationEngine {
    /// PUBLISH_POST: apply the author costs, create the trend, and
    /// schedule its influence propagation.
    pub(crate) async fn execute_publish_post(
        &mut self,
        agent_id: AgentId,
        topic: TrendTopic,
        parent_trend_id: Option<TrendId>,
        ts: f64,
    ) -> Result<(), EngineError> {
        let Some(author) = self.agents.get(&agent_id) else {
            warn!(sim_id = %self.run_id, agent_id = %agent_id, "post author not found");
            return Ok(());
        };
        if !can_post(author, ts, &self.rules) {
            debug!(
                sim_id = %self.run_id,
                agent_id = %agent_id,
                t = ts,
                "post gate failed at execution, action cancelled"
            );
            return Ok(());
        }

        // Coverage derives from the mean social status of the agents
        // whose profession is receptive to the topic.
        let eligible: Vec<f64> = self
            .agents
            .values()
            .filter(|a| self.tables.affinity.affinity(a.profession, topic) > 0.0)
            .map(|a| a.social_status)
            .collect();
        let mean_social = if eligible.is_empty() {
            0.0
        } else {
            eligible.iter().sum::<f64>() / eligible.len() as f64
        };

        let affinity = self.tables.affinity.affinity(author.profession, topic);
        let profession = author.profession;

        let trend = {
            let agents = &self.agents;
            let rng = &mut self.rng;
            let Some(author) = agents.get(&agent_id) else {
                return Ok(());
            };
            create_trend(
                author,
                topic,
                parent_trend_id,
                self.run_id,
                ts,
                affinity,
                mean_social,
                rng,
            )
        };

        let effects: Vec<(AttributeName, f64)> = self
            .rules
            .effects
            .post
            .iter()
            .map(|(attr, delta)| (*attr, *delta))
            .collect();
        let (snapshot, history) =
            self.apply_effects(agent_id, &effects, ChangeReason::PostAction, None, ts)?;
        let Some(mut snapshot) = snapshot else {
            return Ok(());
        };
        if let Some(agent) = self.agents.get_mut(&agent_id) {
            agent.last_post_ts = Some(ts);
            snapshot = agent.clone();
        }

        let trend_id = trend.id;
        self.trends.insert(trend_id, trend.clone());

        self.repository.submit(BufferedWrite::Trend(trend.clone())).await;
        self.repository.submit(BufferedWrite::Agent(snapshot)).await;
        for change in history {
            self.repository.submit(BufferedWrite::History(change)).await;
        }

        self.schedule(
            ts + INFLUENCE_DELAY_MIN,
            SimEvent::TrendInfluence { trend_id },
        );
        self.metrics.record_action("Post", profession.as_str());

        info!(
            sim_id = %self.run_id,
            agent_id = %agent_id,
            trend_id = %trend_id,
            topic = topic.as_str(),
            virality = trend.base_virality,
            coverage = ?trend.coverage_level,
            reply = parent_trend_id.is_some(),
            t = ts,
            "post published"
        );
        Ok(())
    }

    /// SELF_DEV: spend time to restore energy.
    pub(crate) async fn execute_self_dev(
        &mut self,
        agent_id: AgentId,
        ts: f64,
    ) -> Result<(), EngineError> {
        let Some(agent) = self.agents.get(&agent_id) else {
            warn!(sim_id = %self.run_id, agent_id = %agent_id, "self-dev agent not found");
            return Ok(());
        };
        if !can_self_dev(agent, ts, &self.rules) {
            debug!(
                sim_id = %self.run_id,
                agent_id = %agent_id,
                t = ts,
                "self-dev gate failed at execution, action cancelled"
            );
            return Ok(());
        }
        let profession = agent.profession;

        let effects: Vec<(AttributeName, f64)> = self
            .rules
            .effects
            .self_dev
            .iter()
            .map(|(attr, delta)| (*attr, *delta))
            .collect();
        let (snapshot, history) =
            self.apply_effects(agent_id, &effects, ChangeReason::SelfDevAction, None, ts)?;
        let Some(mut snapshot) = snapshot else {
            return Ok(());
        };
        if let Some(agent) = self.agents.get_mut(&agent_id) {
            agent.last_selfdev_ts = Some(ts);
            snapshot = agent.clone();
        }

        self.repository.submit(BufferedWrite::Agent(snapshot)).await;
        for change in history {
            self.repository.submit(BufferedWrite::History(change)).await;
        }
        self.metrics.record_action("SelfDev", profession.as_str());
        debug!(sim_id = %self.run_id, agent_id = %agent_id, t = ts, "self-dev completed");
        Ok(())
    }

    /// PURCHASE_Lk: apply the level's effect row and advance the daily
    /// counter.
    pub(crate) async fn execute_purchase(
        &mut self,
        agent_id: AgentId,
        level: PurchaseLevel,
        ts: f64,
    ) -> Result<(), EngineError> {
        let Some(agent) = self.agents.get(&agent_id) else {
            warn!(sim_id = %self.run_id, agent_id = %agent_id, "purchase agent not found");
            return Ok(());
        };
        if !can_purchase(agent, ts, level, &self.rules) {
            debug!(
                sim_id = %self.run_id,
                agent_id = %agent_id,
                level = level.as_str(),
                t = ts,
                "purchase gate failed at execution, action cancelled"
            );
            return Ok(());
        }
        let profession = agent.profession;

        let effects: Vec<(AttributeName, f64)> = self
            .rules
            .effects
            .purchase(level)
            .iter()
            .map(|(attr, delta)| (*attr, *delta))
            .collect();
        let (snapshot, history) =
            self.apply_effects(agent_id, &effects, ChangeReason::PurchaseAction, None, ts)?;
        let Some(mut snapshot) = snapshot else {
            return Ok(());
        };

        let max_purchases = self.rules.max_purchases_per_day;
        if let Some(agent) = self.agents.get_mut(&agent_id) {
            agent.purchases_today += 1;
            agent.last_purchase_ts.set(level, ts);
            if agent.purchases_today > max_purchases {
                return Err(EngineError::InvariantViolation {
                    context: format!(
                        "agent {agent_id} exceeded the daily purchase limit: {} > {max_purchases}",
                        agent.purchases_today
                    ),
                });
            }
            snapshot = agent.clone();
        }

        self.repository.submit(BufferedWrite::Agent(snapshot)).await;
        for change in history {
            self.repository.submit(BufferedWrite::History(change)).await;
        }

        let kind = match level {
            PurchaseLevel::L1 => "Purchase_L1",
            PurchaseLevel::L2 => "Purchase_L2",
            PurchaseLevel::L3 => "Purchase_L3",
        };
        self.metrics.record_action(kind, profession.as_str());
        debug!(
            sim_id = %self.run_id,
            agent_id = %agent_id,
            level = level.as_str(),
            t = ts,
            "purchase completed"
        );
        Ok(())
    }

    /// Apply an effect row to one agent. Returns the post-mutation
    /// snapshot and the history records for the deltas that moved a
    /// value.
    pub(crate) fn apply_effects(
        &mut self,
        agent_id: AgentId,
        effects: &[(AttributeName, f64)],
        reason: ChangeReason,
        source_trend_id: Option<TrendId>,
        ts: f64,
    ) -> Result<(Option<capsim_types::AgentState>, Vec<AttributeChange>), EngineError> {
        let Some(agent) = self.agents.get_mut(&agent_id) else {
            return Ok((None, Vec::new()));
        };

        let mut history = Vec::with_capacity(effects.len());
        for (attribute, delta) in effects {
            if let Some(change) =
                apply_delta(agent, *attribute, *delta, reason, source_trend_id, ts)?
            {
                history.push(change);
            }
        }
        Ok((Some(agent.clone()), history))
    }
}
