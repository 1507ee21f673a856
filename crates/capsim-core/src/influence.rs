//! Influence propagation: applies a trend to its audience and rewards
//! the author.
//!
//! Triggered by TREND_INFLUENCE. The audience is the set of agents
//! whose profession is receptive to the topic and whose last exposure
//! to this trend is absent or stale, capped by the trend's coverage
//! level through a deterministic sample seeded by `(trend_id, day)`.
//! Each sampled reader rolls a reaction; reacting readers mutate per
//! the sentiment/match delta table and may schedule one reply post.
//! The trend counter update runs exactly once per event.

use capsim_agents::{apply_delta, current_virality, day_index, register_interactions};
use capsim_db::BufferedWrite;
use capsim_types::{
    AgentId, AttributeName, ChangeReason, Sentiment, SimEvent, TrendId,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::engine::SimulationEngine;
use crate::error::EngineError;

impl SimulationEngine {
    /// Process one TREND_INFLUENCE event.
    pub(crate) async fn process_trend_influence(
        &mut self,
        trend_id: TrendId,
        ts: f64,
    ) -> Result<(), EngineError> {
        let Some(trend) = self.trends.get(&trend_id).cloned() else {
            warn!(
                sim_id = %self.run_id,
                trend_id = %trend_id,
                t = ts,
                "trend not found (archived?), influence skipped"
            );
            return Ok(());
        };

        let virality = current_virality(&trend);
        let coverage_share = trend.coverage_level.audience_share();
        let delta_social = (virality - 1.0) * 0.02;
        let delta_time = -(0.5 * trend.coverage_level.time_factor());
        let exposure_reset = self.config.trends.exposure_reset_min as f64;
        let max_exposures = self.config.persistence.cache_max_size;

        // Eligible readers, in deterministic id order.
        let eligible: Vec<AgentId> = self
            .agents
            .values()
            .filter(|agent| {
                agent.id != trend.originator_id
                    && self
                        .tables
                        .affinity
                        .affinity(agent.profession, trend.topic)
                        > 0.0
                    && agent
                        .exposure_history
                        .get(&trend_id)
                        .is_none_or(|last| ts - last >= exposure_reset)
            })
            .map(|agent| agent.id)
            .collect();

        let cap = ((eligible.len() as f64) * coverage_share).round() as usize;
        let audience = sample_audience(&eligible, cap, trend_id, day_index(ts));

        let mut readers: u64 = 0;
        let mut energy_sum = 0.0;
        let mut replies: Vec<(AgentId, f64)> = Vec::new();
        let mut writes: Vec<BufferedWrite> = Vec::new();

        {
            let agents = &mut self.agents;
            let tables = &self.tables;
            let rng = &mut self.rng;

            for agent_id in audience {
                let Some(agent) = agents.get_mut(&agent_id) else {
                    continue;
                };
                let affinity = tables.affinity.affinity(agent.profession, trend.topic);

                // Exposure is recorded for everyone the trend reached,
                // reacting or not.
                agent.exposure_history.insert(trend_id, ts);
                if agent.exposure_history.len() > max_exposures {
                    let oldest = agent
                        .exposure_history
                        .iter()
                        .min_by(|(ka, va), (kb, vb)| va.total_cmp(vb).then_with(|| ka.cmp(kb)))
                        .map(|(k, _)| *k);
                    if let Some(key) = oldest {
                        agent.exposure_history.remove(&key);
                    }
                }

                let noise: f64 = rng.random_range(0.8..1.2);
                let probability =
                    (virality / 5.0) * (agent.trend_receptivity / 5.0) * (affinity / 5.0) * noise;
                let reacts = rng.random_range(0.0..1.0) < probability;

                if reacts {
                    let interest_match = affinity > 3.0;
                    let (delta_receptivity, delta_energy) =
                        reaction_deltas(trend.sentiment, interest_match);

                    for (attribute, delta) in [
                        (AttributeName::TrendReceptivity, delta_receptivity),
                        (AttributeName::EnergyLevel, delta_energy),
                        (AttributeName::SocialStatus, delta_social),
                        (AttributeName::TimeBudget, delta_time),
                    ] {
                        if let Some(change) = apply_delta(
                            agent,
                            attribute,
                            delta,
                            ChangeReason::TrendInfluence,
                            Some(trend_id),
                            ts,
                        )? {
                            writes.push(BufferedWrite::History(change));
                        }
                    }

                    readers += 1;
                    energy_sum += delta_energy;

                    // At most one reply per reader per trend.
                    let reply_probability =
                        (virality * 0.2).min(0.5) * (agent.social_status / 5.0) * 0.6;
                    if rng.random_range(0.0..1.0) < reply_probability {
                        let u: f64 = rng.random_range(0.0..1.0);
                        let delay = (-15.0 * (1.0 - u).ln()).clamp(1.0, 60.0);
                        replies.push((agent_id, ts + delay));
                    }
                }

                writes.push(BufferedWrite::Agent(agent.clone()));
            }
        }

        for write in writes {
            self.repository.submit(write).await;
        }

        // Counter update runs exactly once per influence event; the
        // timestamp refreshes even with zero readers.
        if let Some(trend_mut) = self.trends.get_mut(&trend_id) {
            register_interactions(trend_mut, readers, ts);
            let snapshot = trend_mut.clone();
            self.repository.submit(BufferedWrite::Trend(snapshot)).await;
        }

        self.apply_post_effect(&trend, readers, energy_sum, ts).await?;

        let reply_count = replies.len();
        for (agent_id, reply_ts) in replies {
            self.schedule(
                reply_ts,
                SimEvent::PublishPost {
                    agent_id,
                    topic: trend.topic,
                    parent_trend_id: Some(trend_id),
                },
            );
        }

        info!(
            sim_id = %self.run_id,
            trend_id = %trend_id,
            topic = trend.topic.as_str(),
            eligible = eligible.len(),
            readers,
            replies = reply_count,
            virality,
            t = ts,
            "trend influence processed"
        );
        Ok(())
    }

    /// Aggregate author reward: one social-status update driven by the
    /// reader energy sum, reader count, and sentiment sign.
    async fn apply_post_effect(
        &mut self,
        trend: &capsim_types::Trend,
        readers: u64,
        energy_sum: f64,
        ts: f64,
    ) -> Result<(), EngineError> {
        if readers == 0 {
            return Ok(());
        }

        let reach = ((readers as f64) + 1.0).ln() / std::f64::consts::LN_10;
        let delta_social =
            (energy_sum * reach * trend.sentiment.sign() / 50.0).clamp(-1.0, 1.0);

        let Some(author) = self.agents.get_mut(&trend.originator_id) else {
            return Ok(());
        };
        let change = apply_delta(
            author,
            AttributeName::SocialStatus,
            delta_social,
            ChangeReason::PostEffect,
            Some(trend.id),
            ts,
        )?;
        let snapshot = author.clone();

        if let Some(change) = change {
            self.repository.submit(BufferedWrite::History(change)).await;
            self.repository.submit(BufferedWrite::Agent(snapshot)).await;
            debug!(
                sim_id = %self.run_id,
                author = %trend.originator_id,
                delta_social,
                readers,
                "post effect applied"
            );
        }
        Ok(())
    }
}

/// Per-reader attribute deltas by sentiment and interest match
/// (receptivity, energy).
const fn reaction_deltas(sentiment: Sentiment, interest_match: bool) -> (f64, f64) {
    match (sentiment, interest_match) {
        (Sentiment::Positive, true) => (0.01, 0.02),
        (Sentiment::Positive, false) => (0.0, 0.015),
        (Sentiment::Negative, true) => (0.01, -0.015),
        (Sentiment::Negative, false) => (0.01, -0.010),
    }
}

/// Deterministic coverage-capped sample of the eligible audience.
///
/// A partial Fisher-Yates shuffle seeded by `(trend_id, day)` picks
/// `cap` readers; the result is re-sorted so downstream processing
/// order stays id-deterministic.
fn sample_audience(eligible: &[AgentId], cap: usize, trend_id: TrendId, day: u32) -> Vec<AgentId> {
    if cap >= eligible.len() {
        return eligible.to_vec();
    }
    let mut ids = eligible.to_vec();
    let mut rng = SmallRng::seed_from_u64(audience_seed(trend_id, day));
    for i in 0..cap {
        let j = rng.random_range(i..ids.len());
        ids.swap(i, j);
    }
    let mut selected = ids[..cap].to_vec();
    selected.sort_unstable();
    selected
}

/// Mix a trend id and a day index into a sampling seed.
fn audience_seed(trend_id: TrendId, day: u32) -> u64 {
    let bytes = trend_id.into_inner().into_bytes();
    let mut head = [0u8; 8];
    head.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(head) ^ u64::from(day).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
