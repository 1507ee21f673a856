//! Action selection for one agent.
//!
//! Builds the candidate list from the gates that pass, scores each
//! candidate, drops everything below the configured threshold, and
//! samples one candidate by score weight. Sampling is deterministic
//! given the RNG state: candidates are sorted by name, scores are
//! accumulated into a prefix sum, and a single uniform draw is located
//! by binary search.

use capsim_types::{ActionKind, AgentState, PurchaseLevel, Trend, TrendTopic};
use rand::Rng;

use crate::agent::{can_post, can_purchase, can_self_dev};
use crate::config::ActionRules;
use crate::trend;

/// A trend an agent is reacting to when deciding.
#[derive(Debug, Clone, Copy)]
pub struct TrendContext<'a> {
    /// The trend under consideration.
    pub trend: &'a Trend,
}

/// A scored action candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// The action.
    pub kind: ActionKind,
    /// Its selection weight.
    pub score: f64,
}

/// Build the scored candidate list for `agent` at sim-minute `t`.
///
/// Only candidates whose gate passes are included; the threshold filter
/// happens in [`decide_action`]. Exposed separately for tests.
pub fn score_candidates(
    agent: &AgentState,
    t: f64,
    context: Option<TrendContext<'_>>,
    rules: &ActionRules,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    if can_post(agent, t, rules) {
        let score = context.map_or(rules.post_baseline_score, |ctx| {
            trend::current_virality(ctx.trend) * agent.trend_receptivity / 25.0
                * (1.0 + agent.social_status / 10.0)
        });
        candidates.push(Candidate {
            kind: ActionKind::Post,
            score,
        });
    }

    let economic_context =
        context.is_some_and(|ctx| ctx.trend.topic == TrendTopic::Economic);
    for level in PurchaseLevel::ALL {
        if can_purchase(agent, t, level, rules) {
            let mut score = 0.3 * rules.shop_weights.weight(agent.profession);
            if economic_context {
                score *= 1.2;
            }
            candidates.push(Candidate {
                kind: ActionKind::Purchase(level),
                score,
            });
        }
    }

    if can_self_dev(agent, t, rules) {
        candidates.push(Candidate {
            kind: ActionKind::SelfDev,
            score: (1.0 - agent.energy_level / 5.0).max(0.0),
        });
    }

    candidates
}

/// Choose the next action for `agent`, or `None` when nothing clears
/// the score threshold.
pub fn decide_action<R: Rng + ?Sized>(
    agent: &AgentState,
    t: f64,
    context: Option<TrendContext<'_>>,
    rules: &ActionRules,
    rng: &mut R,
) -> Option<ActionKind> {
    let mut candidates = score_candidates(agent, t, context, rules);
    candidates.retain(|c| c.score >= rules.score_threshold);
    weighted_pick(&mut candidates, rng)
}

/// Sample one candidate by score weight.
///
/// Candidates are sorted by name first so equal RNG state always walks
/// the same order; a zero total weight yields no action.
fn weighted_pick<R: Rng + ?Sized>(
    candidates: &mut [Candidate],
    rng: &mut R,
) -> Option<ActionKind> {
    if candidates.is_empty() {
        return None;
    }
    candidates.sort_unstable_by(|a, b| a.kind.as_str().cmp(b.kind.as_str()));

    let mut prefix = Vec::with_capacity(candidates.len());
    let mut total = 0.0;
    for candidate in candidates.iter() {
        total += candidate.score.max(0.0);
        prefix.push(total);
    }
    if total <= 0.0 {
        return None;
    }

    let draw = rng.random_range(0.0..total);
    let idx = prefix.partition_point(|&cum| cum <= draw);
    candidates.get(idx.min(candidates.len() - 1)).map(|c| c.kind)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use capsim_types::{
        AgentId, CoverageLevel, Profession, PurchaseTimestamps, RunId, Sentiment, TrendId,
    };
    use chrono::Utc;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    fn make_agent(profession: Profession) -> AgentState {
        AgentState {
            id: AgentId::new(),
            simulation_id: RunId::new(),
            profession,
            financial_capability: 3.0,
            trend_receptivity: 4.0,
            social_status: 3.0,
            energy_level: 5.0,
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

    fn make_trend(topic: TrendTopic, virality: f64) -> Trend {
        Trend {
            id: TrendId::new(),
            simulation_id: RunId::new(),
            topic,
            originator_id: AgentId::new(),
            parent_trend_id: None,
            created_at_min: 0.0,
            base_virality: virality,
            coverage_level: CoverageLevel::Middle,
            total_interactions: 0,
            sentiment: Sentiment::Positive,
            last_interaction_ts: 0.0,
        }
    }

    #[test]
    fn post_score_uses_trend_context() {
        let agent = make_agent(Profession::Blogger);
        let trend = make_trend(TrendTopic::Culture, 4.0);
        let rules = ActionRules::default();

        let candidates =
            score_candidates(&agent, 10.0, Some(TrendContext { trend: &trend }), &rules);
        let post = candidates
            .iter()
            .find(|c| c.kind == ActionKind::Post)
            .unwrap();
        // 4.0 * 4.0 / 25 * (1 + 3/10) = 0.832
        assert!((post.score - 0.832).abs() < 1e-9);
    }

    #[test]
    fn post_score_falls_back_to_baseline() {
        let agent = make_agent(Profession::Blogger);
        let rules = ActionRules::default();
        let candidates = score_candidates(&agent, 10.0, None, &rules);
        let post = candidates
            .iter()
            .find(|c| c.kind == ActionKind::Post)
            .unwrap();
        assert_eq!(post.score, rules.post_baseline_score);
    }

    #[test]
    fn economic_trend_boosts_purchases() {
        let agent = make_agent(Profession::Businessman);
        let rules = ActionRules::default();
        let economic = make_trend(TrendTopic::Economic, 3.0);
        let culture = make_trend(TrendTopic::Culture, 3.0);

        let boosted = score_candidates(
            &agent,
            10.0,
            Some(TrendContext { trend: &economic }),
            &rules,
        );
        let flat = score_candidates(
            &agent,
            10.0,
            Some(TrendContext { trend: &culture }),
            &rules,
        );

        let boosted_score = boosted
            .iter()
            .find(|c| c.kind == ActionKind::Purchase(PurchaseLevel::L1))
            .unwrap()
            .score;
        let flat_score = flat
            .iter()
            .find(|c| c.kind == ActionKind::Purchase(PurchaseLevel::L1))
            .unwrap()
            .score;
        assert!((boosted_score - flat_score * 1.2).abs() < 1e-9);
    }

    #[test]
    fn self_dev_score_grows_as_energy_drops() {
        let rules = ActionRules::default();
        let mut agent = make_agent(Profession::Worker);
        agent.energy_level = 5.0;
        let full = score_candidates(&agent, 10.0, None, &rules);
        assert!(full
            .iter()
            .find(|c| c.kind == ActionKind::SelfDev)
            .is_none_or(|c| c.score == 0.0));

        agent.energy_level = 1.0;
        let tired = score_candidates(&agent, 10.0, None, &rules);
        let score = tired
            .iter()
            .find(|c| c.kind == ActionKind::SelfDev)
            .unwrap()
            .score;
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn threshold_filters_weak_candidates() {
        let mut rules = ActionRules::default();
        rules.score_threshold = 10.0; // nothing can clear this
        let agent = make_agent(Profession::Teacher);
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(decide_action(&agent, 10.0, None, &rules, &mut rng), None);
    }

    #[test]
    fn selection_is_deterministic_per_seed() {
        let rules = ActionRules::default();
        let agent = make_agent(Profession::Businessman);
        let trend = make_trend(TrendTopic::Economic, 4.5);

        let mut first = SmallRng::seed_from_u64(99);
        let mut second = SmallRng::seed_from_u64(99);
        for _ in 0..20 {
            let a = decide_action(
                &agent,
                10.0,
                Some(TrendContext { trend: &trend }),
                &rules,
                &mut first,
            );
            let b = decide_action(
                &agent,
                10.0,
                Some(TrendContext { trend: &trend }),
                &rules,
                &mut second,
            );
            assert_eq!(a, b);
        }
    }

    #[test]
    fn no_gates_no_action() {
        let rules = ActionRules::default();
        let mut agent = make_agent(Profession::Worker);
        // Outside work hours, broke, exhausted, over the purchase limit.
        agent.energy_level = 0.0;
        agent.time_budget = 0.0;
        agent.financial_capability = 0.0;
        agent.purchases_today = rules.max_purchases_per_day;
        let mut rng = SmallRng::seed_from_u64(5);
        assert_eq!(decide_action(&agent, 10.0, None, &rules, &mut rng), None);
    }

    #[test]
    fn weighted_pick_respects_weights() {
        // With one dominant candidate the pick should almost always be it.
        let mut rng = SmallRng::seed_from_u64(3);
        let mut dominant_hits = 0;
        for _ in 0..200 {
            let mut candidates = vec![
                Candidate {
                    kind: ActionKind::Post,
                    score: 100.0,
                },
                Candidate {
                    kind: ActionKind::SelfDev,
                    score: 0.01,
                },
            ];
            if weighted_pick(&mut candidates, &mut rng) == Some(ActionKind::Post) {
                dominant_hits += 1;
            }
        }
        assert!(dominant_hits > 190);
    }
}
