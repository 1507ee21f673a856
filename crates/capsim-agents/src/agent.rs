//! Attribute math and gate predicates for one agent.
//!
//! Every scalar mutation flows through [`apply_delta`], which clamps
//! into `[0, 5]`, quantises the time budget to 0.5 steps, and produces
//! the history record the repository appends. Gates are pure predicates
//! over the current state; they are evaluated once at decision time and
//! re-checked at execution time.

use capsim_types::{
    AgentState, AttributeChange, AttributeName, ChangeReason, PurchaseLevel, TrendId,
};

use crate::config::{ActionEffects, ActionRules};
use crate::error::AgentError;

/// Sim-minutes per simulated day.
pub const MINUTES_PER_DAY: f64 = 1440.0;

/// Length of the daily active window in sim-minutes (08:00-24:00).
const ACTIVE_WINDOW_MIN: f64 = 960.0;

/// Lower bound of every scalar attribute.
const ATTR_MIN: f64 = 0.0;
/// Upper bound of every scalar attribute.
const ATTR_MAX: f64 = 5.0;

/// Whether agents are active at sim-minute `t`.
///
/// Sim-minute 0 maps to 08:00 on the human clock; the active window
/// runs 08:00-24:00, so the last 480 sim-minutes of each sim-day
/// (human 00:00-08:00) are quiet hours.
pub fn is_work_hours(t: f64) -> bool {
    t.rem_euclid(MINUTES_PER_DAY) < ACTIVE_WINDOW_MIN
}

/// Format sim-minute `t` as a human clock string (`HH:MM`).
///
/// The simulation starts at 08:00, so `human = (t + 480) mod 1440`.
pub fn human_clock(t: f64) -> String {
    let total = (t + 480.0).rem_euclid(MINUTES_PER_DAY) as u32;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Zero-based index of the simulated day containing sim-minute `t`.
pub fn day_index(t: f64) -> u32 {
    (t / MINUTES_PER_DAY).floor().max(0.0) as u32
}

/// Quantise a time-budget value to 0.5 steps.
pub fn quantize_time_budget(value: f64) -> f64 {
    (value * 2.0).round() / 2.0
}

/// Apply a delta to one scalar attribute of `agent`.
///
/// Clamps the result into `[0, 5]`, quantises `time_budget` to 0.5,
/// and returns the history record when the stored value actually moved
/// (a delta fully absorbed by clamping or quantisation produces no
/// record). The pre-clamp value is validated defensively: a NaN input
/// or NaN stored value is an invariant violation.
///
/// # Errors
///
/// Returns [`AgentError::InvariantViolation`] when the stored value or
/// the delta is not a finite number.
pub fn apply_delta(
    agent: &mut AgentState,
    attribute: AttributeName,
    delta: f64,
    reason: ChangeReason,
    source_trend_id: Option<TrendId>,
    sim_minute: f64,
) -> Result<Option<AttributeChange>, AgentError> {
    let old = agent.attribute(attribute);
    if !old.is_finite() || !delta.is_finite() {
        return Err(AgentError::InvariantViolation {
            agent_id: agent.id,
            context: format!("non-finite {attribute}: value {old}, delta {delta}"),
        });
    }

    let mut new = (old + delta).clamp(ATTR_MIN, ATTR_MAX);
    if attribute == AttributeName::TimeBudget {
        new = quantize_time_budget(new);
    }

    if (new - old).abs() < f64::EPSILON {
        return Ok(None);
    }

    agent.set_attribute(attribute, new);
    Ok(Some(AttributeChange {
        agent_id: agent.id,
        attribute,
        old_value: old,
        new_value: new,
        delta: new - old,
        sim_minute,
        reason,
        source_trend_id,
    }))
}

/// Whether `agent` may publish a post at sim-minute `t`.
///
/// Requires the post cooldown to have elapsed, enough energy and time
/// budget to cover the post costs, and the active-hours window.
pub fn can_post(agent: &AgentState, t: f64, rules: &ActionRules) -> bool {
    let cooldown_ok = agent
        .last_post_ts
        .is_none_or(|last| t - last >= rules.post_cooldown_min);

    cooldown_ok
        && agent.energy_level >= ActionEffects::cost(&rules.effects.post, AttributeName::EnergyLevel)
        && agent.time_budget >= ActionEffects::cost(&rules.effects.post, AttributeName::TimeBudget)
        && is_work_hours(t)
}

/// Whether `agent` may perform self-development at sim-minute `t`.
pub fn can_self_dev(agent: &AgentState, t: f64, rules: &ActionRules) -> bool {
    let cooldown_ok = agent
        .last_selfdev_ts
        .is_none_or(|last| t - last >= rules.self_dev_cooldown_min);

    cooldown_ok
        && agent.time_budget
            >= ActionEffects::cost(&rules.effects.self_dev, AttributeName::TimeBudget)
}

/// Whether `agent` may purchase at `level` at sim-minute `t`.
///
/// Requires headroom under the daily purchase limit, the level's
/// financial threshold, and the optional per-level cooldown.
pub fn can_purchase(agent: &AgentState, t: f64, level: PurchaseLevel, rules: &ActionRules) -> bool {
    if agent.purchases_today >= rules.max_purchases_per_day {
        return false;
    }
    if agent.financial_capability < level.threshold() {
        return false;
    }
    match (
        rules.purchase_cooldown_min.get(&level),
        agent.last_purchase_ts.get(level),
    ) {
        (Some(cooldown), Some(last)) => t - last >= *cooldown,
        _ => true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use capsim_types::{AgentId, Profession, PurchaseTimestamps, RunId};
    use chrono::Utc;

    use super::*;

    fn make_agent() -> AgentState {
        AgentState {
            id: AgentId::new(),
            simulation_id: RunId::new(),
            profession: Profession::Developer,
            financial_capability: 3.0,
            trend_receptivity: 3.0,
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

    #[test]
    fn work_hours_window() {
        // Sim-minute 0 is 08:00; the first 960 minutes are active.
        assert!(is_work_hours(0.0));
        assert!(is_work_hours(10.0));
        assert!(is_work_hours(959.0));
        // Human 00:00-08:00 is quiet.
        assert!(!is_work_hours(960.0));
        assert!(!is_work_hours(1439.0));
        // Next day wraps.
        assert!(is_work_hours(1440.0));
        assert!(!is_work_hours(1440.0 + 1000.0));
    }

    #[test]
    fn human_clock_formatting() {
        assert_eq!(human_clock(0.0), "08:00");
        assert_eq!(human_clock(120.0), "10:00");
        assert_eq!(human_clock(960.0), "00:00");
        assert_eq!(human_clock(1440.0), "08:00");
    }

    #[test]
    fn day_index_boundaries() {
        assert_eq!(day_index(0.0), 0);
        assert_eq!(day_index(1439.9), 0);
        assert_eq!(day_index(1440.0), 1);
        assert_eq!(day_index(2880.0), 2);
    }

    #[test]
    fn apply_clamps_at_bounds() {
        let mut agent = make_agent();
        let change = apply_delta(
            &mut agent,
            AttributeName::EnergyLevel,
            2.0,
            ChangeReason::EnergyRecovery,
            None,
            10.0,
        )
        .unwrap();
        // Energy was already 5.0; the delta is fully clamped away.
        assert!(change.is_none());
        assert_eq!(agent.energy_level, 5.0);

        agent.energy_level = 0.3;
        let change = apply_delta(
            &mut agent,
            AttributeName::EnergyLevel,
            -1.0,
            ChangeReason::PostAction,
            None,
            20.0,
        )
        .unwrap()
        .unwrap();
        assert_eq!(agent.energy_level, 0.0);
        assert_eq!(change.old_value, 0.3);
        assert_eq!(change.new_value, 0.0);
        assert_eq!(change.delta, -0.3);
    }

    #[test]
    fn apply_quantizes_time_budget() {
        let mut agent = make_agent();
        let change = apply_delta(
            &mut agent,
            AttributeName::TimeBudget,
            -0.20,
            ChangeReason::PostAction,
            None,
            10.0,
        )
        .unwrap();
        // 3.0 - 0.2 = 2.8, quantised back to 3.0: no stored change.
        assert!(change.is_none());
        assert_eq!(agent.time_budget, 3.0);

        let change = apply_delta(
            &mut agent,
            AttributeName::TimeBudget,
            -0.30,
            ChangeReason::PostAction,
            None,
            11.0,
        )
        .unwrap()
        .unwrap();
        assert_eq!(agent.time_budget, 2.5);
        assert_eq!(change.delta, -0.5);
    }

    #[test]
    fn apply_rejects_non_finite() {
        let mut agent = make_agent();
        let result = apply_delta(
            &mut agent,
            AttributeName::SocialStatus,
            f64::NAN,
            ChangeReason::PostEffect,
            None,
            5.0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn history_record_carries_source_trend() {
        let mut agent = make_agent();
        let trend_id = TrendId::new();
        let change = apply_delta(
            &mut agent,
            AttributeName::TrendReceptivity,
            0.01,
            ChangeReason::TrendInfluence,
            Some(trend_id),
            77.0,
        )
        .unwrap()
        .unwrap();
        assert_eq!(change.source_trend_id, Some(trend_id));
        assert_eq!(change.reason, ChangeReason::TrendInfluence);
        assert_eq!(change.sim_minute, 77.0);
    }

    #[test]
    fn post_gate_respects_cooldown() {
        let rules = ActionRules::default();
        let mut agent = make_agent();
        assert!(can_post(&agent, 10.0, &rules));

        agent.last_post_ts = Some(10.0);
        assert!(!can_post(&agent, 50.0, &rules));
        assert!(can_post(&agent, 70.0, &rules));
    }

    #[test]
    fn post_gate_requires_energy_and_time() {
        let rules = ActionRules::default();
        let mut agent = make_agent();
        agent.energy_level = 0.4; // below the 0.5 post cost
        assert!(!can_post(&agent, 10.0, &rules));

        agent.energy_level = 5.0;
        agent.time_budget = 0.0;
        assert!(!can_post(&agent, 10.0, &rules));
    }

    #[test]
    fn post_gate_blocked_outside_work_hours() {
        let rules = ActionRules::default();
        let agent = make_agent();
        assert!(!can_post(&agent, 1000.0, &rules));
    }

    #[test]
    fn self_dev_gate() {
        let rules = ActionRules::default();
        let mut agent = make_agent();
        assert!(can_self_dev(&agent, 10.0, &rules));

        agent.last_selfdev_ts = Some(10.0);
        assert!(!can_self_dev(&agent, 30.0, &rules));
        assert!(can_self_dev(&agent, 40.0, &rules));

        agent.last_selfdev_ts = None;
        agent.time_budget = 0.5; // below the 1.0 self-dev cost
        assert!(!can_self_dev(&agent, 10.0, &rules));
    }

    #[test]
    fn purchase_gate_thresholds() {
        let rules = ActionRules::default();
        let mut agent = make_agent();
        agent.financial_capability = 1.0;
        assert!(can_purchase(&agent, 10.0, PurchaseLevel::L1, &rules));
        assert!(can_purchase(&agent, 10.0, PurchaseLevel::L2, &rules));
        assert!(!can_purchase(&agent, 10.0, PurchaseLevel::L3, &rules));
    }

    #[test]
    fn purchase_gate_daily_limit() {
        let rules = ActionRules::default();
        let mut agent = make_agent();
        agent.purchases_today = rules.max_purchases_per_day;
        assert!(!can_purchase(&agent, 10.0, PurchaseLevel::L1, &rules));
    }

    #[test]
    fn purchase_gate_optional_cooldown() {
        let mut rules = ActionRules::default();
        rules.purchase_cooldown_min.insert(PurchaseLevel::L1, 120.0);

        let mut agent = make_agent();
        agent.last_purchase_ts.set(PurchaseLevel::L1, 100.0);
        assert!(!can_purchase(&agent, 150.0, PurchaseLevel::L1, &rules));
        assert!(can_purchase(&agent, 220.0, PurchaseLevel::L1, &rules));
        // L2 has no cooldown configured.
        assert!(can_purchase(&agent, 150.0, PurchaseLevel::L2, &rules));
    }

    #[test]
    fn quantize_rounds_to_half_steps() {
        assert_eq!(quantize_time_budget(2.74), 2.5);
        assert_eq!(quantize_time_budget(2.76), 3.0);
        assert_eq!(quantize_time_budget(0.24), 0.0);
        assert_eq!(quantize_time_budget(4.99), 5.0);
    }
}
