//! Core entity structs for the CAPSIM simulation.
//!
//! Plain data carriers shared between the agent model, the engine, and
//! the persistence layer. Behavior (gates, scoring, virality calculus)
//! lives in `capsim-agents`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{
    AttributeName, ChangeReason, CoverageLevel, InterestCategory, Profession, PurchaseLevel,
    RunStatus, Sentiment, TrendTopic,
};
use crate::ids::{AgentId, EventId, RunId, TrendId};

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Timestamps of the most recent purchase per level, in sim-minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PurchaseTimestamps {
    /// Last L1 purchase, if any.
    pub l1: Option<f64>,
    /// Last L2 purchase, if any.
    pub l2: Option<f64>,
    /// Last L3 purchase, if any.
    pub l3: Option<f64>,
}

impl PurchaseTimestamps {
    /// Timestamp of the last purchase at `level`.
    pub const fn get(&self, level: PurchaseLevel) -> Option<f64> {
        match level {
            PurchaseLevel::L1 => self.l1,
            PurchaseLevel::L2 => self.l2,
            PurchaseLevel::L3 => self.l3,
        }
    }

    /// Record a purchase at `level`.
    pub const fn set(&mut self, level: PurchaseLevel, ts: f64) {
        match level {
            PurchaseLevel::L1 => self.l1 = Some(ts),
            PurchaseLevel::L2 => self.l2 = Some(ts),
            PurchaseLevel::L3 => self.l3 = Some(ts),
        }
    }
}

/// Full mutable state of one simulated agent.
///
/// Scalar attributes stay in `[0.0, 5.0]`; `time_budget` is additionally
/// quantised to 0.5 steps. All clamping happens in the agent model's
/// `apply` routine, never here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Unique agent identifier.
    pub id: AgentId,
    /// The run this agent belongs to.
    pub simulation_id: RunId,
    /// Profession, fixed at spawn.
    pub profession: Profession,
    /// Spending power, `[0, 5]`.
    pub financial_capability: f64,
    /// Susceptibility to trend influence, `[0, 5]`.
    pub trend_receptivity: f64,
    /// Standing among other agents, `[0, 5]`.
    pub social_status: f64,
    /// Energy available for actions, `[0, 5]`.
    pub energy_level: f64,
    /// Daily time budget, `[0, 5]` in 0.5 steps.
    pub time_budget: f64,
    /// Interest strength per category, `>= 0`.
    pub interests: BTreeMap<InterestCategory, f64>,
    /// Sim-minute of the last exposure to each trend.
    pub exposure_history: BTreeMap<TrendId, f64>,
    /// Purchases made since the last daily reset.
    pub purchases_today: u32,
    /// Sim-minute of the last published post, if any.
    pub last_post_ts: Option<f64>,
    /// Sim-minute of the last self-development action, if any.
    pub last_selfdev_ts: Option<f64>,
    /// Per-level purchase timestamps.
    pub last_purchase_ts: PurchaseTimestamps,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
}

impl AgentState {
    /// Read the current value of a scalar attribute.
    pub fn attribute(&self, name: AttributeName) -> f64 {
        match name {
            AttributeName::FinancialCapability => self.financial_capability,
            AttributeName::TrendReceptivity => self.trend_receptivity,
            AttributeName::SocialStatus => self.social_status,
            AttributeName::EnergyLevel => self.energy_level,
            AttributeName::TimeBudget => self.time_budget,
        }
    }

    /// Overwrite a scalar attribute. The caller is responsible for
    /// clamping and quantisation.
    pub fn set_attribute(&mut self, name: AttributeName, value: f64) {
        match name {
            AttributeName::FinancialCapability => self.financial_capability = value,
            AttributeName::TrendReceptivity => self.trend_receptivity = value,
            AttributeName::SocialStatus => self.social_status = value,
            AttributeName::EnergyLevel => self.energy_level = value,
            AttributeName::TimeBudget => self.time_budget = value,
        }
    }

    /// Interest strength in a category, defaulting to a neutral 2.5
    /// when the category was never initialised.
    pub fn interest(&self, category: InterestCategory) -> f64 {
        self.interests.get(&category).copied().unwrap_or(2.5)
    }
}

// ---------------------------------------------------------------------------
// Trend
// ---------------------------------------------------------------------------

/// An information trend created by a published post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    /// Unique trend identifier.
    pub id: TrendId,
    /// The run this trend belongs to.
    pub simulation_id: RunId,
    /// Topic of the trend.
    pub topic: TrendTopic,
    /// The agent that published the originating post.
    pub originator_id: AgentId,
    /// Parent trend when this is a reply post.
    pub parent_trend_id: Option<TrendId>,
    /// Sim-minute of creation.
    pub created_at_min: f64,
    /// Base virality score, `[0, 5]`.
    pub base_virality: f64,
    /// Audience-size class.
    pub coverage_level: CoverageLevel,
    /// Monotonic interaction counter.
    pub total_interactions: u64,
    /// Emotional tone.
    pub sentiment: Sentiment,
    /// Sim-minute of the last interaction (creation time initially).
    pub last_interaction_ts: f64,
}

// ---------------------------------------------------------------------------
// Simulation run
// ---------------------------------------------------------------------------

/// Metadata row for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    /// Unique run identifier.
    pub id: RunId,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
    /// Planned horizon in sim-minutes.
    pub horizon_min: f64,
    /// Number of agents spawned at bootstrap.
    pub num_agents: u32,
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Snapshot of the effective configuration.
    pub configuration: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Persistence records
// ---------------------------------------------------------------------------

/// Append-only record of one scalar attribute mutation.
///
/// The natural key `(agent_id, attribute, sim_minute)` makes re-delivery
/// after a partial batch failure idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The mutated agent.
    pub agent_id: AgentId,
    /// Which attribute changed.
    pub attribute: AttributeName,
    /// Value before the mutation.
    pub old_value: f64,
    /// Value after clamping and quantisation.
    pub new_value: f64,
    /// `new_value - old_value`.
    pub delta: f64,
    /// Sim-minute of the mutation.
    pub sim_minute: f64,
    /// Why the attribute changed.
    pub reason: ChangeReason,
    /// The trend that caused the change, if influence-driven.
    pub source_trend_id: Option<TrendId>,
}

/// Audit record of one processed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAudit {
    /// The processed event's id (idempotence key).
    pub event_id: EventId,
    /// The run the event belongs to.
    pub simulation_id: RunId,
    /// Event kind name.
    pub kind: String,
    /// Queue priority at dispatch.
    pub priority: u8,
    /// Sim-minute the event fired at.
    pub sim_minute: f64,
    /// Primary agent involved, if any.
    pub agent_id: Option<AgentId>,
    /// Trend involved, if any.
    pub trend_id: Option<TrendId>,
    /// Kind-specific payload.
    pub payload: serde_json::Value,
    /// Wall-clock processing duration.
    pub processing_ms: f64,
}

/// Per-(topic, day) aggregate persisted by the SAVE_DAILY_TREND handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTrendSummary {
    /// The run the summary belongs to.
    pub simulation_id: RunId,
    /// Aggregated topic.
    pub topic: TrendTopic,
    /// Simulation day index (0-based).
    pub day: u32,
    /// Sum of interactions across the topic's active trends.
    pub total_interactions: u64,
    /// Mean current virality across the topic's active trends.
    pub avg_virality: f64,
    /// Distinct originators among the topic's active trends.
    pub unique_authors: u32,
    /// The most viral trend of the day, if any.
    pub top_trend_id: Option<TrendId>,
    /// Relative virality change versus the previous day, if known.
    pub pct_change_virality: Option<f64>,
}
