//! Scheduled event kinds and their payloads.
//!
//! Events are immutable once enqueued: the queue stores `(priority,
//! timestamp, payload)` and the engine dispatches on the payload kind.
//! Priorities follow the three-band scheme: system maintenance events
//! outrank agent actions, which outrank everything else.

use serde::{Deserialize, Serialize};

use crate::enums::{PurchaseLevel, TrendTopic};
use crate::ids::{AgentId, TrendId};

/// Queue priority of system maintenance events (never evicted).
pub const PRIORITY_SYSTEM: u8 = 100;
/// Queue priority of agent actions and influence propagation.
pub const PRIORITY_AGENT_ACTION: u8 = 50;
/// Lowest queue priority.
pub const PRIORITY_LOW: u8 = 0;

/// The payload of a scheduled simulation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    /// An agent publishes a post on `topic`, creating a trend.
    PublishPost {
        /// The posting agent.
        agent_id: AgentId,
        /// Topic of the post.
        topic: TrendTopic,
        /// The trend this post replies to, if any.
        parent_trend_id: Option<TrendId>,
    },
    /// An agent makes a purchase at `level`.
    Purchase {
        /// The purchasing agent.
        agent_id: AgentId,
        /// Purchase tier.
        level: PurchaseLevel,
    },
    /// An agent spends time on self-development.
    SelfDev {
        /// The acting agent.
        agent_id: AgentId,
    },
    /// Apply a trend to its audience and reward the author.
    TrendInfluence {
        /// The trend to propagate.
        trend_id: TrendId,
    },
    /// Periodic energy restoration for every agent.
    EnergyRecovery,
    /// Daily counter and time-budget reset for every agent.
    DailyReset,
    /// Persist per-topic daily aggregates, then archive stale trends.
    SaveDailyTrend,
    /// External legislative event. Audited and logged only.
    Law {
        /// Kind of legislation.
        law_type: String,
        /// Magnitude of the change.
        impact_factor: f64,
    },
    /// External weather event. Audited and logged only.
    Weather {
        /// Kind of weather.
        weather_type: String,
        /// Magnitude of the conditions.
        severity: f64,
    },
}

impl SimEvent {
    /// Queue priority band for this event kind.
    pub const fn priority(&self) -> u8 {
        match self {
            Self::EnergyRecovery
            | Self::DailyReset
            | Self::SaveDailyTrend
            | Self::Law { .. }
            | Self::Weather { .. } => PRIORITY_SYSTEM,
            Self::PublishPost { .. }
            | Self::Purchase { .. }
            | Self::SelfDev { .. }
            | Self::TrendInfluence { .. } => PRIORITY_AGENT_ACTION,
        }
    }

    /// Stable kind name used in audit rows and metrics labels.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PublishPost { .. } => "PUBLISH_POST",
            Self::Purchase {
                level: PurchaseLevel::L1,
                ..
            } => "PURCHASE_L1",
            Self::Purchase {
                level: PurchaseLevel::L2,
                ..
            } => "PURCHASE_L2",
            Self::Purchase {
                level: PurchaseLevel::L3,
                ..
            } => "PURCHASE_L3",
            Self::SelfDev { .. } => "SELF_DEV",
            Self::TrendInfluence { .. } => "TREND_INFLUENCE",
            Self::EnergyRecovery => "ENERGY_RECOVERY",
            Self::DailyReset => "DAILY_RESET",
            Self::SaveDailyTrend => "SAVE_DAILY_TREND",
            Self::Law { .. } => "LAW",
            Self::Weather { .. } => "WEATHER",
        }
    }

    /// The primary agent involved, if any.
    pub const fn agent_id(&self) -> Option<AgentId> {
        match self {
            Self::PublishPost { agent_id, .. }
            | Self::Purchase { agent_id, .. }
            | Self::SelfDev { agent_id } => Some(*agent_id),
            _ => None,
        }
    }

    /// The trend involved, if any.
    pub const fn trend_id(&self) -> Option<TrendId> {
        match self {
            Self::TrendInfluence { trend_id } => Some(*trend_id),
            Self::PublishPost {
                parent_trend_id, ..
            } => *parent_trend_id,
            _ => None,
        }
    }

    /// Whether this is a system maintenance event.
    pub const fn is_system(&self) -> bool {
        self.priority() == PRIORITY_SYSTEM
    }
}
