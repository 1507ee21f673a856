//! Enumeration types for the CAPSIM simulation.
//!
//! Professions, trend topics, interest categories, sentiment, coverage
//! levels, run lifecycle states, and the attribute / reason vocabularies
//! used by the mutation history.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Professions
// ---------------------------------------------------------------------------

/// An agent's profession.
///
/// The profession determines attribute spawn ranges, interest ranges,
/// topic affinity, and the shop-weight multiplier used in purchase
/// scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Profession {
    /// Retail clerk with high economic interest.
    ShopClerk,
    /// Manual worker.
    Worker,
    /// Software developer with strong science affinity.
    Developer,
    /// Politician with high social status.
    Politician,
    /// Content creator receptive to every trend.
    Blogger,
    /// Business owner with high financial capability.
    Businessman,
    /// Spiritual guide.
    SpiritualMentor,
    /// Philosopher.
    Philosopher,
    /// Unemployed, time-rich and cash-poor.
    Unemployed,
    /// Teacher, the most common profession in a run.
    Teacher,
    /// Artist with high creativity interest.
    Artist,
    /// Medical doctor with a tight time budget.
    Doctor,
}

impl Profession {
    /// All twelve professions in declaration order.
    pub const ALL: [Self; 12] = [
        Self::ShopClerk,
        Self::Worker,
        Self::Developer,
        Self::Politician,
        Self::Blogger,
        Self::Businessman,
        Self::SpiritualMentor,
        Self::Philosopher,
        Self::Unemployed,
        Self::Teacher,
        Self::Artist,
        Self::Doctor,
    ];

    /// Stable string name used in metrics labels and persisted rows.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShopClerk => "ShopClerk",
            Self::Worker => "Worker",
            Self::Developer => "Developer",
            Self::Politician => "Politician",
            Self::Blogger => "Blogger",
            Self::Businessman => "Businessman",
            Self::SpiritualMentor => "SpiritualMentor",
            Self::Philosopher => "Philosopher",
            Self::Unemployed => "Unemployed",
            Self::Teacher => "Teacher",
            Self::Artist => "Artist",
            Self::Doctor => "Doctor",
        }
    }
}

impl core::fmt::Display for Profession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Profession {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown profession: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

/// Topic of an information trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrendTopic {
    /// Economic and financial topics.
    Economic,
    /// Health, wellness, and medical topics.
    Health,
    /// Spiritual, religious, and philosophical topics.
    Spiritual,
    /// Conspiracy theories and social distrust.
    Conspiracy,
    /// Scientific discoveries and educational content.
    Science,
    /// Cultural events, arts, and creative expression.
    Culture,
    /// Sports events and physical activities.
    Sport,
}

impl TrendTopic {
    /// All seven topics in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Economic,
        Self::Health,
        Self::Spiritual,
        Self::Conspiracy,
        Self::Science,
        Self::Culture,
        Self::Sport,
    ];

    /// Stable string name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Economic => "Economic",
            Self::Health => "Health",
            Self::Spiritual => "Spiritual",
            Self::Conspiracy => "Conspiracy",
            Self::Science => "Science",
            Self::Culture => "Culture",
            Self::Sport => "Sport",
        }
    }
}

impl core::fmt::Display for TrendTopic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the six interest categories every agent carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InterestCategory {
    /// Money, markets, and material security.
    Economics,
    /// Health and personal wellbeing.
    Wellbeing,
    /// Religion and spiritual practice.
    Spirituality,
    /// Science and education.
    Knowledge,
    /// Arts and creative expression.
    Creativity,
    /// Community, politics, and social affairs.
    Society,
}

impl InterestCategory {
    /// All six categories in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Economics,
        Self::Wellbeing,
        Self::Spirituality,
        Self::Knowledge,
        Self::Creativity,
        Self::Society,
    ];
}

/// Emotional tone of a trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentiment {
    /// Uplifting content; readers gain energy.
    Positive,
    /// Distressing content; readers lose energy.
    Negative,
}

impl Sentiment {
    /// +1 for positive, -1 for negative. Used by the author post-effect.
    pub const fn sign(self) -> f64 {
        match self {
            Self::Positive => 1.0,
            Self::Negative => -1.0,
        }
    }
}

/// Discrete audience-size class of a trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CoverageLevel {
    /// Reaches up to 30% of the eligible audience.
    Low,
    /// Reaches up to 60% of the eligible audience.
    Middle,
    /// Reaches the whole eligible audience.
    High,
}

impl CoverageLevel {
    /// Fraction of the eligible audience this coverage level reaches.
    pub const fn audience_share(self) -> f64 {
        match self {
            Self::Low => 0.30,
            Self::Middle => 0.60,
            Self::High => 1.0,
        }
    }

    /// Multiplier applied to the reader time-budget drain.
    pub const fn time_factor(self) -> f64 {
        match self {
            Self::Low => 0.2,
            Self::Middle => 0.4,
            Self::High => 0.6,
        }
    }
}

// ---------------------------------------------------------------------------
// Run lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// Bootstrap in progress; agents not yet live.
    Initializing,
    /// Main loop active.
    Running,
    /// Shutdown requested; draining due events.
    Stopping,
    /// Finished normally (horizon reached or clean shutdown).
    Completed,
    /// Aborted after an invariant violation.
    Failed,
    /// Shutdown drain exceeded its timeout.
    ForceStopped,
}

impl RunStatus {
    /// Whether this status allows another run to start (I5).
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::ForceStopped)
    }

    /// Stable string name used in persisted rows.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::ForceStopped => "FORCE_STOPPED",
        }
    }
}

// ---------------------------------------------------------------------------
// Actions and mutation history
// ---------------------------------------------------------------------------

/// Purchase tier. Thresholds on `financial_capability` gate each level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PurchaseLevel {
    /// Small everyday purchase.
    L1,
    /// Mid-range purchase.
    L2,
    /// Major purchase.
    L3,
}

impl PurchaseLevel {
    /// All levels, cheapest first.
    pub const ALL: [Self; 3] = [Self::L1, Self::L2, Self::L3];

    /// Minimum `financial_capability` required to consider this level.
    pub const fn threshold(self) -> f64 {
        match self {
            Self::L1 => 0.05,
            Self::L2 => 0.50,
            Self::L3 => 2.00,
        }
    }

    /// Stable string name used in metrics labels.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::L1 => "L1",
            Self::L2 => "L2",
            Self::L3 => "L3",
        }
    }
}

/// The action an agent chose to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Publish a post, creating a trend.
    Post,
    /// Spend time on self-development.
    SelfDev,
    /// Make a purchase at the given level.
    Purchase(PurchaseLevel),
}

impl ActionKind {
    /// Stable string name used in metrics labels and candidate
    /// tie-breaking (sorted lexicographically).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "Post",
            Self::SelfDev => "SelfDev",
            Self::Purchase(PurchaseLevel::L1) => "Purchase_L1",
            Self::Purchase(PurchaseLevel::L2) => "Purchase_L2",
            Self::Purchase(PurchaseLevel::L3) => "Purchase_L3",
        }
    }
}

/// A mutable scalar attribute of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeName {
    /// Spending power, gates purchases.
    FinancialCapability,
    /// Susceptibility to trend influence.
    TrendReceptivity,
    /// Standing among other agents.
    SocialStatus,
    /// Available energy for actions.
    EnergyLevel,
    /// Daily time budget, quantised to 0.5.
    TimeBudget,
}

impl AttributeName {
    /// Stable snake_case name used in persisted history rows.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FinancialCapability => "financial_capability",
            Self::TrendReceptivity => "trend_receptivity",
            Self::SocialStatus => "social_status",
            Self::EnergyLevel => "energy_level",
            Self::TimeBudget => "time_budget",
        }
    }
}

impl core::fmt::Display for AttributeName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AttributeName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "financial_capability" => Ok(Self::FinancialCapability),
            "trend_receptivity" => Ok(Self::TrendReceptivity),
            "social_status" => Ok(Self::SocialStatus),
            "energy_level" => Ok(Self::EnergyLevel),
            "time_budget" => Ok(Self::TimeBudget),
            other => Err(format!("unknown attribute: {other}")),
        }
    }
}

/// Why an attribute changed. Every history record carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeReason {
    /// Cost/benefit of publishing a post.
    PostAction,
    /// Cost/benefit of self-development.
    SelfDevAction,
    /// Cost/benefit of a purchase.
    PurchaseAction,
    /// A trend reached this agent as a reader.
    TrendInfluence,
    /// Aggregate author reward after an influence pass.
    PostEffect,
    /// Daily counter and time-budget reset.
    DailyReset,
    /// Periodic energy recovery.
    EnergyRecovery,
}

impl ChangeReason {
    /// Stable string name used in persisted history rows.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PostAction => "PostAction",
            Self::SelfDevAction => "SelfDevAction",
            Self::PurchaseAction => "PurchaseAction",
            Self::TrendInfluence => "TrendInfluence",
            Self::PostEffect => "PostEffect",
            Self::DailyReset => "DailyReset",
            Self::EnergyRecovery => "EnergyRecovery",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profession_roundtrip() {
        for p in Profession::ALL {
            let parsed: Profession = p.as_str().parse().unwrap_or(Profession::Worker);
            assert_eq!(parsed, p);
        }
    }

    #[test]
    fn purchase_thresholds_ascend() {
        assert!(PurchaseLevel::L1.threshold() < PurchaseLevel::L2.threshold());
        assert!(PurchaseLevel::L2.threshold() < PurchaseLevel::L3.threshold());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!RunStatus::Initializing.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Stopping.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::ForceStopped.is_terminal());
    }

    #[test]
    fn sentiment_sign() {
        assert_eq!(Sentiment::Positive.sign(), 1.0);
        assert_eq!(Sentiment::Negative.sign(), -1.0);
    }

    #[test]
    fn coverage_shares_ascend() {
        assert!(CoverageLevel::Low.audience_share() < CoverageLevel::Middle.audience_share());
        assert!(CoverageLevel::Middle.audience_share() < CoverageLevel::High.audience_share());
    }

    #[test]
    fn action_names_are_distinct() {
        let mut names = vec![ActionKind::Post.as_str(), ActionKind::SelfDev.as_str()];
        for level in PurchaseLevel::ALL {
            names.push(ActionKind::Purchase(level).as_str());
        }
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), before);
    }
}
