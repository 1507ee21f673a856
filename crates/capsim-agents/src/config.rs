//! Behavioral configuration for the agent model.
//!
//! Cooldowns, daily limits, decision thresholds, the per-action effect
//! tables, and the shop-weight multipliers. All values deserialize from
//! the simulation config file with the documented defaults; the effect
//! tables are validated there so typos in attribute names fail at load
//! rather than silently applying nothing.

use std::collections::BTreeMap;

use capsim_types::{AttributeName, Profession, PurchaseLevel};
use serde::{Deserialize, Serialize};

/// A set of attribute deltas applied by one action.
pub type EffectSet = BTreeMap<AttributeName, f64>;

/// Per-action attribute effect tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEffects {
    /// Deltas applied to the author on PUBLISH_POST.
    #[serde(default = "default_post_effects")]
    pub post: EffectSet,
    /// Deltas applied on SELF_DEV.
    #[serde(default = "default_self_dev_effects")]
    pub self_dev: EffectSet,
    /// Deltas applied on PURCHASE_L1.
    #[serde(default = "default_purchase_l1_effects")]
    pub purchase_l1: EffectSet,
    /// Deltas applied on PURCHASE_L2.
    #[serde(default = "default_purchase_l2_effects")]
    pub purchase_l2: EffectSet,
    /// Deltas applied on PURCHASE_L3.
    #[serde(default = "default_purchase_l3_effects")]
    pub purchase_l3: EffectSet,
}

impl Default for ActionEffects {
    fn default() -> Self {
        Self {
            post: default_post_effects(),
            self_dev: default_self_dev_effects(),
            purchase_l1: default_purchase_l1_effects(),
            purchase_l2: default_purchase_l2_effects(),
            purchase_l3: default_purchase_l3_effects(),
        }
    }
}

impl ActionEffects {
    /// Effect row for a purchase at `level`.
    pub const fn purchase(&self, level: PurchaseLevel) -> &EffectSet {
        match level {
            PurchaseLevel::L1 => &self.purchase_l1,
            PurchaseLevel::L2 => &self.purchase_l2,
            PurchaseLevel::L3 => &self.purchase_l3,
        }
    }

    /// The cost in an effect set for `attribute`, as a positive number.
    ///
    /// Gates compare available attribute values against these costs.
    pub fn cost(effects: &EffectSet, attribute: AttributeName) -> f64 {
        effects
            .get(&attribute)
            .copied()
            .filter(|delta| *delta < 0.0)
            .map_or(0.0, f64::abs)
    }
}

/// Purchase-score multiplier per profession.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopWeights {
    #[serde(flatten)]
    weights: BTreeMap<Profession, f64>,
}

impl Default for ShopWeights {
    fn default() -> Self {
        use Profession as P;
        let mut weights = BTreeMap::new();
        for (profession, weight) in [
            (P::ShopClerk, 1.1),
            (P::Worker, 1.0),
            (P::Developer, 1.2),
            (P::Politician, 1.3),
            (P::Blogger, 1.2),
            (P::Businessman, 1.5),
            (P::SpiritualMentor, 0.8),
            (P::Philosopher, 0.7),
            (P::Unemployed, 0.5),
            (P::Teacher, 0.9),
            (P::Artist, 0.9),
            (P::Doctor, 1.1),
        ] {
            weights.insert(profession, weight);
        }
        Self { weights }
    }
}

impl ShopWeights {
    /// Multiplier for `profession`, neutral 1.0 when unset.
    pub fn weight(&self, profession: Profession) -> f64 {
        self.weights.get(&profession).copied().unwrap_or(1.0)
    }
}

/// Cooldowns, limits, and decision thresholds governing agent actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRules {
    /// Minimum sim-minutes between two posts by the same agent.
    #[serde(default = "default_post_cooldown_min")]
    pub post_cooldown_min: f64,

    /// Minimum sim-minutes between two self-dev actions.
    #[serde(default = "default_self_dev_cooldown_min")]
    pub self_dev_cooldown_min: f64,

    /// Optional per-level purchase cooldowns in sim-minutes.
    #[serde(default)]
    pub purchase_cooldown_min: BTreeMap<PurchaseLevel, f64>,

    /// Maximum purchases per agent per simulated day.
    #[serde(default = "default_max_purchases_per_day")]
    pub max_purchases_per_day: u32,

    /// Candidates scoring below this are dropped from selection.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,

    /// Post score used when no trend context is available.
    #[serde(default = "default_post_baseline_score")]
    pub post_baseline_score: f64,

    /// Per-action attribute effect tables.
    #[serde(default)]
    pub effects: ActionEffects,

    /// Purchase-score multiplier per profession.
    #[serde(default)]
    pub shop_weights: ShopWeights,
}

impl Default for ActionRules {
    fn default() -> Self {
        Self {
            post_cooldown_min: default_post_cooldown_min(),
            self_dev_cooldown_min: default_self_dev_cooldown_min(),
            purchase_cooldown_min: BTreeMap::new(),
            max_purchases_per_day: default_max_purchases_per_day(),
            score_threshold: default_score_threshold(),
            post_baseline_score: default_post_baseline_score(),
            effects: ActionEffects::default(),
            shop_weights: ShopWeights::default(),
        }
    }
}

const fn default_post_cooldown_min() -> f64 {
    60.0
}

const fn default_self_dev_cooldown_min() -> f64 {
    30.0
}

const fn default_max_purchases_per_day() -> u32 {
    5
}

const fn default_score_threshold() -> f64 {
    0.25
}

const fn default_post_baseline_score() -> f64 {
    0.30
}

fn default_post_effects() -> EffectSet {
    let mut m = BTreeMap::new();
    m.insert(AttributeName::TimeBudget, -0.20);
    m.insert(AttributeName::EnergyLevel, -0.50);
    m.insert(AttributeName::SocialStatus, 0.10);
    m
}

fn default_self_dev_effects() -> EffectSet {
    let mut m = BTreeMap::new();
    m.insert(AttributeName::TimeBudget, -1.00);
    m.insert(AttributeName::EnergyLevel, 0.80);
    m
}

fn default_purchase_l1_effects() -> EffectSet {
    let mut m = BTreeMap::new();
    m.insert(AttributeName::FinancialCapability, -0.05);
    m.insert(AttributeName::TimeBudget, -0.50);
    m.insert(AttributeName::EnergyLevel, 0.20);
    m
}

fn default_purchase_l2_effects() -> EffectSet {
    let mut m = BTreeMap::new();
    m.insert(AttributeName::FinancialCapability, -0.50);
    m.insert(AttributeName::TimeBudget, -0.50);
    m.insert(AttributeName::EnergyLevel, 0.30);
    m.insert(AttributeName::SocialStatus, 0.05);
    m
}

fn default_purchase_l3_effects() -> EffectSet {
    let mut m = BTreeMap::new();
    m.insert(AttributeName::FinancialCapability, -2.00);
    m.insert(AttributeName::TimeBudget, -1.00);
    m.insert(AttributeName::EnergyLevel, 0.50);
    m.insert(AttributeName::SocialStatus, 0.20);
    m
}
