//! Agent domain logic for the CAPSIM simulation.
//!
//! Attribute math with clamping and history emission, action gate
//! predicates, score-weighted action selection, population spawning,
//! and the trend life-cycle calculus.
//!
//! # Modules
//!
//! - [`agent`] -- attribute mutation, gates, work-hours predicate
//! - [`config`] -- cooldowns, limits, effect tables, shop weights
//! - [`decision`] -- candidate scoring and weighted selection
//! - [`spawn`] -- bootstrap population generation
//! - [`trend`] -- virality calculus and archival predicate
//! - [`error`] -- typed errors

pub mod agent;
pub mod config;
pub mod decision;
pub mod error;
pub mod spawn;
pub mod trend;

pub use agent::{
    apply_delta, can_post, can_purchase, can_self_dev, day_index, human_clock, is_work_hours,
    quantize_time_budget, MINUTES_PER_DAY,
};
pub use config::{ActionEffects, ActionRules, EffectSet, ShopWeights};
pub use decision::{decide_action, score_candidates, Candidate, TrendContext};
pub use error::AgentError;
pub use spawn::{profession_counts, spawn_agent, spawn_population};
pub use trend::{
    coverage_from_mean_social, create_trend, current_virality, is_stale, register_interactions,
};
