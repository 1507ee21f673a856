//! Static lookup tables, read-only after bootstrap.
//!
//! The repository can load these from the store; the built-in values
//! below are the canonical seed data and the fallback when the store
//! has no rows. Affinities are on a 1..5 scale, attribute ranges bound
//! the uniform draws at agent spawn, and the topic mapping links each
//! trend topic to the interest category it appeals to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enums::{InterestCategory, Profession, TrendTopic};

/// Inclusive `[lo, hi]` range for a uniform attribute draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    /// Lower bound.
    pub lo: f64,
    /// Upper bound.
    pub hi: f64,
}

impl ValueRange {
    /// Construct a range.
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Midpoint of the range.
    pub fn midpoint(&self) -> f64 {
        (self.lo + self.hi) / 2.0
    }
}

// ---------------------------------------------------------------------------
// Affinity
// ---------------------------------------------------------------------------

/// Profession-to-topic affinity matrix (1..5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AffinityMap {
    entries: BTreeMap<Profession, BTreeMap<TrendTopic, f64>>,
}

impl AffinityMap {
    /// Build a map from explicit entries.
    pub const fn from_entries(entries: BTreeMap<Profession, BTreeMap<TrendTopic, f64>>) -> Self {
        Self { entries }
    }

    /// Affinity of `profession` for `topic`, neutral 2.5 when unset.
    pub fn affinity(&self, profession: Profession, topic: TrendTopic) -> f64 {
        self.entries
            .get(&profession)
            .and_then(|topics| topics.get(&topic))
            .copied()
            .unwrap_or(2.5)
    }

    /// Professions whose affinity for `topic` is strictly positive.
    pub fn receptive_professions(&self, topic: TrendTopic) -> Vec<Profession> {
        Profession::ALL
            .into_iter()
            .filter(|p| self.affinity(*p, topic) > 0.0)
            .collect()
    }

    /// Number of (profession, topic) entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Profession attribute ranges
// ---------------------------------------------------------------------------

/// Spawn ranges for one profession's attributes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributeRanges {
    /// Financial capability range.
    pub financial_capability: ValueRange,
    /// Trend receptivity range.
    pub trend_receptivity: ValueRange,
    /// Social status range.
    pub social_status: ValueRange,
    /// Energy level range.
    pub energy_level: ValueRange,
    /// Time budget range (quantised to 0.5 on draw).
    pub time_budget: ValueRange,
}

/// Per-profession spawn ranges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfessionRanges {
    entries: BTreeMap<Profession, AttributeRanges>,
}

impl ProfessionRanges {
    /// Build a table from explicit entries.
    pub const fn from_entries(entries: BTreeMap<Profession, AttributeRanges>) -> Self {
        Self { entries }
    }

    /// Ranges for `profession`, falling back to the Worker row.
    pub fn ranges(&self, profession: Profession) -> AttributeRanges {
        self.entries
            .get(&profession)
            .or_else(|| self.entries.get(&Profession::Worker))
            .copied()
            .unwrap_or(AttributeRanges {
                financial_capability: ValueRange::new(1.0, 3.0),
                trend_receptivity: ValueRange::new(1.0, 3.0),
                social_status: ValueRange::new(1.0, 3.0),
                energy_level: ValueRange::new(2.0, 5.0),
                time_budget: ValueRange::new(2.0, 4.0),
            })
    }

    /// Time-budget midpoint used by the daily reset.
    pub fn time_budget_midpoint(&self, profession: Profession) -> f64 {
        self.ranges(profession).time_budget.midpoint()
    }
}

// ---------------------------------------------------------------------------
// Interest ranges
// ---------------------------------------------------------------------------

/// Per-profession interest spawn ranges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterestRanges {
    entries: BTreeMap<Profession, BTreeMap<InterestCategory, ValueRange>>,
}

impl InterestRanges {
    /// Build a table from explicit entries.
    pub const fn from_entries(
        entries: BTreeMap<Profession, BTreeMap<InterestCategory, ValueRange>>,
    ) -> Self {
        Self { entries }
    }

    /// Interest ranges for `profession`, falling back to the Worker row.
    pub fn ranges(&self, profession: Profession) -> BTreeMap<InterestCategory, ValueRange> {
        self.entries
            .get(&profession)
            .or_else(|| self.entries.get(&Profession::Worker))
            .cloned()
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Topic mapping
// ---------------------------------------------------------------------------

/// Maps each trend topic to the interest category it appeals to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicMapping {
    entries: BTreeMap<TrendTopic, InterestCategory>,
}

impl TopicMapping {
    /// Build a mapping from explicit entries.
    pub const fn from_entries(entries: BTreeMap<TrendTopic, InterestCategory>) -> Self {
        Self { entries }
    }

    /// Interest category for `topic`, defaulting to Economics.
    pub fn interest_category(&self, topic: TrendTopic) -> InterestCategory {
        self.entries
            .get(&topic)
            .copied()
            .unwrap_or(InterestCategory::Economics)
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// All static lookup tables, loaded once at bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticTables {
    /// Profession-to-topic affinity matrix.
    pub affinity: AffinityMap,
    /// Per-profession attribute spawn ranges.
    pub profession_ranges: ProfessionRanges,
    /// Per-profession interest spawn ranges.
    pub interest_ranges: InterestRanges,
    /// Topic-to-interest-category mapping.
    pub topic_mapping: TopicMapping,
}

impl Default for StaticTables {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StaticTables {
    /// The canonical built-in table values.
    pub fn builtin() -> Self {
        Self {
            affinity: builtin_affinity(),
            profession_ranges: builtin_profession_ranges(),
            interest_ranges: builtin_interest_ranges(),
            topic_mapping: builtin_topic_mapping(),
        }
    }
}

fn builtin_affinity() -> AffinityMap {
    use Profession as P;
    use TrendTopic as T;

    // Rows follow topic order: Economic, Health, Spiritual, Conspiracy,
    // Science, Culture, Sport.
    let rows: [(P, [f64; 7]); 12] = [
        (P::ShopClerk, [3.0, 2.0, 2.0, 3.0, 1.0, 2.0, 2.0]),
        (P::Worker, [3.0, 3.0, 2.0, 3.0, 1.0, 2.0, 3.0]),
        (P::Developer, [3.0, 2.0, 1.0, 2.0, 5.0, 3.0, 2.0]),
        (P::Politician, [5.0, 4.0, 2.0, 2.0, 3.0, 3.0, 2.0]),
        (P::Blogger, [4.0, 4.0, 3.0, 4.0, 3.0, 5.0, 4.0]),
        (P::Businessman, [5.0, 3.0, 2.0, 2.0, 3.0, 3.0, 3.0]),
        (P::SpiritualMentor, [2.0, 3.0, 5.0, 3.0, 2.0, 3.0, 2.0]),
        (P::Philosopher, [3.0, 3.0, 5.0, 3.0, 4.0, 4.0, 1.0]),
        (P::Unemployed, [4.0, 3.0, 3.0, 4.0, 2.0, 3.0, 3.0]),
        (P::Teacher, [3.0, 4.0, 3.0, 2.0, 4.0, 4.0, 3.0]),
        (P::Artist, [2.0, 2.0, 4.0, 2.0, 2.0, 5.0, 2.0]),
        (P::Doctor, [3.0, 5.0, 2.0, 1.0, 5.0, 2.0, 3.0]),
    ];

    let mut entries = BTreeMap::new();
    for (profession, scores) in rows {
        let mut topics = BTreeMap::new();
        for (topic, score) in T::ALL.into_iter().zip(scores) {
            topics.insert(topic, score);
        }
        entries.insert(profession, topics);
    }
    AffinityMap::from_entries(entries)
}

fn builtin_profession_ranges() -> ProfessionRanges {
    use Profession as P;

    // Columns: financial, receptivity, social, energy, time budget.
    let rows: [(P, [(f64, f64); 5]); 12] = [
        (P::ShopClerk, [(2.0, 4.0), (1.0, 3.0), (1.0, 3.0), (2.0, 5.0), (3.0, 5.0)]),
        (P::Worker, [(2.0, 4.0), (1.0, 3.0), (1.0, 2.0), (2.0, 5.0), (3.0, 5.0)]),
        (P::Developer, [(3.0, 5.0), (3.0, 5.0), (2.0, 4.0), (2.0, 5.0), (2.0, 4.0)]),
        (P::Politician, [(3.0, 5.0), (3.0, 5.0), (4.0, 5.0), (2.0, 4.0), (2.0, 4.0)]),
        (P::Blogger, [(2.0, 4.0), (4.0, 5.0), (3.0, 5.0), (2.0, 5.0), (3.0, 5.0)]),
        (P::Businessman, [(4.0, 5.0), (2.0, 4.0), (4.0, 5.0), (2.0, 5.0), (2.0, 4.0)]),
        (P::SpiritualMentor, [(1.0, 3.0), (2.0, 5.0), (2.0, 4.0), (3.0, 5.0), (2.0, 4.0)]),
        (P::Philosopher, [(1.0, 3.0), (1.0, 3.0), (1.0, 3.0), (2.0, 4.0), (2.0, 4.0)]),
        (P::Unemployed, [(1.0, 2.0), (3.0, 5.0), (1.0, 2.0), (3.0, 5.0), (3.0, 5.0)]),
        (P::Teacher, [(1.0, 3.0), (1.0, 3.0), (2.0, 4.0), (1.0, 3.0), (2.0, 4.0)]),
        (P::Artist, [(1.0, 3.0), (2.0, 4.0), (2.0, 4.0), (4.0, 5.0), (3.0, 5.0)]),
        (P::Doctor, [(2.0, 4.0), (1.0, 3.0), (3.0, 5.0), (2.0, 4.0), (1.0, 2.0)]),
    ];

    let mut entries = BTreeMap::new();
    for (profession, [fin, rec, soc, energy, time]) in rows {
        entries.insert(
            profession,
            AttributeRanges {
                financial_capability: ValueRange::new(fin.0, fin.1),
                trend_receptivity: ValueRange::new(rec.0, rec.1),
                social_status: ValueRange::new(soc.0, soc.1),
                energy_level: ValueRange::new(energy.0, energy.1),
                time_budget: ValueRange::new(time.0, time.1),
            },
        );
    }
    ProfessionRanges::from_entries(entries)
}

fn builtin_interest_ranges() -> InterestRanges {
    use InterestCategory as I;
    use Profession as P;

    // Columns follow I::ALL order: Economics, Wellbeing, Spirituality,
    // Knowledge, Creativity, Society.
    let rows: [(P, [(f64, f64); 6]); 12] = [
        (
            P::ShopClerk,
            [(4.59, 5.0), (0.74, 1.34), (0.64, 1.24), (1.15, 1.75), (1.93, 2.53), (2.70, 3.30)],
        ),
        (
            P::Worker,
            [(3.97, 4.57), (1.05, 1.65), (1.86, 2.46), (1.83, 2.43), (0.87, 1.47), (0.69, 1.29)],
        ),
        (
            P::Developer,
            [(1.82, 2.42), (1.15, 1.75), (0.72, 1.32), (4.05, 4.65), (2.31, 2.91), (1.59, 2.19)],
        ),
        (
            P::Politician,
            [(0.51, 1.11), (1.63, 2.23), (0.32, 0.92), (2.07, 2.67), (1.73, 2.33), (3.57, 4.17)],
        ),
        (
            P::Blogger,
            [(1.32, 1.92), (1.01, 1.61), (1.20, 1.80), (1.23, 1.83), (3.27, 3.87), (2.43, 3.03)],
        ),
        (
            P::Businessman,
            [(4.01, 4.61), (0.76, 1.36), (0.91, 1.51), (1.35, 1.95), (2.04, 2.64), (2.42, 3.02)],
        ),
        (
            P::SpiritualMentor,
            [(0.62, 1.22), (2.04, 2.64), (3.86, 4.46), (2.11, 2.71), (2.12, 2.72), (1.95, 2.55)],
        ),
        (
            P::Philosopher,
            [(1.06, 1.66), (2.22, 2.82), (3.71, 4.31), (3.01, 3.61), (2.21, 2.81), (1.80, 2.40)],
        ),
        (
            P::Unemployed,
            [(0.72, 1.32), (1.38, 1.98), (3.69, 4.29), (2.15, 2.75), (2.33, 2.93), (2.42, 3.02)],
        ),
        (
            P::Teacher,
            [(1.32, 1.92), (2.16, 2.76), (1.40, 2.00), (3.61, 4.21), (1.91, 2.51), (2.24, 2.84)],
        ),
        (
            P::Artist,
            [(0.86, 1.46), (0.91, 1.51), (2.01, 2.61), (1.82, 2.42), (3.72, 4.32), (1.94, 2.54)],
        ),
        (
            P::Doctor,
            [(1.02, 1.62), (3.97, 4.57), (1.37, 1.97), (2.01, 2.61), (1.58, 2.18), (2.45, 3.05)],
        ),
    ];

    let mut entries = BTreeMap::new();
    for (profession, ranges) in rows {
        let mut categories = BTreeMap::new();
        for (category, (lo, hi)) in I::ALL.into_iter().zip(ranges) {
            categories.insert(category, ValueRange::new(lo, hi));
        }
        entries.insert(profession, categories);
    }
    InterestRanges::from_entries(entries)
}

fn builtin_topic_mapping() -> TopicMapping {
    use InterestCategory as I;
    use TrendTopic as T;

    let mut entries = BTreeMap::new();
    entries.insert(T::Economic, I::Economics);
    entries.insert(T::Health, I::Wellbeing);
    entries.insert(T::Spiritual, I::Spirituality);
    entries.insert(T::Conspiracy, I::Society);
    entries.insert(T::Science, I::Knowledge);
    entries.insert(T::Culture, I::Creativity);
    entries.insert(T::Sport, I::Society);
    TopicMapping::from_entries(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_affinity_covers_all_pairs() {
        let tables = StaticTables::builtin();
        assert_eq!(tables.affinity.len(), 12 * 7);
        for profession in Profession::ALL {
            for topic in TrendTopic::ALL {
                let a = tables.affinity.affinity(profession, topic);
                assert!((1.0..=5.0).contains(&a), "{profession} {topic}: {a}");
            }
        }
    }

    #[test]
    fn developer_science_affinity_is_maximal() {
        let tables = StaticTables::builtin();
        assert_eq!(
            tables
                .affinity
                .affinity(Profession::Developer, TrendTopic::Science),
            5.0
        );
    }

    #[test]
    fn all_professions_receptive_to_every_topic() {
        // The builtin matrix has no zero entries, so the audience filter
        // never excludes a whole profession.
        let tables = StaticTables::builtin();
        for topic in TrendTopic::ALL {
            assert_eq!(tables.affinity.receptive_professions(topic).len(), 12);
        }
    }

    #[test]
    fn doctor_time_budget_midpoint() {
        let tables = StaticTables::builtin();
        assert_eq!(
            tables.profession_ranges.time_budget_midpoint(Profession::Doctor),
            1.5
        );
    }

    #[test]
    fn interest_ranges_cover_all_categories() {
        let tables = StaticTables::builtin();
        for profession in Profession::ALL {
            let ranges = tables.interest_ranges.ranges(profession);
            assert_eq!(ranges.len(), 6, "{profession}");
            for range in ranges.values() {
                assert!(range.lo <= range.hi);
                assert!(range.lo >= 0.0);
            }
        }
    }

    #[test]
    fn topic_mapping_is_total() {
        let tables = StaticTables::builtin();
        // Sport and Conspiracy both map to Society; the rest are unique.
        assert_eq!(
            tables.topic_mapping.interest_category(TrendTopic::Sport),
            InterestCategory::Society
        );
        assert_eq!(
            tables.topic_mapping.interest_category(TrendTopic::Science),
            InterestCategory::Knowledge
        );
    }

    #[test]
    fn midpoint_math() {
        let range = ValueRange::new(2.0, 4.0);
        assert_eq!(range.midpoint(), 3.0);
    }
}
