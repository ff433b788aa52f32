//! Weighted trait rolls with a batch-level pity counter and lifetime totals.
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ConfigError;
use crate::constants::{
    BLITZ_DENOMINATOR, DEADEYE_DENOMINATOR, ETHEREAL_DENOMINATOR, FORTUNE_DENOMINATOR,
    LOG_TARGET_TRAITS, MARKSMAN_DENOMINATOR, MAX_TRAIT_ROLLS_PER_BATCH, MIN_TRAIT_ROLLS_PER_BATCH,
    MONARCH_DENOMINATOR, RANGE_DENOMINATOR, SCHOLAR_DENOMINATOR, SOLAR_DENOMINATOR,
    SWIFT_DENOMINATOR, TRAIT_PITY_THRESHOLD, VIGOR_DENOMINATOR,
};
use crate::error::GachaError;
use crate::store::UserId;

/// Rollable unit trait, in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Trait {
    Range,
    Swift,
    Vigor,
    Scholar,
    Marksman,
    Fortune,
    Blitz,
    Solar,
    Deadeye,
    Ethereal,
    Monarch,
}

/// Display grouping for trait results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraitGroup {
    Rare,
    Legendary,
    Mythic,
}

impl TraitGroup {
    pub const ALL: [Self; 3] = [Self::Rare, Self::Legendary, Self::Mythic];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Rare => "Rare",
            Self::Legendary => "Legendary",
            Self::Mythic => "Mythic",
        }
    }

    /// Traits belonging to the group in declared order.
    pub fn members(self) -> impl Iterator<Item = Trait> {
        Trait::ALL.into_iter().filter(move |t| t.group() == self)
    }
}

impl Trait {
    pub const ALL: [Self; 11] = [
        Self::Range,
        Self::Swift,
        Self::Vigor,
        Self::Scholar,
        Self::Marksman,
        Self::Fortune,
        Self::Blitz,
        Self::Solar,
        Self::Deadeye,
        Self::Ethereal,
        Self::Monarch,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Range => "Range",
            Self::Swift => "Swift",
            Self::Vigor => "Vigor",
            Self::Scholar => "Scholar",
            Self::Marksman => "Marksman",
            Self::Fortune => "Fortune",
            Self::Blitz => "Blitz",
            Self::Solar => "Solar",
            Self::Deadeye => "Deadeye",
            Self::Ethereal => "Ethereal",
            Self::Monarch => "Monarch",
        }
    }

    #[must_use]
    pub const fn group(self) -> TraitGroup {
        match self {
            Self::Range | Self::Swift | Self::Vigor => TraitGroup::Rare,
            Self::Scholar | Self::Marksman | Self::Fortune | Self::Blitz => TraitGroup::Legendary,
            Self::Solar | Self::Deadeye | Self::Ethereal | Self::Monarch => TraitGroup::Mythic,
        }
    }

    /// Case-insensitive lookup by label.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let needle = name.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(needle))
    }

    #[must_use]
    pub const fn default_denominator(self) -> f64 {
        match self {
            Self::Range => RANGE_DENOMINATOR,
            Self::Swift => SWIFT_DENOMINATOR,
            Self::Vigor => VIGOR_DENOMINATOR,
            Self::Scholar => SCHOLAR_DENOMINATOR,
            Self::Marksman => MARKSMAN_DENOMINATOR,
            Self::Fortune => FORTUNE_DENOMINATOR,
            Self::Blitz => BLITZ_DENOMINATOR,
            Self::Solar => SOLAR_DENOMINATOR,
            Self::Deadeye => DEADEYE_DENOMINATOR,
            Self::Ethereal => ETHEREAL_DENOMINATOR,
            Self::Monarch => MONARCH_DENOMINATOR,
        }
    }
}

impl fmt::Display for Trait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Rarity denominators ("one in N") per trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraitTable {
    denominators: BTreeMap<Trait, f64>,
}

impl Default for TraitTable {
    fn default() -> Self {
        Self {
            denominators: Trait::ALL
                .into_iter()
                .map(|t| (t, t.default_denominator()))
                .collect(),
        }
    }
}

impl TraitTable {
    #[must_use]
    pub fn denominator(&self, t: Trait) -> Option<f64> {
        self.denominators.get(&t).copied()
    }

    /// Unnormalized weights (`1 / denominator`) in declared order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::RangeViolation` for a missing, non-finite or
    /// non-positive denominator.
    pub fn weights(&self) -> Result<Vec<f64>, ConfigError> {
        Trait::ALL
            .into_iter()
            .map(|t| {
                let value = self.denominator(t).unwrap_or(f64::NAN);
                if value.is_finite() && value > 0.0 {
                    Ok(value.recip())
                } else {
                    Err(ConfigError::RangeViolation {
                        field: format!("traits.{}", t.label()),
                        min: f64::MIN_POSITIVE,
                        max: f64::MAX,
                        value,
                    })
                }
            })
            .collect()
    }

    /// Probability of each trait after normalization.
    ///
    /// # Errors
    ///
    /// See [`TraitTable::weights`].
    pub fn probabilities(&self) -> Result<Vec<(Trait, f64)>, ConfigError> {
        let weights = self.weights()?;
        let total: f64 = weights.iter().sum();
        Ok(Trait::ALL
            .into_iter()
            .zip(weights)
            .map(|(t, w)| (t, w / total))
            .collect())
    }
}

/// Per-trait tallies. Every trait is present, zero when never rolled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraitCounts(BTreeMap<Trait, u64>);

impl Default for TraitCounts {
    fn default() -> Self {
        Self(Trait::ALL.into_iter().map(|t| (t, 0)).collect())
    }
}

impl TraitCounts {
    #[must_use]
    pub fn get(&self, t: Trait) -> u64 {
        self.0.get(&t).copied().unwrap_or(0)
    }

    pub fn add(&mut self, t: Trait, amount: u64) {
        let slot = self.0.entry(t).or_insert(0);
        *slot = slot.saturating_add(amount);
    }

    pub fn merge(&mut self, other: &Self) {
        for (t, amount) in other.iter() {
            self.add(t, amount);
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().copied().fold(0, u64::saturating_add)
    }

    /// Counts in declared trait order, zero entries included.
    pub fn iter(&self) -> impl Iterator<Item = (Trait, u64)> + '_ {
        Trait::ALL.into_iter().map(|t| (t, self.get(t)))
    }

    /// Highest count; ties go to the earliest declared trait. `None` when all
    /// counts are zero.
    #[must_use]
    pub fn most_rolled(&self) -> Option<Trait> {
        let mut best: Option<(Trait, u64)> = None;
        for (t, count) in self.iter() {
            if count > 0 && best.is_none_or(|(_, top)| count > top) {
                best = Some((t, count));
            }
        }
        best.map(|(t, _)| t)
    }
}

/// Persisted per-user trait record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitPityState {
    #[serde(default)]
    pub pity_counter: u32,
    #[serde(default, rename = "totals")]
    pub lifetime_totals: TraitCounts,
}

/// Trait pity threshold and the trait it awards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitPityConfig {
    #[serde(default = "TraitPityConfig::default_threshold")]
    pub threshold: u32,
    #[serde(default = "TraitPityConfig::default_guaranteed")]
    pub guaranteed: Trait,
}

impl TraitPityConfig {
    const fn default_threshold() -> u32 {
        TRAIT_PITY_THRESHOLD
    }

    const fn default_guaranteed() -> Trait {
        Trait::Monarch
    }
}

impl Default for TraitPityConfig {
    fn default() -> Self {
        Self {
            threshold: Self::default_threshold(),
            guaranteed: Self::default_guaranteed(),
        }
    }
}

/// Outcome of one trait batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitBatchResult {
    pub amount: u32,
    /// This batch's counts, including any pity award.
    pub counts: TraitCounts,
    pub lifetime_totals: TraitCounts,
    pub pity_awarded: bool,
    /// Counter value after the batch.
    pub pity_counter: u32,
}

/// Trait sampler. Cheap to clone and safe to share with blocking workers.
#[derive(Debug, Clone)]
pub struct TraitEngine {
    sampler: WeightedIndex<f64>,
    pity: TraitPityConfig,
}

impl TraitEngine {
    /// Build the sampler from a denominator table.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an invalid denominator or when the weights
    /// cannot form a distribution.
    pub fn new(table: &TraitTable, pity: TraitPityConfig) -> Result<Self, ConfigError> {
        let weights = table.weights()?;
        let sampler =
            WeightedIndex::new(weights).map_err(|err| ConfigError::InvalidWeights(err.to_string()))?;
        Ok(Self { sampler, pity })
    }

    #[must_use]
    pub const fn pity_config(&self) -> &TraitPityConfig {
        &self.pity
    }

    /// Reject amounts outside `1..=10000`.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::Validation` for an out-of-range amount.
    pub const fn validate_amount(amount: u32) -> Result<(), GachaError> {
        if amount < MIN_TRAIT_ROLLS_PER_BATCH || amount > MAX_TRAIT_ROLLS_PER_BATCH {
            return Err(GachaError::amount_out_of_range(
                MIN_TRAIT_ROLLS_PER_BATCH,
                MAX_TRAIT_ROLLS_PER_BATCH,
                amount,
            ));
        }
        Ok(())
    }

    /// Sample `amount` traits. Touches no shared state.
    pub fn sample_batch<R: Rng + ?Sized>(&self, amount: u32, rng: &mut R) -> TraitCounts {
        let mut counts = TraitCounts::default();
        for _ in 0..amount {
            let idx = self.sampler.sample(rng);
            if let Some(t) = Trait::ALL.get(idx) {
                counts.add(*t, 1);
            }
        }
        counts
    }

    /// Fold sampled counts into a user's record.
    ///
    /// The counter advances by `amount` once per batch. Reaching the threshold
    /// adds one guaranteed trait to the batch and resets the counter.
    #[must_use]
    pub fn commit_batch(
        &self,
        state: &TraitPityState,
        amount: u32,
        mut counts: TraitCounts,
    ) -> (TraitBatchResult, TraitPityState) {
        let mut next = state.clone();
        next.pity_counter = next.pity_counter.saturating_add(amount);
        let pity_awarded = next.pity_counter >= self.pity.threshold;
        if pity_awarded {
            counts.add(self.pity.guaranteed, 1);
            next.pity_counter = 0;
            log::debug!(
                target: LOG_TARGET_TRAITS,
                "trait pity awarded {} after {amount} rolls",
                self.pity.guaranteed
            );
        }
        next.lifetime_totals.merge(&counts);
        let result = TraitBatchResult {
            amount,
            counts,
            lifetime_totals: next.lifetime_totals.clone(),
            pity_awarded,
            pity_counter: next.pity_counter,
        };
        (result, next)
    }

    /// Validate, sample and commit in one call.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::Validation` for an amount outside `1..=10000`.
    pub fn roll_batch<R: Rng + ?Sized>(
        &self,
        state: &TraitPityState,
        amount: u32,
        rng: &mut R,
    ) -> Result<(TraitBatchResult, TraitPityState), GachaError> {
        Self::validate_amount(amount)?;
        let counts = self.sample_batch(amount, rng);
        Ok(self.commit_batch(state, amount, counts))
    }

    /// Most-rolled lifetime trait for a user.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::NotFound` when the user has no record or every
    /// total is zero.
    pub fn most_rolled(state: Option<&TraitPityState>, user: &UserId) -> Result<Trait, GachaError> {
        state
            .and_then(|s| s.lifetime_totals.most_rolled())
            .ok_or_else(|| GachaError::NotFound { user: user.clone() })
    }
}
