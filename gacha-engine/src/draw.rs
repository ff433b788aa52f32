//! Summon batches: pity check, rarity, item, then the bonus variant.
use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::banner::{BannerMass, BannerState};
use crate::config::EngineConfig;
use crate::constants::{
    LOG_TARGET_DRAW, MAX_DRAWS_PER_BATCH, MIN_DRAWS_PER_BATCH, SHINY_BASE_CHANCE,
    SHINY_HUNTER_CHANCE,
};
use crate::error::GachaError;
use crate::pity::{PityConfig, PityState, PityStatus, PityTrigger, resolve_rarity};
use crate::rarity::{RarityTable, RarityTier};
use crate::units::{Item, UnitTable};

/// Bonus-variant (shiny) chances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BonusConfig {
    #[serde(default = "BonusConfig::default_base")]
    pub base_chance: f64,
    #[serde(default = "BonusConfig::default_hunter")]
    pub hunter_chance: f64,
}

impl BonusConfig {
    const fn default_base() -> f64 {
        SHINY_BASE_CHANCE
    }

    const fn default_hunter() -> f64 {
        SHINY_HUNTER_CHANCE
    }

    #[must_use]
    pub const fn chance(&self, bonus_mode: bool) -> f64 {
        if bonus_mode {
            self.hunter_chance
        } else {
            self.base_chance
        }
    }
}

impl Default for BonusConfig {
    fn default() -> Self {
        Self {
            base_chance: SHINY_BASE_CHANCE,
            hunter_chance: SHINY_HUNTER_CHANCE,
        }
    }
}

/// A caller's summon request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRequest {
    pub amount: u32,
    #[serde(default)]
    pub bonus_mode: bool,
}

impl DrawRequest {
    #[must_use]
    pub const fn new(amount: u32, bonus_mode: bool) -> Self {
        Self { amount, bonus_mode }
    }
}

/// Outcome of a single draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawResult {
    pub tier: RarityTier,
    pub item: String,
    pub is_bonus_variant: bool,
    #[serde(default)]
    pub pity: PityTrigger,
}

/// Outcome of a whole summon batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawBatchResult {
    pub results: Vec<DrawResult>,
    pub cost_total: u64,
    pub pity_status: PityStatus,
    /// Distinct guarantees that fired during the batch, tier-A first.
    pub pity_fired: SmallVec<[PityTrigger; 2]>,
}

impl DrawBatchResult {
    #[must_use]
    pub fn tier_a_fired(&self) -> bool {
        self.pity_fired.contains(&PityTrigger::TierA)
    }

    #[must_use]
    pub fn tier_b_fired(&self) -> bool {
        self.pity_fired.contains(&PityTrigger::TierB)
    }
}

/// Stateless summon engine. Per-user state is passed in and handed back.
#[derive(Debug, Clone)]
pub struct DrawEngine {
    rarity: RarityTable,
    units: UnitTable,
    pity: PityConfig,
    bonus: BonusConfig,
    banner_mass: BannerMass,
    unit_cost: u32,
}

impl DrawEngine {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            rarity: config.rarity.clone(),
            units: config.units.clone(),
            pity: config.pity,
            bonus: config.bonus,
            banner_mass: config.banner_mass.clone(),
            unit_cost: config.unit_cost,
        }
    }

    #[must_use]
    pub const fn units(&self) -> &UnitTable {
        &self.units
    }

    #[must_use]
    pub const fn pity_config(&self) -> &PityConfig {
        &self.pity
    }

    /// Reject amounts outside `1..=100`.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::Validation` for an out-of-range amount.
    pub const fn validate_amount(amount: u32) -> Result<(), GachaError> {
        if amount < MIN_DRAWS_PER_BATCH || amount > MAX_DRAWS_PER_BATCH {
            return Err(GachaError::amount_out_of_range(
                MIN_DRAWS_PER_BATCH,
                MAX_DRAWS_PER_BATCH,
                amount,
            ));
        }
        Ok(())
    }

    /// Whether an item drawn in `tier` comes out as the bonus variant.
    pub fn resolve_bonus_variant<R: Rng + ?Sized>(
        &self,
        item: &Item,
        tier: RarityTier,
        bonus_mode: bool,
        rng: &mut R,
    ) -> bool {
        if !(item.shiny_eligible && tier.allows_bonus_variant()) {
            return false;
        }
        let chance = self.bonus.chance(bonus_mode).clamp(0.0, 1.0);
        rng.gen_bool(chance)
    }

    /// Run a batch against a scratch copy of `state`.
    ///
    /// The caller commits the returned state; on error nothing has changed.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::Validation` for an amount outside `1..=100` and
    /// `GachaError::EmptyPool` if a tier has no items.
    pub fn draw_batch<R: Rng + ?Sized>(
        &self,
        state: PityState,
        request: &DrawRequest,
        banner: &BannerState,
        rng: &mut R,
    ) -> Result<(DrawBatchResult, PityState), GachaError> {
        Self::validate_amount(request.amount)?;

        let mut scratch = state;
        let mut results = Vec::with_capacity(request.amount as usize);
        let mut tier_a = false;
        let mut tier_b = false;

        for _ in 0..request.amount {
            let (tier, trigger) = resolve_rarity(&mut scratch, &self.pity, &self.rarity, rng);
            match trigger {
                PityTrigger::TierA => tier_a = true,
                PityTrigger::TierB => tier_b = true,
                PityTrigger::None => {}
            }
            let item = self
                .units
                .resolve_item(tier, banner, &self.banner_mass, rng)
                .ok_or(GachaError::EmptyPool(tier))?;
            let is_bonus_variant = self.resolve_bonus_variant(item, tier, request.bonus_mode, rng);
            if trigger.fired() {
                log::debug!(
                    target: LOG_TARGET_DRAW,
                    "pity {trigger:?} forced {tier} ({})",
                    item.name
                );
            }
            results.push(DrawResult {
                tier,
                item: item.name.clone(),
                is_bonus_variant,
                pity: trigger,
            });
        }

        let mut pity_fired = SmallVec::new();
        if tier_a {
            pity_fired.push(PityTrigger::TierA);
        }
        if tier_b {
            pity_fired.push(PityTrigger::TierB);
        }

        let batch = DrawBatchResult {
            results,
            cost_total: u64::from(request.amount) * u64::from(self.unit_cost),
            pity_status: scratch.status(&self.pity),
            pity_fired,
        };
        Ok((batch, scratch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banner::BannerSlot;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn engine() -> DrawEngine {
        DrawEngine::new(&EngineConfig::default())
    }

    #[test]
    fn amount_bounds_are_enforced() {
        let engine = engine();
        let mut rng = SmallRng::seed_from_u64(1);
        for amount in [0, 101] {
            let err = engine
                .draw_batch(
                    PityState::new(5),
                    &DrawRequest::new(amount, false),
                    &BannerState::default(),
                    &mut rng,
                )
                .unwrap_err();
            assert!(matches!(err, GachaError::Validation { value, .. } if value == amount));
        }
        DrawEngine::validate_amount(1).unwrap();
        DrawEngine::validate_amount(100).unwrap();
    }

    #[test]
    fn batch_reports_cost_and_countdown() {
        let engine = engine();
        let mut rng = SmallRng::seed_from_u64(99);
        let (batch, state) = engine
            .draw_batch(
                PityState::default(),
                &DrawRequest::new(10, false),
                &BannerState::default(),
                &mut rng,
            )
            .unwrap();
        assert_eq!(batch.results.len(), 10);
        assert_eq!(batch.cost_total, 500);
        assert_eq!(state.draw_count, 10);
        assert_eq!(batch.pity_status.until_tier_a, 390);
        assert_eq!(batch.pity_status.until_tier_b, 40);
        assert!(batch.pity_fired.is_empty());
    }

    #[test]
    fn forced_mythic_lands_on_banner_unit_often() {
        let engine = engine();
        let mut banner = BannerState::default();
        banner.assign(BannerSlot::Primary, "Saber".into());
        let mut rng = SmallRng::seed_from_u64(5);
        let mut saber = 0;
        let trials = 2_000;
        for _ in 0..trials {
            let (batch, _) = engine
                .draw_batch(
                    PityState::new(399),
                    &DrawRequest::new(1, false),
                    &banner,
                    &mut rng,
                )
                .unwrap();
            let first = &batch.results[0];
            assert_eq!(first.tier, RarityTier::Mythic);
            assert_eq!(first.pity, PityTrigger::TierA);
            assert!(batch.tier_a_fired());
            if first.item == "Saber" {
                saber += 1;
            }
        }
        let ratio = f64::from(saber) / f64::from(trials);
        assert!((ratio - 0.5).abs() < 0.05, "ratio {ratio}");
    }

    #[test]
    fn bonus_variant_requires_eligible_item_and_tier() {
        let engine = engine();
        let mut rng = SmallRng::seed_from_u64(3);
        let units = engine.units();
        let saber = units.find(RarityTier::Mythic, "Saber").unwrap();
        let nobara = units.find(RarityTier::Mythic, "Nobara").unwrap();
        for _ in 0..1_000 {
            assert!(!engine.resolve_bonus_variant(saber, RarityTier::Mythic, true, &mut rng));
            assert!(!engine.resolve_bonus_variant(nobara, RarityTier::Epic, true, &mut rng));
        }
        let trials = 200_000;
        let hits = (0..trials)
            .filter(|_| engine.resolve_bonus_variant(nobara, RarityTier::Mythic, true, &mut rng))
            .count();
        let ratio = hits as f64 / f64::from(trials);
        assert!((ratio - SHINY_HUNTER_CHANCE).abs() < 0.003, "ratio {ratio}");
    }

    #[test]
    fn standard_bonus_chance_is_half_the_hunter_chance() {
        let engine = engine();
        let mut rng = SmallRng::seed_from_u64(8);
        let takaroda = engine
            .units()
            .find(RarityTier::Legendary, "Takaroda")
            .unwrap();
        let trials = 200_000;
        let hits = (0..trials)
            .filter(|_| {
                engine.resolve_bonus_variant(takaroda, RarityTier::Legendary, false, &mut rng)
            })
            .count();
        let ratio = hits as f64 / f64::from(trials);
        assert!((ratio - SHINY_BASE_CHANCE).abs() < 0.002, "ratio {ratio}");
    }

    #[test]
    fn seeded_batches_are_reproducible() {
        let engine = engine();
        let run = |seed| {
            let mut rng = SmallRng::seed_from_u64(seed);
            engine
                .draw_batch(
                    PityState::new(45),
                    &DrawRequest::new(100, true),
                    &BannerState::default(),
                    &mut rng,
                )
                .unwrap()
        };
        let (first, first_state) = run(42);
        let (second, second_state) = run(42);
        assert_eq!(first, second);
        assert_eq!(first_state, second_state);
        assert!(first.tier_b_fired());
        assert_eq!(first.results[4].tier, RarityTier::Legendary);
        assert_eq!(first.results[4].pity, PityTrigger::TierB);
    }
}
