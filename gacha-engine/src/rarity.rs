//! Rarity tiers and the cumulative base-chance table.
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfigError;
use crate::constants::{
    CHANCE_SUM_TOLERANCE, EPIC_CHANCE, LEGENDARY_CHANCE, MYTHIC_CHANCE, RARE_CHANCE, SECRET_CHANCE,
};

/// Rarity classification, ordered from most common to rarest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RarityTier {
    Rare,
    Epic,
    Legendary,
    Mythic,
    Secret,
}

impl RarityTier {
    /// All tiers in increasing rarity.
    pub const ALL: [Self; 5] = [
        Self::Rare,
        Self::Epic,
        Self::Legendary,
        Self::Mythic,
        Self::Secret,
    ];

    /// Fixed walk order used when resolving a uniform roll.
    pub const RESOLUTION_ORDER: [Self; 5] = [
        Self::Secret,
        Self::Mythic,
        Self::Legendary,
        Self::Epic,
        Self::Rare,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Rare => "Rare",
            Self::Epic => "Epic",
            Self::Legendary => "Legendary",
            Self::Mythic => "Mythic",
            Self::Secret => "Secret",
        }
    }

    /// Tiers whose shiny-eligible items may roll the bonus variant.
    #[must_use]
    pub const fn allows_bonus_variant(self) -> bool {
        matches!(self, Self::Secret | Self::Mythic | Self::Legendary)
    }
}

impl fmt::Display for RarityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Base chance per tier. The five chances must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RarityTable {
    pub secret: f64,
    pub mythic: f64,
    pub legendary: f64,
    pub epic: f64,
    pub rare: f64,
}

impl Default for RarityTable {
    fn default() -> Self {
        Self {
            secret: SECRET_CHANCE,
            mythic: MYTHIC_CHANCE,
            legendary: LEGENDARY_CHANCE,
            epic: EPIC_CHANCE,
            rare: RARE_CHANCE,
        }
    }
}

impl RarityTable {
    #[must_use]
    pub const fn chance(&self, tier: RarityTier) -> f64 {
        match tier {
            RarityTier::Secret => self.secret,
            RarityTier::Mythic => self.mythic,
            RarityTier::Legendary => self.legendary,
            RarityTier::Epic => self.epic,
            RarityTier::Rare => self.rare,
        }
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        RarityTier::RESOLUTION_ORDER
            .iter()
            .map(|tier| self.chance(*tier))
            .sum()
    }

    /// Validate that every chance is a probability and the table sums to one.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for tier in RarityTier::RESOLUTION_ORDER {
            let chance = self.chance(tier);
            if !(0.0..=1.0).contains(&chance) {
                return Err(ConfigError::RangeViolation {
                    field: format!("rarity.{}", tier.label().to_ascii_lowercase()),
                    min: 0.0,
                    max: 1.0,
                    value: chance,
                });
            }
        }
        let total = self.total();
        if (total - 1.0).abs() > CHANCE_SUM_TOLERANCE {
            return Err(ConfigError::ChanceSum { total });
        }
        Ok(())
    }

    /// Map a roll in `[0, 1)` to a tier. A tier is chosen when the roll is
    /// strictly below the running sum; rounding gaps fall back to Rare.
    #[must_use]
    pub fn resolve(&self, roll: f64) -> RarityTier {
        let mut cumulative = 0.0;
        for tier in RarityTier::RESOLUTION_ORDER {
            cumulative += self.chance(tier);
            if roll < cumulative {
                return tier;
            }
        }
        RarityTier::Rare
    }

    /// Draw a uniform roll and resolve it.
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> RarityTier {
        self.resolve(rng.gen_range(0.0..1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn default_chances_sum_to_one() {
        let table = RarityTable::default();
        assert!((table.total() - 1.0).abs() <= 1e-9);
        table.validate().unwrap();
    }

    #[test]
    fn resolve_uses_strict_upper_bound() {
        let table = RarityTable::default();
        assert_eq!(table.resolve(0.0), RarityTier::Secret);
        // Exactly on the Secret boundary belongs to the next tier.
        assert_eq!(table.resolve(SECRET_CHANCE), RarityTier::Mythic);
        let mythic_edge = SECRET_CHANCE + MYTHIC_CHANCE;
        assert_eq!(table.resolve(mythic_edge - 1e-12), RarityTier::Mythic);
        assert_eq!(table.resolve(mythic_edge), RarityTier::Legendary);
        assert_eq!(table.resolve(0.5), RarityTier::Rare);
    }

    #[test]
    fn resolve_falls_back_to_rare_past_the_table() {
        let table = RarityTable {
            secret: 0.0,
            mythic: 0.0,
            legendary: 0.0,
            epic: 0.0,
            rare: 0.999_999,
        };
        assert_eq!(table.resolve(0.999_999_5), RarityTier::Rare);
    }

    #[test]
    fn validate_rejects_bad_sum_and_ranges() {
        let mut table = RarityTable::default();
        table.rare = 0.5;
        assert!(matches!(
            table.validate(),
            Err(ConfigError::ChanceSum { .. })
        ));

        let mut negative = RarityTable::default();
        negative.epic = -0.1;
        assert!(matches!(
            negative.validate(),
            Err(ConfigError::RangeViolation { .. })
        ));
    }

    #[test]
    fn sampled_distribution_tracks_base_chances() {
        let table = RarityTable::default();
        let mut rng = SmallRng::seed_from_u64(2024);
        let rolls = 200_000;
        let mut rare = 0u32;
        let mut epic = 0u32;
        for _ in 0..rolls {
            match table.roll(&mut rng) {
                RarityTier::Rare => rare += 1,
                RarityTier::Epic => epic += 1,
                _ => {}
            }
        }
        let rare_ratio = f64::from(rare) / f64::from(rolls);
        let epic_ratio = f64::from(epic) / f64::from(rolls);
        assert!((rare_ratio - RARE_CHANCE).abs() < 0.01, "rare {rare_ratio}");
        assert!((epic_ratio - EPIC_CHANCE).abs() < 0.01, "epic {epic_ratio}");
    }

    #[test]
    fn tiers_order_by_rarity() {
        assert!(RarityTier::Secret > RarityTier::Mythic);
        assert!(RarityTier::Mythic > RarityTier::Legendary);
        assert!(RarityTier::Rare < RarityTier::Epic);
        assert!(RarityTier::Legendary.allows_bonus_variant());
        assert!(!RarityTier::Epic.allows_bonus_variant());
        assert_eq!(RarityTier::Mythic.to_string(), "Mythic");
    }
}
