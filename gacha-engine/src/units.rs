//! Unit roster per rarity tier and in-tier item resolution.
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::banner::{BannerMass, BannerState};
use crate::config::ConfigError;
use crate::rarity::RarityTier;

/// A drawable unit. Identity is the `(tier, name)` pair; the same name may
/// appear in more than one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub tier: RarityTier,
    pub shiny_eligible: bool,
}

/// Serialized shape of one tier in the roster file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPool {
    pub weight: f64,
    pub units: Vec<String>,
}

/// Serialized roster: tier pools plus the shiny-eligible name set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRoster {
    pub tiers: BTreeMap<RarityTier, TierPool>,
    #[serde(default)]
    pub shiny_eligible: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct ResolvedPool {
    weight: f64,
    items: Vec<Item>,
}

/// Validated unit table. Every tier has at least one item and a positive weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UnitRoster", into = "UnitRoster")]
pub struct UnitTable {
    pools: BTreeMap<RarityTier, ResolvedPool>,
}

/// One candidate with its effective sampling weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedItem<'a> {
    pub item: &'a Item,
    pub weight: f64,
}

impl TryFrom<UnitRoster> for UnitTable {
    type Error = ConfigError;

    fn try_from(roster: UnitRoster) -> Result<Self, Self::Error> {
        let shiny: BTreeSet<&str> = roster.shiny_eligible.iter().map(String::as_str).collect();
        let mut pools = BTreeMap::new();
        for tier in RarityTier::ALL {
            let Some(pool) = roster.tiers.get(&tier) else {
                return Err(ConfigError::EmptyTier { tier });
            };
            if pool.units.is_empty() {
                return Err(ConfigError::EmptyTier { tier });
            }
            if !(pool.weight.is_finite() && pool.weight > 0.0) {
                return Err(ConfigError::RangeViolation {
                    field: format!("units.{}.weight", tier.label().to_ascii_lowercase()),
                    min: f64::MIN_POSITIVE,
                    max: f64::MAX,
                    value: pool.weight,
                });
            }
            let mut seen = BTreeSet::new();
            let mut items = Vec::with_capacity(pool.units.len());
            for name in &pool.units {
                let trimmed = name.trim();
                if !seen.insert(trimmed.to_lowercase()) {
                    return Err(ConfigError::DuplicateItem {
                        tier,
                        name: trimmed.to_string(),
                    });
                }
                items.push(Item {
                    name: trimmed.to_string(),
                    tier,
                    shiny_eligible: shiny.contains(trimmed),
                });
            }
            pools.insert(
                tier,
                ResolvedPool {
                    weight: pool.weight,
                    items,
                },
            );
        }

        let all_names: BTreeSet<&str> = pools
            .values()
            .flat_map(|pool| pool.items.iter().map(|item| item.name.as_str()))
            .collect();
        if let Some(unknown) = shiny.iter().find(|name| !all_names.contains(*name)) {
            return Err(ConfigError::UnknownShinyItem {
                name: (*unknown).to_string(),
            });
        }

        Ok(Self { pools })
    }
}

impl From<UnitTable> for UnitRoster {
    fn from(table: UnitTable) -> Self {
        let mut shiny = BTreeSet::new();
        let tiers = table
            .pools
            .into_iter()
            .map(|(tier, pool)| {
                let units = pool
                    .items
                    .into_iter()
                    .map(|item| {
                        if item.shiny_eligible {
                            shiny.insert(item.name.clone());
                        }
                        item.name
                    })
                    .collect();
                (
                    tier,
                    TierPool {
                        weight: pool.weight,
                        units,
                    },
                )
            })
            .collect();
        Self {
            tiers,
            shiny_eligible: shiny.into_iter().collect(),
        }
    }
}

impl UnitTable {
    /// Table with no tiers; every draw against it fails with an empty pool.
    pub(crate) const fn empty() -> Self {
        Self {
            pools: BTreeMap::new(),
        }
    }

    /// Items of a tier in declared order.
    #[must_use]
    pub fn items(&self, tier: RarityTier) -> &[Item] {
        self.pools
            .get(&tier)
            .map_or(&[][..], |pool| pool.items.as_slice())
    }

    /// Base weight shared by every item of the tier.
    #[must_use]
    pub fn base_weight(&self, tier: RarityTier) -> f64 {
        self.pools.get(&tier).map_or(0.0, |pool| pool.weight)
    }

    /// Case-insensitive lookup of an item within one tier.
    #[must_use]
    pub fn find(&self, tier: RarityTier, name: &str) -> Option<&Item> {
        let needle = name.trim();
        self.items(tier)
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(needle))
    }

    /// Effective sampling weights for a tier under the given banner.
    ///
    /// Outside the mythic tier (or with no featured mythic present) every item
    /// carries the tier's base weight. In the mythic tier each featured item
    /// carries its slot's probability mass and the non-featured items share the
    /// remaining mass in proportion to their base weights, so the weights sum
    /// to one and a primary unit lands exactly on its mass.
    #[must_use]
    pub fn weights_for(
        &self,
        tier: RarityTier,
        banner: &BannerState,
        masses: &BannerMass,
    ) -> Vec<WeightedItem<'_>> {
        let items = self.items(tier);
        let base = self.base_weight(tier);
        let featured_mass = |item: &Item| {
            banner
                .slot_of(&item.name)
                .map(|slot| masses.mass(slot))
        };

        let featured_total: f64 = if tier == RarityTier::Mythic {
            items.iter().filter_map(featured_mass).sum()
        } else {
            0.0
        };
        if featured_total <= 0.0 {
            return items
                .iter()
                .map(|item| WeightedItem { item, weight: base })
                .collect();
        }

        let others_total: f64 = items
            .iter()
            .filter(|item| featured_mass(*item).is_none())
            .map(|_| base)
            .sum();
        let remaining = (1.0 - featured_total).max(0.0);
        let scale = if others_total > 0.0 {
            remaining / others_total
        } else {
            0.0
        };

        items
            .iter()
            .map(|item| {
                let weight = featured_mass(item).unwrap_or(base * scale);
                WeightedItem { item, weight }
            })
            .collect()
    }

    /// Draw one item of the tier.
    ///
    /// Returns `None` only when the tier has no items.
    pub fn resolve_item<R: Rng + ?Sized>(
        &self,
        tier: RarityTier,
        banner: &BannerState,
        masses: &BannerMass,
        rng: &mut R,
    ) -> Option<&Item> {
        let weights = self.weights_for(tier, banner, masses);
        let total: f64 = weights.iter().map(|candidate| candidate.weight).sum();
        if total > 0.0 && total.is_finite() {
            let roll = rng.gen_range(0.0..total);
            if let Some(item) = pick_by_roll(&weights, roll) {
                return Some(item);
            }
        }
        self.items(tier).choose(rng)
    }
}

/// Walk candidates in order and return the first whose running weight is at
/// or above the roll. The bound is inclusive, unlike rarity resolution.
#[must_use]
pub fn pick_by_roll<'a>(weights: &[WeightedItem<'a>], roll: f64) -> Option<&'a Item> {
    let mut cumulative = 0.0;
    for candidate in weights {
        cumulative += candidate.weight;
        if roll <= cumulative {
            return Some(candidate.item);
        }
    }
    None
}
