//! Engine configuration: tables, thresholds and the bundled unit roster.
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

use crate::banner::BannerMass;
use crate::constants::SUMMON_UNIT_COST;
use crate::draw::BonusConfig;
use crate::pity::PityConfig;
use crate::rarity::{RarityTable, RarityTier};
use crate::traits::{TraitPityConfig, TraitTable};
use crate::units::UnitTable;

const DEFAULT_CATALOG_DATA: &str = include_str!("../data/catalog.json");

/// Configuration problems found while loading or validating.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be between {min} and {max} (got {value})")]
    RangeViolation {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("rarity chances must sum to 1.0 (got {total})")]
    ChanceSum { total: f64 },
    #[error("tier {tier} has no units")]
    EmptyTier { tier: RarityTier },
    #[error("duplicate unit {name:?} in tier {tier}")]
    DuplicateItem { tier: RarityTier, name: String },
    #[error("shiny-eligible unit {name:?} is not in the roster")]
    UnknownShinyItem { name: String },
    #[error("trait weights invalid: {0}")]
    InvalidWeights(String),
    #[error("config is malformed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Everything the draw and trait engines need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub rarity: RarityTable,
    #[serde(default = "EngineConfig::default_units")]
    pub units: UnitTable,
    #[serde(default)]
    pub banner_mass: BannerMass,
    #[serde(default)]
    pub pity: PityConfig,
    #[serde(default)]
    pub bonus: BonusConfig,
    #[serde(default = "EngineConfig::default_unit_cost")]
    pub unit_cost: u32,
    #[serde(default)]
    pub traits: TraitTable,
    #[serde(default)]
    pub trait_pity: TraitPityConfig,
}

impl EngineConfig {
    /// The bundled roster from `data/catalog.json`.
    #[must_use]
    pub fn default_units() -> UnitTable {
        static CATALOG: OnceLock<UnitTable> = OnceLock::new();
        CATALOG
            .get_or_init(|| {
                serde_json::from_str(DEFAULT_CATALOG_DATA).unwrap_or_else(|err| {
                    log::error!("bundled unit catalog is invalid: {err}");
                    UnitTable::empty()
                })
            })
            .clone()
    }

    #[must_use]
    pub const fn default_unit_cost() -> u32 {
        SUMMON_UNIT_COST
    }

    /// Parse and validate a JSON config. Omitted sections take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON (including an invalid
    /// roster) and the validation error for out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first field that violates its bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rarity.validate()?;
        for tier in RarityTier::ALL {
            if self.units.items(tier).is_empty() {
                return Err(ConfigError::EmptyTier { tier });
            }
        }
        self.validate_banner_mass()?;
        self.validate_thresholds()?;
        validate_probability("bonus.base_chance", self.bonus.base_chance)?;
        validate_probability("bonus.hunter_chance", self.bonus.hunter_chance)?;
        self.traits.weights()?;
        Ok(())
    }

    fn validate_banner_mass(&self) -> Result<(), ConfigError> {
        validate_probability("banner_mass.primary", self.banner_mass.primary)?;
        validate_probability("banner_mass.secondary", self.banner_mass.secondary)?;
        let total = self.banner_mass.primary + 2.0 * self.banner_mass.secondary;
        if total > 1.0 {
            return Err(ConfigError::RangeViolation {
                field: "banner_mass.total".to_string(),
                min: 0.0,
                max: 1.0,
                value: total,
            });
        }
        Ok(())
    }

    fn validate_thresholds(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("pity.tier_a_threshold", self.pity.tier_a_threshold),
            ("pity.tier_b_threshold", self.pity.tier_b_threshold),
            ("trait_pity.threshold", self.trait_pity.threshold),
        ];
        for (field, value) in thresholds {
            if value == 0 {
                return Err(ConfigError::RangeViolation {
                    field: field.to_string(),
                    min: 1.0,
                    max: f64::from(u32::MAX),
                    value: 0.0,
                });
            }
        }
        Ok(())
    }
}

fn validate_probability(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::RangeViolation {
            field: field.to_string(),
            min: 0.0,
            max: 1.0,
            value,
        });
    }
    Ok(())
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rarity: RarityTable::default(),
            units: Self::default_units(),
            banner_mass: BannerMass::default(),
            pity: PityConfig::default(),
            bonus: BonusConfig::default(),
            unit_cost: Self::default_unit_cost(),
            traits: TraitTable::default(),
            trait_pity: TraitPityConfig::default(),
        }
    }
}
