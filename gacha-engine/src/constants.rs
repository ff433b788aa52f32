//! Centralized balance and tuning constants for the summon and trait engines.
//!
//! These values are the defaults baked into [`crate::config::EngineConfig`].
//! A JSON config may override them, but validation keeps the overrides inside
//! the same shape (five tiers, two pity thresholds, one guaranteed trait).

// Request bounds -----------------------------------------------------------
pub const MIN_DRAWS_PER_BATCH: u32 = 1;
pub const MAX_DRAWS_PER_BATCH: u32 = 100;
pub const MIN_TRAIT_ROLLS_PER_BATCH: u32 = 1;
pub const MAX_TRAIT_ROLLS_PER_BATCH: u32 = 10_000;

// Summon economy -----------------------------------------------------------
pub const SUMMON_UNIT_COST: u32 = 50;

// Rarity base chances ------------------------------------------------------
pub const SECRET_CHANCE: f64 = 0.000_04;
pub const MYTHIC_CHANCE: f64 = 0.005;
pub const LEGENDARY_CHANCE: f64 = 0.04;
pub const EPIC_CHANCE: f64 = 0.20;
pub const RARE_CHANCE: f64 = 0.754_96;
pub const CHANCE_SUM_TOLERANCE: f64 = 1e-9;

// Banner probability mass inside the mythic pool -----------------------------
pub const BANNER_PRIMARY_MASS: f64 = 0.50;
pub const BANNER_SECONDARY_MASS: f64 = 0.20;
pub const BANNER_SLOT_COUNT: usize = 3;

// Pity thresholds ------------------------------------------------------------
pub const TIER_A_PITY_THRESHOLD: u32 = 400;
pub const TIER_B_PITY_THRESHOLD: u32 = 50;

// Shiny variant chances ------------------------------------------------------
pub const SHINY_BASE_CHANCE: f64 = 0.015;
pub const SHINY_HUNTER_CHANCE: f64 = 0.03;

// Trait rolls ------------------------------------------------------------------
pub const TRAIT_PITY_THRESHOLD: u32 = 2_500;

// Trait rarity denominators (one in N) -------------------------------------------
pub const RANGE_DENOMINATOR: f64 = 3.85;
pub const SWIFT_DENOMINATOR: f64 = 3.85;
pub const VIGOR_DENOMINATOR: f64 = 3.85;
pub const SCHOLAR_DENOMINATOR: f64 = 10.0;
pub const MARKSMAN_DENOMINATOR: f64 = 15.39;
pub const FORTUNE_DENOMINATOR: f64 = 40.0;
pub const BLITZ_DENOMINATOR: f64 = 54.05;
pub const SOLAR_DENOMINATOR: f64 = 200.0;
pub const DEADEYE_DENOMINATOR: f64 = 266.67;
pub const ETHEREAL_DENOMINATOR: f64 = 571.43;
pub const MONARCH_DENOMINATOR: f64 = 1_000.0;

// Logging targets ----------------------------------------------------------------
pub(crate) const LOG_TARGET_DRAW: &str = "gacha::draw";
pub(crate) const LOG_TARGET_BANNER: &str = "gacha::banner";
pub(crate) const LOG_TARGET_TRAITS: &str = "gacha::traits";
pub(crate) const LOG_TARGET_STORE: &str = "gacha::store";
