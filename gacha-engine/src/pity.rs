//! Two-tier pity counter for summon batches.
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{TIER_A_PITY_THRESHOLD, TIER_B_PITY_THRESHOLD};
use crate::rarity::{RarityTable, RarityTier};

/// Guarantee that decided a draw's rarity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PityTrigger {
    #[default]
    None,
    /// Forced Mythic.
    TierA,
    /// Forced Legendary.
    TierB,
}

impl PityTrigger {
    /// Rarity forced by this trigger, if any.
    #[must_use]
    pub const fn forced_tier(self) -> Option<RarityTier> {
        match self {
            Self::None => None,
            Self::TierA => Some(RarityTier::Mythic),
            Self::TierB => Some(RarityTier::Legendary),
        }
    }

    #[must_use]
    pub const fn fired(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Pity thresholds, counted in draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PityConfig {
    #[serde(default = "PityConfig::default_tier_a")]
    pub tier_a_threshold: u32,
    #[serde(default = "PityConfig::default_tier_b")]
    pub tier_b_threshold: u32,
}

impl PityConfig {
    const fn default_tier_a() -> u32 {
        TIER_A_PITY_THRESHOLD
    }

    const fn default_tier_b() -> u32 {
        TIER_B_PITY_THRESHOLD
    }
}

impl Default for PityConfig {
    fn default() -> Self {
        Self {
            tier_a_threshold: TIER_A_PITY_THRESHOLD,
            tier_b_threshold: TIER_B_PITY_THRESHOLD,
        }
    }
}

/// Per-user summon pity record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PityState {
    #[serde(default)]
    pub draw_count: u32,
    #[serde(default, rename = "tierAGuaranteed")]
    pub tier_a_guaranteed: bool,
    #[serde(default, rename = "tierBGuaranteed")]
    pub tier_b_guaranteed: bool,
}

/// Draws remaining before each guarantee fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PityStatus {
    pub until_tier_a: u32,
    pub until_tier_b: u32,
}

impl PityState {
    #[must_use]
    pub const fn new(draw_count: u32) -> Self {
        Self {
            draw_count,
            tier_a_guaranteed: false,
            tier_b_guaranteed: false,
        }
    }

    /// Decide whether the next draw is forced.
    ///
    /// The next draw is ordinal `draw_count + 1`; a guarantee fires once that
    /// ordinal reaches its threshold and the latch is not already set. Tier-A
    /// wins when both qualify. Firing sets the matching latch.
    ///
    /// Counting the pending draw means a stored count of 399 forces the very
    /// next summon, so the 400th summon is the guaranteed one rather than the
    /// 401st.
    pub fn check(&mut self, config: &PityConfig) -> PityTrigger {
        let ordinal = self.draw_count.saturating_add(1);
        if ordinal >= config.tier_a_threshold && !self.tier_a_guaranteed {
            self.tier_a_guaranteed = true;
            PityTrigger::TierA
        } else if ordinal >= config.tier_b_threshold && !self.tier_b_guaranteed {
            self.tier_b_guaranteed = true;
            PityTrigger::TierB
        } else {
            PityTrigger::None
        }
    }

    /// Update the counter after a draw resolved with `trigger`.
    ///
    /// Tier-A resets the count and both latches. Tier-B resets the count and
    /// its own latch only. Otherwise the count advances by one.
    pub const fn record_draw(&mut self, trigger: PityTrigger) {
        match trigger {
            PityTrigger::TierA => {
                self.draw_count = 0;
                self.tier_a_guaranteed = false;
                self.tier_b_guaranteed = false;
            }
            PityTrigger::TierB => {
                self.draw_count = 0;
                self.tier_b_guaranteed = false;
            }
            PityTrigger::None => {
                self.draw_count = self.draw_count.saturating_add(1);
            }
        }
    }

    #[must_use]
    pub const fn status(&self, config: &PityConfig) -> PityStatus {
        PityStatus {
            until_tier_a: config.tier_a_threshold.saturating_sub(self.draw_count),
            until_tier_b: config.tier_b_threshold.saturating_sub(self.draw_count),
        }
    }
}

/// Resolve the rarity of one draw, applying pity first.
///
/// The state is updated in place: latches by [`PityState::check`] and the
/// counter by [`PityState::record_draw`].
pub fn resolve_rarity<R: Rng + ?Sized>(
    state: &mut PityState,
    config: &PityConfig,
    table: &RarityTable,
    rng: &mut R,
) -> (RarityTier, PityTrigger) {
    let trigger = state.check(config);
    let tier = trigger
        .forced_tier()
        .unwrap_or_else(|| table.roll(rng));
    state.record_draw(trigger);
    (tier, trigger)
}
