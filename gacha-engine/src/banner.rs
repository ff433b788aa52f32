//! Featured banner slots, the shared snapshot board and banner ingestion.
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::constants::{
    BANNER_PRIMARY_MASS, BANNER_SECONDARY_MASS, BANNER_SLOT_COUNT, LOG_TARGET_BANNER,
};
use crate::error::IngestFailure;
use crate::rarity::RarityTier;
use crate::units::UnitTable;

/// Featured slot on the banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerSlot {
    Primary,
    SecondaryA,
    SecondaryB,
}

impl BannerSlot {
    /// Slots in ingestion order.
    pub const ALL: [Self; BANNER_SLOT_COUNT] = [Self::Primary, Self::SecondaryA, Self::SecondaryB];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Primary => "Middle",
            Self::SecondaryA => "Left",
            Self::SecondaryB => "Right",
        }
    }
}

impl fmt::Display for BannerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Probability mass a featured mythic receives, per slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannerMass {
    #[serde(default = "BannerMass::default_primary")]
    pub primary: f64,
    #[serde(default = "BannerMass::default_secondary")]
    pub secondary: f64,
}

impl BannerMass {
    const fn default_primary() -> f64 {
        BANNER_PRIMARY_MASS
    }

    const fn default_secondary() -> f64 {
        BANNER_SECONDARY_MASS
    }

    #[must_use]
    pub const fn mass(&self, slot: BannerSlot) -> f64 {
        match slot {
            BannerSlot::Primary => self.primary,
            BannerSlot::SecondaryA | BannerSlot::SecondaryB => self.secondary,
        }
    }
}

impl Default for BannerMass {
    fn default() -> Self {
        Self {
            primary: Self::default_primary(),
            secondary: Self::default_secondary(),
        }
    }
}

/// Slot assignments. A unit name occupies at most one slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerState {
    #[serde(default)]
    primary: Option<String>,
    #[serde(default)]
    secondary_a: Option<String>,
    #[serde(default)]
    secondary_b: Option<String>,
}

impl BannerState {
    const fn slot_ref(&self, slot: BannerSlot) -> &Option<String> {
        match slot {
            BannerSlot::Primary => &self.primary,
            BannerSlot::SecondaryA => &self.secondary_a,
            BannerSlot::SecondaryB => &self.secondary_b,
        }
    }

    const fn slot_mut(&mut self, slot: BannerSlot) -> &mut Option<String> {
        match slot {
            BannerSlot::Primary => &mut self.primary,
            BannerSlot::SecondaryA => &mut self.secondary_a,
            BannerSlot::SecondaryB => &mut self.secondary_b,
        }
    }

    #[must_use]
    pub fn get(&self, slot: BannerSlot) -> Option<&str> {
        self.slot_ref(slot).as_deref()
    }

    /// Put `name` in `slot`, evicting it from any other slot it held.
    pub fn assign(&mut self, slot: BannerSlot, name: String) {
        for other in BannerSlot::ALL {
            if other != slot
                && self
                    .get(other)
                    .is_some_and(|held| held.eq_ignore_ascii_case(&name))
            {
                *self.slot_mut(other) = None;
            }
        }
        *self.slot_mut(slot) = Some(name);
    }

    /// Slot currently holding `name`, if any.
    #[must_use]
    pub fn slot_of(&self, name: &str) -> Option<BannerSlot> {
        BannerSlot::ALL.into_iter().find(|slot| {
            self.get(*slot)
                .is_some_and(|held| held.eq_ignore_ascii_case(name))
        })
    }

    /// Occupied slots in slot order.
    pub fn featured(&self) -> impl Iterator<Item = (BannerSlot, &str)> {
        BannerSlot::ALL
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|name| (slot, name)))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.featured().next().is_none()
    }

    /// Build a full banner from up to three names, all-or-nothing.
    ///
    /// Names map to primary, secondary-A and secondary-B in order and must
    /// match mythic units case-insensitively. Stored names use roster casing.
    ///
    /// # Errors
    ///
    /// Returns `IngestFailure::UnmatchedName` for a name outside the mythic
    /// pool, `TooManyNames` for more than three names and `FewerThanThree`
    /// when fewer than three distinct units matched.
    pub fn from_names<S: AsRef<str>>(names: &[S], units: &UnitTable) -> Result<Self, IngestFailure> {
        if names.len() > BANNER_SLOT_COUNT {
            return Err(IngestFailure::TooManyNames { count: names.len() });
        }
        let mut matched: Vec<String> = Vec::with_capacity(BANNER_SLOT_COUNT);
        for raw in names {
            let name = raw.as_ref();
            let Some(item) = units.find(RarityTier::Mythic, name) else {
                return Err(IngestFailure::UnmatchedName {
                    name: name.trim().to_string(),
                });
            };
            if !matched.iter().any(|held| held == &item.name) {
                matched.push(item.name.clone());
            }
        }
        if matched.len() < BANNER_SLOT_COUNT {
            return Err(IngestFailure::FewerThanThree {
                found: matched.len(),
            });
        }
        let mut banner = Self::default();
        for (slot, name) in BannerSlot::ALL.into_iter().zip(matched) {
            banner.assign(slot, name);
        }
        Ok(banner)
    }
}

/// Scan OCR text for mythic unit names.
///
/// Mythic units are checked in roster order with a case-insensitive substring
/// match; scanning stops after three hits.
#[must_use]
pub fn extract_banner_names(text: &str, units: &UnitTable) -> Vec<String> {
    let mut found = Vec::with_capacity(BANNER_SLOT_COUNT);
    for item in units.items(RarityTier::Mythic) {
        let Ok(pattern) = RegexBuilder::new(&regex::escape(&item.name))
            .case_insensitive(true)
            .build()
        else {
            continue;
        };
        if pattern.is_match(text) {
            found.push(item.name.clone());
        }
        if found.len() == BANNER_SLOT_COUNT {
            break;
        }
    }
    found
}

/// Collaborator that turns a banner image into text.
pub trait TextExtractor {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Decode the image and return the recognized text.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be decoded or read.
    fn extract_text(&self, image: &[u8]) -> Result<String, Self::Error>;
}

/// Process-wide banner holder. Readers take a cheap snapshot; ingestion swaps
/// the whole state in one step.
#[derive(Debug, Default)]
pub struct BannerBoard {
    current: RwLock<Arc<BannerState>>,
    writer: Mutex<()>,
}

impl BannerBoard {
    #[must_use]
    pub fn new(initial: BannerState) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            writer: Mutex::new(()),
        }
    }

    /// Consistent view of the banner for one draw batch.
    #[must_use]
    pub fn snapshot(&self) -> Arc<BannerState> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new banner, returning the previous one.
    pub fn replace(&self, next: BannerState) -> Arc<BannerState> {
        log::info!(
            target: LOG_TARGET_BANNER,
            "banner updated: {}",
            next.featured()
                .map(|(slot, name)| format!("{slot}={name}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(next))
    }

    /// Persist `next` and install it as one exclusive update.
    ///
    /// Concurrent publishers run one at a time, so the last banner persisted
    /// is always the live one. Readers keep their snapshots meanwhile. If
    /// `persist` fails the live banner is left as it was.
    ///
    /// # Errors
    ///
    /// Returns whatever `persist` returns.
    pub fn publish<E>(
        &self,
        next: BannerState,
        persist: impl FnOnce(&BannerState) -> Result<(), E>,
    ) -> Result<Arc<BannerState>, E> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        persist(&next)?;
        self.replace(next);
        Ok(self.snapshot())
    }
}
