//! Gacha Engine
//!
//! Probabilistic summon engine with two-tier pity tracking, featured banner
//! slots, and an independent weighted trait roller with its own pity counter.
//! The engines are pure over caller-supplied state; the `async` feature adds
//! [`GachaService`], which serializes per-user work over a [`UserStore`].

pub mod banner;
pub mod config;
pub mod constants;
pub mod draw;
pub mod error;
pub mod numbers;
pub mod pity;
pub mod rarity;
pub mod report;
pub mod rng;
#[cfg(feature = "async")]
pub mod service;
pub mod store;
pub mod traits;
pub mod units;

// Re-export commonly used types
pub use banner::{
    BannerBoard, BannerMass, BannerSlot, BannerState, TextExtractor, extract_banner_names,
};
pub use config::{ConfigError, EngineConfig};
pub use draw::{BonusConfig, DrawBatchResult, DrawEngine, DrawRequest, DrawResult};
pub use error::{GachaError, IngestFailure, StorageError};
pub use pity::{PityConfig, PityState, PityStatus, PityTrigger, resolve_rarity};
pub use rarity::{RarityTable, RarityTier};
pub use rng::{CountingRng, RngStreams, StreamDomain, derive_stream_seed};
#[cfg(feature = "async")]
pub use service::GachaService;
pub use store::{JsonFileStore, MemoryUserStore, StoreDocument, UserId, UserStore};
pub use traits::{
    Trait, TraitBatchResult, TraitCounts, TraitEngine, TraitGroup, TraitPityConfig,
    TraitPityState, TraitTable,
};
pub use units::{Item, UnitRoster, UnitTable, WeightedItem, pick_by_roll};
