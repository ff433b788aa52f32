//! Async front door: per-user serialization, banner snapshots and blocking
//! trait workers around the pure engines.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::banner::{BannerBoard, BannerState, TextExtractor, extract_banner_names};
use crate::config::{ConfigError, EngineConfig};
use crate::constants::{LOG_TARGET_BANNER, LOG_TARGET_DRAW, LOG_TARGET_TRAITS};
use crate::draw::{DrawBatchResult, DrawEngine, DrawRequest};
use crate::error::{GachaError, IngestFailure};
use crate::pity::PityStatus;
use crate::rng::{RngStreams, StreamDomain};
use crate::error::StorageError;
use crate::store::{UserId, UserStore};
use crate::traits::{Trait, TraitBatchResult, TraitEngine, TraitPityState};
use crate::units::UnitTable;

/// One async mutex per user. Entries are never pruned.
#[derive(Debug, Default)]
struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    fn handle(&self, user: &UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(user.clone()).or_default())
    }
}

/// Gacha operations over a user store.
///
/// Calls for the same user run one at a time; different users proceed
/// concurrently. Every batch computes on scratch state and commits with a
/// single store write, so a dropped future never leaves a partial update.
/// Writes run on the blocking pool so file-backed stores do not stall other
/// users' tasks.
#[derive(Debug)]
pub struct GachaService<S: UserStore> {
    draws: DrawEngine,
    traits: Arc<TraitEngine>,
    store: Arc<S>,
    banner: BannerBoard,
    streams: RngStreams,
    locks: UserLocks,
}

impl<S: UserStore + 'static> GachaService<S> {
    /// Build a service with an empty banner.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration fails validation.
    pub fn new(config: &EngineConfig, store: S, streams: RngStreams) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            draws: DrawEngine::new(config),
            traits: Arc::new(TraitEngine::new(&config.traits, config.trait_pity)?),
            store: Arc::new(store),
            banner: BannerBoard::default(),
            streams,
            locks: UserLocks::default(),
        })
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run a store write on the blocking pool.
    async fn write<F>(&self, op: F) -> Result<(), GachaError>
    where
        F: FnOnce(&S) -> Result<(), StorageError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|err| GachaError::Worker(err.to_string()))??;
        Ok(())
    }

    #[must_use]
    pub const fn units(&self) -> &UnitTable {
        self.draws.units()
    }

    /// Current banner snapshot.
    #[must_use]
    pub fn banner(&self) -> Arc<BannerState> {
        self.banner.snapshot()
    }

    /// Install the banner persisted in the store, if any.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::Storage` if the store cannot be read.
    pub fn restore_banner(&self) -> Result<bool, GachaError> {
        match self.store.load_banner()? {
            Some(saved) => {
                self.banner.replace(saved);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run a summon batch for `user`.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::Validation` before touching any state for an
    /// amount outside `1..=100`, and `GachaError::Storage` if the store fails;
    /// the user's pity record is then unchanged.
    pub async fn draw(
        &self,
        user: &UserId,
        request: DrawRequest,
    ) -> Result<DrawBatchResult, GachaError> {
        DrawEngine::validate_amount(request.amount)?;
        let lock = self.locks.handle(user);
        let _guard = lock.lock().await;

        let state = self.store.get_or_create_pity(user)?;
        let banner = self.banner.snapshot();
        let mut rng = self.streams.stream(user, StreamDomain::Summon);
        let (batch, next) = self.draws.draw_batch(state, &request, &banner, &mut rng)?;
        let owner = user.clone();
        self.write(move |store| store.put_pity(&owner, &next)).await?;
        log::debug!(
            target: LOG_TARGET_DRAW,
            "user {user} drew {} (count {} -> {}, {} rng draws)",
            request.amount,
            state.draw_count,
            next.draw_count,
            rng.draws()
        );
        Ok(batch)
    }

    /// Countdown to each guarantee for `user`.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::Storage` if the store cannot be read.
    pub async fn pity_status(&self, user: &UserId) -> Result<PityStatus, GachaError> {
        let lock = self.locks.handle(user);
        let _guard = lock.lock().await;
        let state = self.store.get_or_create_pity(user)?;
        Ok(state.status(self.draws.pity_config()))
    }

    /// Replace the banner from up to three unit names, all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::Ingest` when the names do not form a full banner
    /// and `GachaError::Storage` if it cannot be persisted. The banner is
    /// unchanged in both cases.
    pub fn update_banner<N: AsRef<str>>(&self, names: &[N]) -> Result<Arc<BannerState>, GachaError> {
        let banner = match BannerState::from_names(names, self.units()) {
            Ok(banner) => banner,
            Err(failure) => {
                log::warn!(target: LOG_TARGET_BANNER, "banner update rejected: {failure}");
                return Err(failure.into());
            }
        };
        self.banner
            .publish(banner, |next| self.store.save_banner(next))
            .map_err(GachaError::from)
    }

    /// Update the banner from OCR text.
    ///
    /// # Errors
    ///
    /// See [`GachaService::update_banner`]. Fewer than three recognized names
    /// fail with `IngestFailure::FewerThanThree`.
    pub fn ingest_banner_text(&self, text: &str) -> Result<Arc<BannerState>, GachaError> {
        let names = extract_banner_names(text, self.units());
        log::debug!(target: LOG_TARGET_BANNER, "extracted banner names {names:?}");
        self.update_banner(&names)
    }

    /// Update the banner from an image via `extractor`.
    ///
    /// # Errors
    ///
    /// Returns `IngestFailure::Extraction` if the extractor fails, otherwise
    /// see [`GachaService::ingest_banner_text`].
    pub fn ingest_banner_image<E: TextExtractor>(
        &self,
        extractor: &E,
        image: &[u8],
    ) -> Result<Arc<BannerState>, GachaError> {
        let text = extractor
            .extract_text(image)
            .map_err(|err| IngestFailure::Extraction {
                message: err.to_string(),
            })?;
        self.ingest_banner_text(&text)
    }

    /// Roll `amount` traits for `user` on a blocking worker.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::Validation` for an amount outside `1..=10000`,
    /// `GachaError::Worker` if the worker dies and `GachaError::Storage` if
    /// the commit fails. Nothing is committed on error.
    pub async fn roll_traits(
        &self,
        user: &UserId,
        amount: u32,
    ) -> Result<TraitBatchResult, GachaError> {
        TraitEngine::validate_amount(amount)?;
        let lock = self.locks.handle(user);
        let _guard = lock.lock().await;

        let state = self.store.get_or_create_traits(user)?;
        let engine = Arc::clone(&self.traits);
        let mut rng = self.streams.stream(user, StreamDomain::Traits);
        let (counts, rng_draws) = tokio::task::spawn_blocking(move || {
            let counts = engine.sample_batch(amount, &mut rng);
            (counts, rng.draws())
        })
        .await
        .map_err(|err| GachaError::Worker(err.to_string()))?;

        let (result, next) = self.traits.commit_batch(&state, amount, counts);
        let (owner, record) = (user.clone(), next.clone());
        self.write(move |store| store.put_traits(&owner, &record)).await?;
        log::debug!(
            target: LOG_TARGET_TRAITS,
            "user {user} rolled {amount} traits (pity counter {}, {rng_draws} rng draws)",
            next.pity_counter
        );
        Ok(result)
    }

    /// The user's lifetime trait record, if any.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::Storage` if the store cannot be read.
    pub async fn trait_totals(&self, user: &UserId) -> Result<Option<TraitPityState>, GachaError> {
        let lock = self.locks.handle(user);
        let _guard = lock.lock().await;
        Ok(self.store.load_traits(user)?)
    }

    /// Most-rolled lifetime trait and its count.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::NotFound` if the user has never rolled or was
    /// reset, and `GachaError::Storage` if the store cannot be read.
    pub async fn most_rolled_trait(&self, user: &UserId) -> Result<(Trait, u64), GachaError> {
        let state = self.trait_totals(user).await?;
        let top = TraitEngine::most_rolled(state.as_ref(), user)?;
        let count = state.map_or(0, |s| s.lifetime_totals.get(top));
        Ok((top, count))
    }

    /// Zero the user's trait totals and pity counter. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::Storage` if the reset cannot be written.
    pub async fn reset_trait_totals(&self, user: &UserId) -> Result<(), GachaError> {
        let lock = self.locks.handle(user);
        let _guard = lock.lock().await;
        let owner = user.clone();
        self.write(move |store| store.put_traits(&owner, &TraitPityState::default()))
            .await?;
        log::info!(target: LOG_TARGET_TRAITS, "user {user} trait totals cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryUserStore;

    fn service() -> GachaService<MemoryUserStore> {
        GachaService::new(
            &EngineConfig::default(),
            MemoryUserStore::new(),
            RngStreams::seeded(17),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn out_of_range_draw_leaves_state_untouched() {
        let service = service();
        let user = UserId::from("u");
        service.draw(&user, DrawRequest::new(3, false)).await.unwrap();
        for amount in [0, 101] {
            assert!(matches!(
                service.draw(&user, DrawRequest::new(amount, false)).await,
                Err(GachaError::Validation { .. })
            ));
        }
        assert_eq!(service.store().get_or_create_pity(&user).unwrap().draw_count, 3);
    }

    #[tokio::test]
    async fn reset_then_most_rolled_is_not_found() {
        let service = service();
        let user = UserId::from(5_u64);
        service.roll_traits(&user, 100).await.unwrap();
        assert!(service.most_rolled_trait(&user).await.is_ok());
        service.reset_trait_totals(&user).await.unwrap();
        service.reset_trait_totals(&user).await.unwrap();
        assert!(matches!(
            service.most_rolled_trait(&user).await,
            Err(GachaError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn pity_status_tracks_draws() {
        let service = service();
        let user = UserId::from("p");
        service.draw(&user, DrawRequest::new(20, false)).await.unwrap();
        let status = service.pity_status(&user).await.unwrap();
        assert_eq!(status.until_tier_b, 30);
        assert_eq!(status.until_tier_a, 380);
    }

    #[test]
    fn rejected_banner_keeps_previous() {
        let service = service();
        service.update_banner(&["Saber", "Medusa", "Archer"]).unwrap();
        let err = service.update_banner(&["Saber", "Medusa"]).unwrap_err();
        assert!(matches!(
            err,
            GachaError::Ingest(IngestFailure::FewerThanThree { found: 2 })
        ));
        assert_eq!(
            service.banner().get(crate::banner::BannerSlot::SecondaryB),
            Some("Archer")
        );
        assert!(service.store().load_banner().unwrap().is_some());
    }
}
