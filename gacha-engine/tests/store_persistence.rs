use gacha_engine::{
    BannerSlot, BannerState, DrawRequest, EngineConfig, GachaError, GachaService, JsonFileStore,
    MemoryUserStore, PityState, RngStreams, StorageError, TraitPityState, UserId, UserStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Memory store whose writes can be switched off.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryUserStore,
    fail_writes: AtomicBool,
    panic_writes: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> Result<(), StorageError> {
        assert!(!self.panic_writes.load(Ordering::SeqCst), "store write crashed");
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("write rejected".into()));
        }
        Ok(())
    }
}

impl UserStore for FlakyStore {
    fn get_or_create_pity(&self, user: &UserId) -> Result<PityState, StorageError> {
        self.inner.get_or_create_pity(user)
    }

    fn put_pity(&self, user: &UserId, state: &PityState) -> Result<(), StorageError> {
        self.check()?;
        self.inner.put_pity(user, state)
    }

    fn get_or_create_traits(&self, user: &UserId) -> Result<TraitPityState, StorageError> {
        self.inner.get_or_create_traits(user)
    }

    fn load_traits(&self, user: &UserId) -> Result<Option<TraitPityState>, StorageError> {
        self.inner.load_traits(user)
    }

    fn put_traits(&self, user: &UserId, state: &TraitPityState) -> Result<(), StorageError> {
        self.check()?;
        self.inner.put_traits(user, state)
    }

    fn save_banner(&self, banner: &BannerState) -> Result<(), StorageError> {
        self.check()?;
        self.inner.save_banner(banner)
    }
}

#[tokio::test]
async fn crashed_store_write_surfaces_as_worker_error() {
    let service = GachaService::new(
        &EngineConfig::default(),
        FlakyStore::default(),
        RngStreams::seeded(12),
    )
    .expect("config");
    let user = UserId::from("crash");
    service
        .draw(&user, DrawRequest::new(5, false))
        .await
        .expect("first draw");

    service.store().panic_writes.store(true, Ordering::SeqCst);
    let err = service
        .draw(&user, DrawRequest::new(5, false))
        .await
        .expect_err("write crashes");
    assert!(matches!(err, GachaError::Worker(_)));
    let err = service.reset_trait_totals(&user).await.expect_err("write crashes");
    assert!(matches!(err, GachaError::Worker(_)));

    service.store().panic_writes.store(false, Ordering::SeqCst);
    assert_eq!(
        service.store().get_or_create_pity(&user).expect("state").draw_count,
        5
    );
    service
        .draw(&user, DrawRequest::new(5, false))
        .await
        .expect("store recovers");
}

/// Memory store that stalls after persisting a Saber-led banner.
#[derive(Default)]
struct SlowBannerStore {
    inner: MemoryUserStore,
    saving_saber: AtomicBool,
}

impl UserStore for SlowBannerStore {
    fn get_or_create_pity(&self, user: &UserId) -> Result<PityState, StorageError> {
        self.inner.get_or_create_pity(user)
    }

    fn put_pity(&self, user: &UserId, state: &PityState) -> Result<(), StorageError> {
        self.inner.put_pity(user, state)
    }

    fn get_or_create_traits(&self, user: &UserId) -> Result<TraitPityState, StorageError> {
        self.inner.get_or_create_traits(user)
    }

    fn load_traits(&self, user: &UserId) -> Result<Option<TraitPityState>, StorageError> {
        self.inner.load_traits(user)
    }

    fn put_traits(&self, user: &UserId, state: &TraitPityState) -> Result<(), StorageError> {
        self.inner.put_traits(user, state)
    }

    fn load_banner(&self) -> Result<Option<BannerState>, StorageError> {
        self.inner.load_banner()
    }

    fn save_banner(&self, banner: &BannerState) -> Result<(), StorageError> {
        self.inner.save_banner(banner)?;
        if banner.get(BannerSlot::Primary) == Some("Saber") {
            self.saving_saber.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
        }
        Ok(())
    }
}

#[test]
fn overlapping_banner_updates_keep_store_and_live_banner_in_step() {
    let service = Arc::new(
        GachaService::new(
            &EngineConfig::default(),
            SlowBannerStore::default(),
            RngStreams::seeded(6),
        )
        .expect("config"),
    );

    let first = {
        let service = Arc::clone(&service);
        std::thread::spawn(move || {
            service
                .update_banner(&["Saber", "Medusa", "Archer"])
                .expect("first banner")
        })
    };
    while !service.store().saving_saber.load(Ordering::SeqCst) {
        std::thread::yield_now();
    }
    service
        .update_banner(&["Gujo", "Chaso", "Giro"])
        .expect("second banner");
    first.join().expect("first update thread");

    let stored = service
        .store()
        .load_banner()
        .expect("load")
        .expect("saved banner");
    assert_eq!(stored.get(BannerSlot::Primary), Some("Gujo"));
    assert_eq!(*service.banner(), stored);
}

fn state_path(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    std::env::temp_dir()
        .join(format!("gacha-it-{tag}-{}-{nanos}", std::process::id()))
        .join("state.json")
}

#[tokio::test]
async fn storage_failure_fails_the_batch_atomically() {
    let service = GachaService::new(
        &EngineConfig::default(),
        FlakyStore::default(),
        RngStreams::seeded(4),
    )
    .expect("config");
    let user = UserId::from("flaky");
    service
        .draw(&user, DrawRequest::new(10, false))
        .await
        .expect("first draw");
    service.roll_traits(&user, 50).await.expect("first roll");
    service
        .update_banner(&["Saber", "Medusa", "Archer"])
        .expect("banner");

    service.store().fail_writes.store(true, Ordering::SeqCst);
    let err = service
        .draw(&user, DrawRequest::new(10, false))
        .await
        .expect_err("write fails");
    assert!(matches!(err, GachaError::Storage(StorageError::Unavailable(_))));
    let err = service.roll_traits(&user, 50).await.expect_err("write fails");
    assert!(matches!(err, GachaError::Storage(_)));
    assert!(service.update_banner(&["Gujo", "Chaso", "Giro"]).is_err());

    assert_eq!(
        service.store().get_or_create_pity(&user).expect("state").draw_count,
        10
    );
    let traits = service
        .store()
        .load_traits(&user)
        .expect("load")
        .expect("record");
    assert_eq!(traits.pity_counter, 50);
    assert_eq!(traits.lifetime_totals.total(), 50);
    assert_eq!(service.banner().get(BannerSlot::Primary), Some("Saber"));
}

#[tokio::test]
async fn file_store_survives_a_restart() {
    let path = state_path("restart");
    let user = UserId::from("persist");
    {
        let store = JsonFileStore::open(&path).expect("open");
        let service =
            GachaService::new(&EngineConfig::default(), store, RngStreams::seeded(8)).expect("config");
        service
            .draw(&user, DrawRequest::new(30, false))
            .await
            .expect("draw");
        service.roll_traits(&user, 300).await.expect("roll");
        service
            .update_banner(&["Lilia", "Yuruicha", "Kempache"])
            .expect("banner");
    }

    let store = JsonFileStore::open(&path).expect("reopen");
    let service =
        GachaService::new(&EngineConfig::default(), store, RngStreams::seeded(8)).expect("config");
    assert!(service.restore_banner().expect("restore"));
    assert_eq!(service.banner().get(BannerSlot::SecondaryA), Some("Yuruicha"));
    let status = service.pity_status(&user).await.expect("status");
    assert_eq!(status.until_tier_b, 20);
    let totals = service
        .trait_totals(&user)
        .await
        .expect("load")
        .expect("record");
    assert_eq!(totals.pity_counter, 300);
    assert_eq!(totals.lifetime_totals.total(), 300);

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}
