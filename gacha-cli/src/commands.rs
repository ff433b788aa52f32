use anyhow::{Context, Result};
use gacha_engine::{
    BannerState, DrawBatchResult, DrawRequest, EngineConfig, GachaError, GachaService,
    JsonFileStore, PityStatus, RngStreams, TextExtractor, Trait, TraitBatchResult, UserId,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::simulation::{SimulationConfig, SimulationReport, run_simulation};

/// Reads an OCR dump that was already converted to UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Text;

impl TextExtractor for Utf8Text {
    type Error = std::str::Utf8Error;

    fn extract_text(&self, image: &[u8]) -> Result<String, Self::Error> {
        std::str::from_utf8(image).map(str::to_owned)
    }
}

/// One command's result, rendered by the report layer.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Summon {
        user: UserId,
        batch: DrawBatchResult,
    },
    Traits {
        user: UserId,
        batch: TraitBatchResult,
    },
    AverageTrait {
        user: UserId,
        #[serde(rename = "trait")]
        top: Trait,
        count: u64,
    },
    NoTraits {
        user: UserId,
    },
    TraitsCleared {
        user: UserId,
    },
    PityStatus {
        user: UserId,
        status: PityStatus,
    },
    Banner {
        updated: bool,
        banner: BannerState,
    },
    BannerRejected {
        reason: String,
        message: String,
    },
    Simulation(SimulationReport),
}

impl Outcome {
    /// Whether the process should exit successfully.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        match self {
            Self::BannerRejected { .. } => false,
            Self::Simulation(report) => report.passed(),
            _ => true,
        }
    }
}

/// Where a command reads its engine from.
#[derive(Debug, Clone)]
pub struct Session {
    pub state: PathBuf,
    pub config: Option<PathBuf>,
    pub seed: Option<u64>,
    pub user: UserId,
}

impl Session {
    /// Load the engine configuration, falling back to the built-in defaults.
    ///
    /// # Errors
    ///
    /// Fails if the configuration file cannot be read or is invalid.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let Some(path) = &self.config else {
            return Ok(EngineConfig::default());
        };
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        EngineConfig::from_json(&json)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    fn streams(&self) -> RngStreams {
        self.seed.map_or_else(RngStreams::from_entropy, RngStreams::seeded)
    }

    fn service(&self) -> Result<GachaService<JsonFileStore>> {
        let config = self.engine_config()?;
        let store = JsonFileStore::open(&self.state)
            .with_context(|| format!("failed to open state {}", self.state.display()))?;
        let service = GachaService::new(&config, store, self.streams())?;
        if service.restore_banner()? {
            log::debug!("restored banner from {}", service.store().path().display());
        }
        Ok(service)
    }
}

pub async fn summon(ctx: &Session, amount: u32, hunter: bool) -> Result<Outcome> {
    let service = ctx.service()?;
    let batch = service
        .draw(&ctx.user, DrawRequest::new(amount, hunter))
        .await?;
    Ok(Outcome::Summon {
        user: ctx.user.clone(),
        batch,
    })
}

pub async fn pity(ctx: &Session) -> Result<Outcome> {
    let service = ctx.service()?;
    let status = service.pity_status(&ctx.user).await?;
    Ok(Outcome::PityStatus {
        user: ctx.user.clone(),
        status,
    })
}

pub async fn trait_roll(ctx: &Session, amount: u32) -> Result<Outcome> {
    let service = ctx.service()?;
    let batch = service.roll_traits(&ctx.user, amount).await?;
    Ok(Outcome::Traits {
        user: ctx.user.clone(),
        batch,
    })
}

pub async fn average_trait(ctx: &Session) -> Result<Outcome> {
    let service = ctx.service()?;
    match service.most_rolled_trait(&ctx.user).await {
        Ok((top, count)) => Ok(Outcome::AverageTrait {
            user: ctx.user.clone(),
            top,
            count,
        }),
        Err(GachaError::NotFound { .. }) => Ok(Outcome::NoTraits {
            user: ctx.user.clone(),
        }),
        Err(err) => Err(err.into()),
    }
}

pub async fn clear_traits(ctx: &Session) -> Result<Outcome> {
    let service = ctx.service()?;
    service.reset_trait_totals(&ctx.user).await?;
    Ok(Outcome::TraitsCleared {
        user: ctx.user.clone(),
    })
}

/// Update the banner from explicit names or an OCR text dump.
pub fn banner(ctx: &Session, names: &[String], ocr_text: Option<&Path>) -> Result<Outcome> {
    let service = ctx.service()?;
    let updated = if let Some(path) = ocr_text {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        service.ingest_banner_image(&Utf8Text, &bytes)
    } else {
        service.update_banner(names)
    };
    match updated {
        Ok(banner) => Ok(Outcome::Banner {
            updated: true,
            banner: (*banner).clone(),
        }),
        Err(GachaError::Ingest(failure)) => Ok(Outcome::BannerRejected {
            reason: failure.reason().to_string(),
            message: gacha_engine::report::ingest_failure_line(&failure),
        }),
        Err(err) => Err(err.into()),
    }
}

pub fn show_banner(ctx: &Session) -> Result<Outcome> {
    let service = ctx.service()?;
    Ok(Outcome::Banner {
        updated: false,
        banner: (*service.banner()).clone(),
    })
}

pub async fn simulate(ctx: &Session, users: usize, rolls: u32, draws: u32) -> Result<Outcome> {
    let config = SimulationConfig {
        seed: ctx.seed.unwrap_or(1337),
        users,
        rolls_per_user: rolls,
        draws_per_user: draws,
    };
    let report = run_simulation(config, &ctx.engine_config()?).await?;
    Ok(Outcome::Simulation(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn session(tag: &str) -> Session {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        Session {
            state: std::env::temp_dir()
                .join(format!("gacha-cli-{tag}-{}-{nanos}", std::process::id()))
                .join("state.json"),
            config: None,
            seed: Some(11),
            user: UserId::from("tester"),
        }
    }

    fn cleanup(ctx: &Session) {
        if let Some(dir) = ctx.state.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[tokio::test]
    async fn average_trait_without_rolls_is_informational() {
        let ctx = session("avg");
        let outcome = average_trait(&ctx).await.unwrap();
        assert!(matches!(outcome, Outcome::NoTraits { .. }));
        assert!(outcome.succeeded());

        trait_roll(&ctx, 200).await.unwrap();
        let outcome = average_trait(&ctx).await.unwrap();
        assert!(matches!(outcome, Outcome::AverageTrait { count, .. } if count > 0));

        clear_traits(&ctx).await.unwrap();
        let outcome = average_trait(&ctx).await.unwrap();
        assert!(matches!(outcome, Outcome::NoTraits { .. }));
        cleanup(&ctx);
    }

    #[tokio::test]
    async fn summons_accumulate_across_invocations() {
        let ctx = session("summon");
        summon(&ctx, 30, false).await.unwrap();
        let outcome = pity(&ctx).await.unwrap();
        let Outcome::PityStatus { status, .. } = outcome else {
            panic!("unexpected outcome");
        };
        assert_eq!(status.until_tier_b, 20);
        assert_eq!(status.until_tier_a, 370);
        cleanup(&ctx);
    }

    #[test]
    fn banner_from_ocr_text_persists() {
        let ctx = session("banner");
        let dump = ctx.state.with_file_name("ocr.txt");
        std::fs::create_dir_all(dump.parent().unwrap()).unwrap();
        std::fs::write(&dump, "LIMITED: gujo ... Saber / medusa").unwrap();

        let outcome = banner(&ctx, &[], Some(&dump)).unwrap();
        assert!(outcome.succeeded());
        let Outcome::Banner { banner, .. } = show_banner(&ctx).unwrap() else {
            panic!("unexpected outcome");
        };
        assert_eq!(
            banner.featured().map(|(_, name)| name).collect::<Vec<_>>(),
            ["Saber", "Medusa", "Gujo"]
        );
        cleanup(&ctx);
    }

    #[test]
    fn short_banner_is_rejected_without_error() {
        let ctx = session("reject");
        let outcome = banner(&ctx, &["Saber".to_string()], None).unwrap();
        assert!(matches!(outcome, Outcome::BannerRejected { .. }));
        assert!(!outcome.succeeded());
        cleanup(&ctx);
    }
}
