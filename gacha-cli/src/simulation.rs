use anyhow::{Context, Result};
use gacha_engine::constants::{MAX_DRAWS_PER_BATCH, MAX_TRAIT_ROLLS_PER_BATCH};
use gacha_engine::numbers::{ratio, round_f64_to_u64, u64_to_f64};
use gacha_engine::{
    DrawRequest, EngineConfig, GachaService, MemoryUserStore, PityTrigger, RngStreams, Trait,
    TraitCounts, UserId, UserStore,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::seeds::user_seeds;

/// Parameters of a concurrent soak run.
#[derive(Debug, Clone, Copy)]
pub struct SimulationConfig {
    pub seed: u64,
    pub users: usize,
    pub rolls_per_user: u32,
    pub draws_per_user: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraitFrequency {
    #[serde(rename = "trait")]
    pub name: Trait,
    pub count: u64,
    pub expected_count: u64,
    pub observed: f64,
    pub expected: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub users: usize,
    pub rolls_per_user: u32,
    pub draws_per_user: u32,
    pub trait_batches: usize,
    pub monarch_awards: u64,
    pub tier_a_pities: u64,
    pub tier_b_pities: u64,
    pub frequencies: Vec<TraitFrequency>,
    pub mismatches: Vec<String>,
    pub elapsed_ms: u128,
}

impl SimulationReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

#[derive(Debug)]
struct UserOutcome {
    user: UserId,
    expected: TraitCounts,
    batches: usize,
    awards: u64,
    tier_a: u64,
    tier_b: u64,
    drawn: usize,
}

/// Split `total` into random batch sizes no larger than `max_batch`.
#[must_use]
pub fn batch_plan(seed: u64, total: u32, max_batch: u32) -> Vec<u32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut remaining = total;
    let mut plan = Vec::new();
    while remaining > 0 {
        let amount = rng.gen_range(1..=remaining.min(max_batch.max(1)));
        plan.push(amount);
        remaining -= amount;
    }
    plan
}

async fn run_user(
    service: Arc<GachaService<MemoryUserStore>>,
    user: UserId,
    seed: u64,
    config: SimulationConfig,
) -> Result<UserOutcome> {
    let mut outcome = UserOutcome {
        user: user.clone(),
        expected: TraitCounts::default(),
        batches: 0,
        awards: 0,
        tier_a: 0,
        tier_b: 0,
        drawn: 0,
    };

    for amount in batch_plan(seed, config.rolls_per_user, MAX_TRAIT_ROLLS_PER_BATCH) {
        let result = service
            .roll_traits(&user, amount)
            .await
            .with_context(|| format!("trait batch for user {user}"))?;
        outcome.batches += 1;
        if result.pity_awarded {
            outcome.awards += 1;
        }
        outcome.expected.merge(&result.counts);
    }

    let mut remaining = config.draws_per_user;
    while remaining > 0 {
        let amount = remaining.min(MAX_DRAWS_PER_BATCH);
        let batch = service
            .draw(&user, DrawRequest::new(amount, false))
            .await
            .with_context(|| format!("summon batch for user {user}"))?;
        outcome.drawn += batch.results.len();
        for result in &batch.results {
            match result.pity {
                PityTrigger::TierA => outcome.tier_a += 1,
                PityTrigger::TierB => outcome.tier_b += 1,
                PityTrigger::None => {}
            }
        }
        remaining -= amount;
    }
    Ok(outcome)
}

/// Run every user concurrently against one in-memory service, then check that
/// each user's stored totals equal the sum of the batches they received.
pub async fn run_simulation(
    config: SimulationConfig,
    engine_config: &EngineConfig,
) -> Result<SimulationReport> {
    let started = Instant::now();
    let service = Arc::new(
        GachaService::new(
            engine_config,
            MemoryUserStore::new(),
            RngStreams::seeded(config.seed),
        )
        .context("building service")?,
    );

    let mut handles = Vec::with_capacity(config.users);
    for (idx, seed) in user_seeds(config.seed, config.users).into_iter().enumerate() {
        let user = UserId::new(format!("sim-{idx:03}"));
        handles.push(tokio::spawn(run_user(
            Arc::clone(&service),
            user,
            seed,
            config,
        )));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(handle.await.context("simulation task panicked")??);
    }

    let mut mismatches = Vec::new();
    let mut sampled = TraitCounts::default();
    let mut awards = 0;
    for outcome in &outcomes {
        let stored = service
            .store()
            .load_traits(&outcome.user)?
            .map(|state| state.lifetime_totals)
            .unwrap_or_default();
        if stored != outcome.expected {
            mismatches.push(format!(
                "user {}: stored {} rolls, batches returned {}",
                outcome.user,
                stored.total(),
                outcome.expected.total()
            ));
        }
        if outcome.drawn != config.draws_per_user as usize {
            mismatches.push(format!(
                "user {}: drew {} of {} summons",
                outcome.user, outcome.drawn, config.draws_per_user
            ));
        }
        sampled.merge(&outcome.expected);
        awards += outcome.awards;
    }

    // Pity awards are not samples; leave them out of the frequency check.
    let mut pure = TraitCounts::default();
    for (t, count) in sampled.iter() {
        let count = if t == Trait::Monarch {
            count.saturating_sub(awards)
        } else {
            count
        };
        pure.add(t, count);
    }
    let total = pure.total();
    let frequencies = engine_config
        .traits
        .probabilities()?
        .into_iter()
        .map(|(name, expected)| TraitFrequency {
            name,
            count: pure.get(name),
            expected_count: round_f64_to_u64(expected * u64_to_f64(total)),
            observed: ratio(pure.get(name), total),
            expected,
        })
        .collect();

    log::info!(
        "simulation finished: {} users, {total} rolls sampled",
        config.users
    );

    Ok(SimulationReport {
        seed: config.seed,
        users: config.users,
        rolls_per_user: config.rolls_per_user,
        draws_per_user: config.draws_per_user,
        trait_batches: outcomes.iter().map(|o| o.batches).sum(),
        monarch_awards: awards,
        tier_a_pities: outcomes.iter().map(|o| o.tier_a).sum(),
        tier_b_pities: outcomes.iter().map(|o| o.tier_b).sum(),
        frequencies,
        mismatches,
        elapsed_ms: started.elapsed().as_millis(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_plan_covers_total_within_bounds() {
        let plan = batch_plan(9, 10_000, 1_000);
        assert_eq!(plan.iter().sum::<u32>(), 10_000);
        assert!(plan.iter().all(|amount| (1..=1_000).contains(amount)));
        assert_eq!(plan, batch_plan(9, 10_000, 1_000));
        assert!(batch_plan(9, 0, 1_000).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn soak_run_has_no_mismatches() {
        let config = SimulationConfig {
            seed: 5,
            users: 8,
            rolls_per_user: 3_000,
            draws_per_user: 120,
        };
        let report = run_simulation(config, &EngineConfig::default())
            .await
            .unwrap();
        assert!(report.passed(), "{:?}", report.mismatches);
        assert!(report.monarch_awards >= 8);
        // 120 draws from zero force a Legendary at draws 50 and 100.
        assert_eq!(report.tier_b_pities, 16);
        let range = report
            .frequencies
            .iter()
            .find(|f| f.name == Trait::Range)
            .unwrap();
        assert!((range.observed - range.expected).abs() < 0.02);
    }
}
