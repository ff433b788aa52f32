use anyhow::{Result, bail};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Resolve a `--seed` token into a numeric seed.
///
/// Integers are used as-is (negative values by magnitude); any other token is
/// hashed with XxHash64 so phrases like `launch-day` give stable seeds.
pub fn resolve_seed(token: &str) -> Result<u64> {
    let token = token.trim();
    if token.is_empty() {
        bail!("seed must not be empty");
    }
    if let Ok(value) = token.parse::<u64>() {
        return Ok(value);
    }
    if let Ok(value) = token.parse::<i64>() {
        return Ok(value.unsigned_abs());
    }
    Ok(text_seed(token))
}

#[must_use]
pub fn text_seed(text: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(text.as_bytes());
    hasher.finish()
}

/// Per-user seeds for a soak run, reproducible from the run seed.
#[must_use]
pub fn user_seeds(run_seed: u64, users: usize) -> Vec<u64> {
    let mut rng = ChaCha8Rng::seed_from_u64(run_seed);
    (0..users).map(|_| rng.next_u64()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_numeric_and_text_tokens() {
        assert_eq!(resolve_seed("42").unwrap(), 42);
        assert_eq!(resolve_seed("-7").unwrap(), 7);
        let phrase = resolve_seed("launch-day").unwrap();
        assert_eq!(phrase, text_seed("launch-day"));
        assert_ne!(phrase, text_seed("launch-night"));
        assert!(resolve_seed("   ").is_err());
    }

    #[test]
    fn user_seeds_are_stable_and_distinct() {
        let first = user_seeds(1337, 8);
        assert_eq!(first, user_seeds(1337, 8));
        assert_ne!(first, user_seeds(1338, 8));
        let mut unique = first.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 8);
    }
}
