//! Error taxonomy surfaced to callers of the engines and the service.
use std::path::PathBuf;
use thiserror::Error;

use crate::rarity::RarityTier;
use crate::store::UserId;

/// Errors raised by draw, trait and banner operations.
#[derive(Debug, Error)]
pub enum GachaError {
    /// Request rejected before any state was read.
    #[error("{field} must be between {min} and {max} (got {value})")]
    Validation {
        field: &'static str,
        min: u32,
        max: u32,
        value: u32,
    },
    #[error("banner ingestion failed: {0}")]
    Ingest(#[from] IngestFailure),
    /// Informational: the user has no trait history yet.
    #[error("no trait rolls recorded for user {user}")]
    NotFound { user: UserId },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("rarity tier {0} has no eligible items")]
    EmptyPool(RarityTier),
    #[error("sampling worker failed: {0}")]
    Worker(String),
}

impl GachaError {
    /// Build a validation error for an amount outside `min..=max`.
    #[must_use]
    pub const fn amount_out_of_range(min: u32, max: u32, value: u32) -> Self {
        Self::Validation {
            field: "amount",
            min,
            max,
            value,
        }
    }
}

/// Reasons a banner update is rejected as a whole.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestFailure {
    #[error("unmatched name: {name:?} is not a mythic unit")]
    UnmatchedName { name: String },
    #[error("fewer than 3 names (matched {found})")]
    FewerThanThree { found: usize },
    #[error("too many names ({count}); a banner holds 3 units")]
    TooManyNames { count: usize },
    #[error("text extraction failed: {message}")]
    Extraction { message: String },
}

impl IngestFailure {
    /// Short machine-friendly reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::UnmatchedName { .. } => "unmatched name",
            Self::FewerThanThree { .. } => "fewer than 3 names",
            Self::TooManyNames { .. } => "too many names",
            Self::Extraction { .. } => "extraction failed",
        }
    }
}

/// Failures from the backing user store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state document is malformed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store lock poisoned: {0}")]
    Poisoned(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
