//! Per-user persisted state for the summon and trait engines.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::banner::BannerState;
use crate::constants::LOG_TARGET_STORE;
use crate::error::StorageError;
use crate::pity::PityState;
use crate::traits::TraitPityState;

/// Opaque user identity supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backing store for per-user state.
///
/// Callers serialize access per user; implementations only need each call to
/// be atomic on its own.
pub trait UserStore: Send + Sync {
    /// Load a user's pity record, creating a zeroed one on first contact.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    fn get_or_create_pity(&self, user: &UserId) -> Result<PityState, StorageError>;

    /// Replace a user's pity record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written; the previous
    /// record stays in place.
    fn put_pity(&self, user: &UserId, state: &PityState) -> Result<(), StorageError>;

    /// Load a user's trait record, creating a zeroed one on first contact.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    fn get_or_create_traits(&self, user: &UserId) -> Result<TraitPityState, StorageError>;

    /// Load a user's trait record without creating it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    fn load_traits(&self, user: &UserId) -> Result<Option<TraitPityState>, StorageError>;

    /// Replace a user's trait record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written; the previous
    /// record stays in place.
    fn put_traits(&self, user: &UserId, state: &TraitPityState) -> Result<(), StorageError>;

    /// Last persisted banner, if the store keeps one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    fn load_banner(&self) -> Result<Option<BannerState>, StorageError> {
        Ok(None)
    }

    /// Persist the banner. Stores without banner support ignore the call.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the banner cannot be written.
    fn save_banner(&self, _banner: &BannerState) -> Result<(), StorageError> {
        Ok(())
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    pity: RwLock<HashMap<UserId, PityState>>,
    traits: RwLock<HashMap<UserId, TraitPityState>>,
    banner: RwLock<Option<BannerState>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with any record.
    #[must_use]
    pub fn user_count(&self) -> usize {
        let mut users: HashSet<UserId> = self
            .pity
            .read()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        if let Ok(map) = self.traits.read() {
            users.extend(map.keys().cloned());
        }
        users.len()
    }
}

impl UserStore for MemoryUserStore {
    fn get_or_create_pity(&self, user: &UserId) -> Result<PityState, StorageError> {
        let mut map = self
            .pity
            .write()
            .map_err(|_| StorageError::Poisoned("pity"))?;
        Ok(*map.entry(user.clone()).or_default())
    }

    fn put_pity(&self, user: &UserId, state: &PityState) -> Result<(), StorageError> {
        self.pity
            .write()
            .map_err(|_| StorageError::Poisoned("pity"))?
            .insert(user.clone(), *state);
        Ok(())
    }

    fn get_or_create_traits(&self, user: &UserId) -> Result<TraitPityState, StorageError> {
        let mut map = self
            .traits
            .write()
            .map_err(|_| StorageError::Poisoned("traits"))?;
        Ok(map.entry(user.clone()).or_default().clone())
    }

    fn load_traits(&self, user: &UserId) -> Result<Option<TraitPityState>, StorageError> {
        let map = self
            .traits
            .read()
            .map_err(|_| StorageError::Poisoned("traits"))?;
        Ok(map.get(user).cloned())
    }

    fn put_traits(&self, user: &UserId, state: &TraitPityState) -> Result<(), StorageError> {
        self.traits
            .write()
            .map_err(|_| StorageError::Poisoned("traits"))?
            .insert(user.clone(), state.clone());
        Ok(())
    }

    fn load_banner(&self) -> Result<Option<BannerState>, StorageError> {
        let banner = self
            .banner
            .read()
            .map_err(|_| StorageError::Poisoned("banner"))?;
        Ok(banner.clone())
    }

    fn save_banner(&self, banner: &BannerState) -> Result<(), StorageError> {
        *self
            .banner
            .write()
            .map_err(|_| StorageError::Poisoned("banner"))? = Some(banner.clone());
        Ok(())
    }
}

/// On-disk layout of [`JsonFileStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    #[serde(default)]
    pub pity: BTreeMap<UserId, PityState>,
    #[serde(default)]
    pub traits: BTreeMap<UserId, TraitPityState>,
    #[serde(default)]
    pub banner: Option<BannerState>,
    #[serde(default)]
    pub last_saved: Option<DateTime<Utc>>,
}

/// Store backed by one JSON file.
///
/// Every write serializes a modified copy of the document to `<path>.tmp`,
/// copies the current file to `<path>.bak`, then renames the temp file over
/// the main file. The in-memory document only changes after the rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: Mutex<StoreDocument>,
}

impl JsonFileStore {
    /// Open `path`, falling back to its backup if the main file is missing.
    /// A fresh document is used when neither exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if an existing file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let document = load_document(&path)?;
        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Poisoned` if a writer panicked.
    pub fn snapshot(&self) -> Result<StoreDocument, StorageError> {
        self.document
            .lock()
            .map(|doc| doc.clone())
            .map_err(|_| StorageError::Poisoned("document"))
    }

    fn read<T>(&self, f: impl FnOnce(&StoreDocument) -> T) -> Result<T, StorageError> {
        let doc = self
            .document
            .lock()
            .map_err(|_| StorageError::Poisoned("document"))?;
        Ok(f(&doc))
    }

    fn update(&self, f: impl FnOnce(&mut StoreDocument)) -> Result<(), StorageError> {
        let mut doc = self
            .document
            .lock()
            .map_err(|_| StorageError::Poisoned("document"))?;
        let mut next = doc.clone();
        f(&mut next);
        next.last_saved = Some(Utc::now());
        if let Err(err) = atomic_write(&self.path, &next) {
            log::warn!(target: LOG_TARGET_STORE, "save to {} failed: {err}", self.path.display());
            return Err(err);
        }
        *doc = next;
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn load_document(path: &Path) -> Result<StoreDocument, StorageError> {
    let backup = sibling(path, ".bak");
    let source = if path.exists() {
        path
    } else if backup.exists() {
        log::warn!(
            target: LOG_TARGET_STORE,
            "{} missing, restoring from backup",
            path.display()
        );
        backup.as_path()
    } else {
        return Ok(StoreDocument::default());
    };
    let raw = fs::read_to_string(source).map_err(|err| io_error(source, err))?;
    if raw.trim().is_empty() {
        return Ok(StoreDocument::default());
    }
    Ok(serde_json::from_str(&raw)?)
}

fn atomic_write(path: &Path, document: &StoreDocument) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
    }
    let json = serde_json::to_string_pretty(document)?;
    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, json).map_err(|err| io_error(&tmp, err))?;
    if path.exists() {
        let backup = sibling(path, ".bak");
        if let Err(err) = fs::copy(path, &backup) {
            log::warn!(target: LOG_TARGET_STORE, "backup to {} failed: {err}", backup.display());
        }
    }
    fs::rename(&tmp, path).map_err(|err| io_error(path, err))
}

impl UserStore for JsonFileStore {
    fn get_or_create_pity(&self, user: &UserId) -> Result<PityState, StorageError> {
        self.read(|doc| doc.pity.get(user).copied().unwrap_or_default())
    }

    fn put_pity(&self, user: &UserId, state: &PityState) -> Result<(), StorageError> {
        self.update(|doc| {
            doc.pity.insert(user.clone(), *state);
        })
    }

    fn get_or_create_traits(&self, user: &UserId) -> Result<TraitPityState, StorageError> {
        self.read(|doc| doc.traits.get(user).cloned().unwrap_or_default())
    }

    fn load_traits(&self, user: &UserId) -> Result<Option<TraitPityState>, StorageError> {
        self.read(|doc| doc.traits.get(user).cloned())
    }

    fn put_traits(&self, user: &UserId, state: &TraitPityState) -> Result<(), StorageError> {
        self.update(|doc| {
            doc.traits.insert(user.clone(), state.clone());
        })
    }

    fn load_banner(&self) -> Result<Option<BannerState>, StorageError> {
        self.read(|doc| doc.banner.clone())
    }

    fn save_banner(&self, banner: &BannerState) -> Result<(), StorageError> {
        self.update(|doc| doc.banner = Some(banner.clone()))
    }
}
