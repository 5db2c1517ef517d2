//! Versioned per-namespace store.
//!
//! One logical namespace (a user, or the shared guest space) maps to one
//! [`StorageData`] blob, persisted under a `{ version, data }` envelope in
//! a SQLite key-value table. Loads transparently migrate two legacy
//! shapes: a flat JSON file per key from pre-SQLite builds, and an
//! unversioned blob already in the table. Stored data is never trusted,
//! not even data this same code wrote earlier: every load runs through the
//! sanitizing pipeline before a caller sees it.
//!
//! There is no cross-process locking. Two processes mutating the same
//! namespace race with last-write-wins semantics; this is an accepted
//! limitation of the single-user design, not something the store papers
//! over.

pub(crate) mod kv;

use crate::model::{Author, Book, Settings, StorageData};
use crate::validate::sanitize::sanitize_data;
use kv::KvStore;
use log::{error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Key of the shared guest namespace; per-user keys are derived from it.
pub const DEFAULT_STORAGE_KEY: &str = "shelfmark-data";

/// Current schema version written into every envelope.
pub const STORAGE_VERSION: u32 = 1;

/// Derives the storage key for a user id, or the guest key for `None`.
/// The key is threaded explicitly through every store call; there is no
/// ambient "current user" inside the persistence layer.
#[must_use]
#[inline]
pub fn namespace_key(user_id: Option<&str>) -> String {
    user_id.map_or_else(
        || String::from(DEFAULT_STORAGE_KEY),
        |id| format!("{DEFAULT_STORAGE_KEY}-{id}"),
    )
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying medium is out of space. Actionable: remove large
    /// images or delete books.
    #[error("storage limit reached, use smaller images or delete books")]
    QuotaExceeded,

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A partial update to a namespace's data: only the populated fields are
/// replaced, everything else keeps its stored value. The Rust face of the
/// original wire format's partial-save semantics.
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct StoragePatch {
    pub books: Option<Vec<Book>>,
    pub authors: Option<Vec<Author>>,
    pub languages: Option<Vec<String>>,
    pub publishers: Option<Vec<String>>,
    pub settings: Option<Settings>,
}

impl StoragePatch {
    #[must_use]
    #[inline]
    pub fn books(books: Vec<Book>) -> Self {
        Self {
            books: Some(books),
            ..Self::default()
        }
    }

    #[must_use]
    #[inline]
    pub fn authors(authors: Vec<Author>) -> Self {
        Self {
            authors: Some(authors),
            ..Self::default()
        }
    }

    #[must_use]
    #[inline]
    pub fn languages(languages: Vec<String>) -> Self {
        Self {
            languages: Some(languages),
            ..Self::default()
        }
    }

    #[must_use]
    #[inline]
    pub fn publishers(publishers: Vec<String>) -> Self {
        Self {
            publishers: Some(publishers),
            ..Self::default()
        }
    }

    #[must_use]
    #[inline]
    pub fn settings(settings: Settings) -> Self {
        Self {
            settings: Some(settings),
            ..Self::default()
        }
    }

    fn apply(self, mut base: StorageData) -> StorageData {
        if let Some(books) = self.books {
            base.books = books;
        }
        if let Some(authors) = self.authors {
            base.authors = authors;
        }
        if let Some(languages) = self.languages {
            base.languages = languages;
        }
        if let Some(publishers) = self.publishers {
            base.publishers = publishers;
        }
        if let Some(settings) = self.settings {
            base.settings = settings;
        }
        base
    }
}

#[derive(Serialize)]
struct Envelope<'data> {
    version: u32,
    data: &'data StorageData,
}

pub struct Store {
    kv: KvStore,
    legacy_dir: Option<PathBuf>,
}

impl Store {
    /// Opens the store at `db_path`, creating the database if needed.
    /// `legacy_dir` points at the directory where pre-SQLite builds kept
    /// one flat JSON file per key; pass `None` when no such history exists.
    ///
    /// # Errors
    /// Fails if the database cannot be opened or migrated.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub async fn open(db_path: &Path, legacy_dir: Option<PathBuf>) -> Result<Self, StoreError> {
        let kv = KvStore::open(db_path).await?;
        info!("Opened shelf store at {}", db_path.display());

        Ok(Self { kv, legacy_dir })
    }

    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at end of program"
    )]
    pub async fn close(&self) {
        self.kv.close().await;
    }

    pub(crate) fn kv_handle(&self) -> KvStore {
        self.kv.clone()
    }

    /// Loads and sanitizes the data under `key`.
    ///
    /// Infallible by design: any structural failure (unreadable medium,
    /// unparsable blob) logs and yields the default empty dataset rather
    /// than propagating. Being lenient about reading back possibly-drifted
    /// history is the point; strictness belongs on the write path.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Large function, called on session start"
    )]
    pub async fn load(&self, key: &str) -> StorageData {
        match self.try_load(key).await {
            Ok(data) => data,
            Err(load_error) => {
                error!("Failed to load data from storage: {load_error}");
                StorageData::default()
            }
        }
    }

    async fn try_load(&self, key: &str) -> Result<StorageData, StoreError> {
        let Some(stored) = self.kv.get(key).await? else {
            if let Some(migrated) = self.migrate_legacy_file(key).await? {
                return Ok(migrated);
            }
            return Ok(StorageData::default());
        };

        let value: Value = serde_json::from_str(&stored)?;
        let data = decode_envelope(value);

        Ok(sanitize_data(data).await)
    }

    /// One-time migration path for the flat-file format: only consulted
    /// when the table has no row for `key`. A parse failure logs and falls
    /// back to the empty default; the legacy file is left untouched.
    async fn migrate_legacy_file(&self, key: &str) -> Result<Option<StorageData>, StoreError> {
        let Some(dir) = &self.legacy_dir else {
            return Ok(None);
        };
        let path = dir.join(format!("{key}.json"));
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(_) => return Ok(None),
        };

        info!("Migrating legacy flat-file data for key \"{key}\" (legacy -> v{STORAGE_VERSION})");
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(parse_error) => {
                error!("Failed to migrate legacy data for key \"{key}\": {parse_error}");
                return Ok(None);
            }
        };

        if value.get("books").is_none() && value.get("authors").is_none() {
            return Ok(None);
        }

        let sanitized = sanitize_data(StorageData::from_value(value)).await;
        self.write_envelope(key, &sanitized).await?;

        Ok(Some(sanitized))
    }

    /// Applies a partial patch over the stored blob, sanitizes the merged
    /// result and writes it back. Read-modify-write with no locking; the
    /// caller's await discipline serializes dependent saves.
    ///
    /// Write failures are logged, with quota exhaustion called out
    /// separately, and not propagated: a failed background save must not
    /// crash the session that triggered it.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Large function, called on every mutation"
    )]
    pub async fn save(&self, patch: StoragePatch, key: &str) {
        if let Err(save_error) = self.try_save(patch, key).await {
            match save_error {
                StoreError::QuotaExceeded => {
                    warn!("Storage limit reached! Use smaller images or delete books.");
                }
                _ => error!("Failed to save data to storage: {save_error}"),
            }
        }
    }

    async fn try_save(&self, patch: StoragePatch, key: &str) -> Result<(), StoreError> {
        let current = match self.kv.get(key).await? {
            Some(stored) => decode_envelope(serde_json::from_str(&stored)?),
            None => StorageData::default(),
        };

        let merged = patch.apply(current);
        let sanitized = sanitize_data(merged).await;

        self.write_envelope(key, &sanitized).await
    }

    /// Sanitizes and unconditionally overwrites the whole blob under
    /// `key`. No merge with existing data: this is the import-backup
    /// semantic, distinct from [`Store::save`]'s patch semantic, and its
    /// failures propagate because the import flow must see them.
    ///
    /// # Errors
    /// Fails if serialization or the write itself fails.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn replace(&self, data: StorageData, key: &str) -> Result<StorageData, StoreError> {
        let sanitized = sanitize_data(data).await;
        self.write_envelope(key, &sanitized)
            .await
            .inspect_err(|replace_error| {
                error!("Failed to replace data in storage: {replace_error}");
            })?;

        Ok(sanitized)
    }

    async fn write_envelope(&self, key: &str, data: &StorageData) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&Envelope {
            version: STORAGE_VERSION,
            data,
        })?;

        self.kv.set(key, &payload).await
    }
}

/// Unwraps a stored blob into plain `StorageData`, tolerating all known
/// shapes: the current envelope, a newer envelope (best-effort, with a
/// warning), and the bare v0 blob from before versioning existed.
fn decode_envelope(mut value: Value) -> StorageData {
    let version = value.get("version").and_then(Value::as_u64);
    let data = value.get_mut("data").map(Value::take);

    match (version, data) {
        (Some(version), Some(data)) => {
            if version > u64::from(STORAGE_VERSION) {
                warn!(
                    "Data version mismatch! Storage has version {version}, app supports \
                     {STORAGE_VERSION}. Loading best-effort, but saving may lose fields."
                );
            }
            StorageData::from_value(data)
        }
        _ => {
            info!("Found unversioned stored data, treating as v0");
            StorageData::from_value(value)
        }
    }
}
