//! Backup import and export.
//!
//! Exports are the full current aggregate as pretty-printed JSON, named
//! with the current date. Imports are gated: before anything destructive
//! happens the document must at least be an object with a `books` array;
//! only then is it decoded and handed to [`Store::replace`], whose
//! sanitizing full-overwrite semantics do the rest.

use crate::library::Library;
use crate::model::StorageData;
use crate::store::StoreError;
use chrono::{Local, NaiveDate};
use log::info;
use serde_json::Value;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The minimal acceptance gate failed; nothing was touched.
    #[error("invalid backup file format, missing \"books\" array")]
    MissingBooks,

    #[error("invalid backup file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Serializes a snapshot for download.
///
/// # Errors
/// Fails only if serialization itself fails.
#[inline]
pub fn export_json(data: &StorageData) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(data)
}

/// `shelfmark-backup-YYYY-MM-DD.json` for the given day.
#[must_use]
#[inline]
pub fn export_file_name(today: NaiveDate) -> String {
    format!("shelfmark-backup-{}.json", today.format("%Y-%m-%d"))
}

/// Export file name for today's local date.
#[must_use]
#[inline]
pub fn export_file_name_today() -> String {
    export_file_name(Local::now().date_naive())
}

/// Replaces the library's namespace with the contents of a backup file
/// and adopts whatever survives sanitization into the in-memory state.
///
/// # Errors
/// [`ImportError::MissingBooks`] when the gate fails, [`ImportError::Parse`]
/// for malformed JSON; both happen before any write. Store failures during
/// the replace propagate as [`ImportError::Store`].
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Called rarely"
)]
pub async fn import_backup(library: &mut Library, raw: &str) -> Result<(), ImportError> {
    let value: Value = serde_json::from_str(raw)?;

    if !value.get("books").is_some_and(Value::is_array) {
        return Err(ImportError::MissingBooks);
    }

    let data = StorageData::from_value(value);
    let key = library.key().to_owned();
    let adopted = library.store().replace(data, &key).await?;
    info!("Imported backup into namespace \"{key}\"");
    library.adopt(adopted);

    Ok(())
}
