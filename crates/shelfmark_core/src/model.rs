//! Data model
//!
//! The entity types that make up one user's library, plus the persisted
//! aggregate that wraps them. The wire format is camelCase JSON, identical
//! for storage rows, legacy files and backup exports, so a backup taken
//! from any version of the app deserializes here.

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a book currently sits in the reading lifecycle.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadingStatus {
    #[serde(rename = "To Read")]
    ToRead,
    Reading,
    Completed,
    Dropped,
    /// Catch-all for values read from untrusted data that match none of the
    /// four real statuses. Never survives sanitization, so it is never
    /// written back out.
    #[default]
    Unknown,
}

impl<'de> Deserialize<'de> for ReadingStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "To Read" => Self::ToRead,
            "Reading" => Self::Reading,
            "Completed" => Self::Completed,
            "Dropped" => Self::Dropped,
            _ => Self::Unknown,
        })
    }
}

/// A single book in the library.
///
/// `author` holds the author's display name, not an id. The denormalization
/// is deliberate and inherited from the storage format: renames cascade and
/// orphans are detected procedurally in [`crate::library::Library`].
#[non_exhaustive]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    /// Display name of the author, matched against the author registry.
    pub author: String,
    pub language: String,
    pub pages: i64,
    pub publisher: String,
    /// ISO date, `YYYY-MM-DD`. Empty when unknown.
    pub purchase_date: String,
    /// ISO date, or a bare 4-digit year when `publish_year_only` is set.
    pub publish_date: String,
    pub publish_year_only: bool,
    /// Embedded cover, base64 data URL.
    pub cover_image: Option<String>,
    pub price: f64,
    pub status: ReadingStatus,
    pub start_date: Option<String>,
    pub completion_date: Option<String>,
    pub notes: Option<String>,
    pub current_page: Option<i64>,
    /// 1 to 5, meaningful for Completed and Dropped books.
    pub rating: Option<i64>,
    /// Gifted books may have a price of zero.
    pub is_gifted: bool,
}

/// An author in the registry. Books reference authors by `name`.
#[non_exhaustive]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Author {
    pub id: String,
    pub name: String,
    /// Embedded photo, base64 data URL.
    pub photo: Option<String>,
}

impl Author {
    #[must_use]
    #[inline]
    pub const fn new(id: String, name: String, photo: Option<String>) -> Self {
        Self { id, name, photo }
    }
}

/// User-tunable settings stored alongside the library.
#[non_exhaustive]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub currency: String,
}

impl Default for Settings {
    #[inline]
    fn default() -> Self {
        Self {
            currency: String::from("$"),
        }
    }
}

/// The full persisted aggregate for one namespace key. This is the unit of
/// persistence: every mutation re-sanitizes and rewrites the whole blob.
#[non_exhaustive]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct StorageData {
    pub books: Vec<Book>,
    pub authors: Vec<Author>,
    pub languages: Vec<String>,
    pub publishers: Vec<String>,
    pub settings: Settings,
}

impl StorageData {
    /// Decodes untrusted JSON into a `StorageData`, salvaging what it can.
    ///
    /// Entries that fail to deserialize are skipped with a warning instead
    /// of failing the whole blob; a malformed book must not take the rest
    /// of the library down with it. Anything that is not an object decodes
    /// to the default empty dataset.
    #[must_use]
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Large function, called on load paths only"
    )]
    pub fn from_value(value: Value) -> Self {
        let mut data = Self::default();
        let Value::Object(mut map) = value else {
            return data;
        };

        data.books = decode_entries(map.remove("books"), "book");
        data.authors = decode_entries(map.remove("authors"), "author");
        data.languages = decode_entries(map.remove("languages"), "language");
        data.publishers = decode_entries(map.remove("publishers"), "publisher");
        if let Some(settings) = map.remove("settings") {
            match serde_json::from_value(settings) {
                Ok(settings) => data.settings = settings,
                Err(error) => warn!("Ignoring malformed settings object: {error}"),
            }
        }

        data
    }
}

fn decode_entries<T: DeserializeOwned>(value: Option<Value>, kind: &str) -> Vec<T> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                warn!("Skipping malformed {kind} entry: {error}");
                None
            }
        })
        .collect()
}

/// A registered user of the app. Passwords are stored in plain text, a
/// known limitation of the original storage format that is kept as-is;
/// there is no real authentication security here.
#[non_exhaustive]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}
