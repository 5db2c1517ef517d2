//! Pure validation predicates over books and authors.
//!
//! No I/O beyond diagnostic logging. Failures are reported through the
//! return value only; callers decide whether a failed check drops the
//! entity (load path) or blocks the operation (write path).

use crate::model::{Author, Book, ReadingStatus};
use chrono::{DateTime, Local, NaiveDate};
use log::warn;

/// Parses a stored date string into a calendar day.
///
/// Accepts `YYYY-MM-DD`, a full RFC 3339 timestamp, or a bare 4-digit year
/// (treated as January 1st of that year, which is how year-only publish
/// dates are stored).
#[must_use]
#[inline]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(datetime.date_naive());
    }
    if trimmed.len() == 4 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return NaiveDate::from_ymd_opt(trimmed.parse().ok()?, 1, 1);
    }

    None
}

/// A date string is valid when empty (optional dates) or parsable.
#[must_use]
#[inline]
pub fn is_valid_date(raw: &str) -> bool {
    raw.is_empty() || parse_date(raw).is_some()
}

/// Whether the date falls strictly after the given day.
#[must_use]
#[inline]
pub fn is_future_date_on(raw: &str, today: NaiveDate) -> bool {
    parse_date(raw).is_some_and(|date| date > today)
}

/// Whether the date falls strictly after today's local wall-clock date.
#[must_use]
#[inline]
pub fn is_future_date(raw: &str) -> bool {
    is_future_date_on(raw, Local::now().date_naive())
}

/// An author is valid when its name is non-empty after trimming.
#[must_use]
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Called rarely per entity"
)]
pub fn validate_author(author: &Author) -> bool {
    if author.name.trim().is_empty() {
        warn!("Validation failed: author {} has an empty name", author.id);
        return false;
    }

    true
}

/// Validates a book against the field rules and the current author names.
///
/// Checks short-circuit in a fixed order; the first failure wins and is
/// logged. The author-existence check is skipped when `available_authors`
/// is empty: on a first load there are no authors yet, and refusing every
/// book at that point would wedge bootstrapping. A book with a nonexistent
/// author can therefore survive an empty registry; `check_orphans` exists
/// to surface exactly that drift later.
#[must_use]
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Large function, called rarely per entity"
)]
pub fn validate_book(book: &Book, available_authors: &[String]) -> bool {
    if book.id.is_empty() {
        warn!("Validation failed: book missing id");
        return false;
    }
    if book.title.trim().is_empty() {
        warn!("Validation failed: book {} has an empty title", book.id);
        return false;
    }
    if book.author.trim().is_empty() {
        warn!(
            "Validation failed: book {} (\"{}\") has an empty author",
            book.id, book.title
        );
        return false;
    }
    if book.language.trim().is_empty() {
        warn!(
            "Validation failed: book \"{}\" has an empty language",
            book.title
        );
        return false;
    }
    if book.publisher.trim().is_empty() {
        warn!(
            "Validation failed: book \"{}\" has an empty publisher",
            book.title
        );
        return false;
    }

    if !available_authors.is_empty() && !available_authors.contains(&book.author) {
        warn!(
            "Validation failed: book \"{}\" references unknown author \"{}\"",
            book.title, book.author
        );
        return false;
    }

    if book.pages <= 0 {
        warn!(
            "Validation failed: book \"{}\" has invalid pages: {}",
            book.title, book.pages
        );
        return false;
    }

    // Price must be positive unless the book was gifted; gifted books may
    // be free but never negative.
    if !book.is_gifted && book.price <= 0.0 {
        warn!(
            "Validation failed: book \"{}\" has invalid price: {}",
            book.title, book.price
        );
        return false;
    }
    if book.is_gifted && book.price < 0.0 {
        warn!(
            "Validation failed: book \"{}\" has negative price: {}",
            book.title, book.price
        );
        return false;
    }

    if !book.purchase_date.is_empty() && !is_valid_date(&book.purchase_date) {
        warn!(
            "Validation failed: book \"{}\" has invalid purchase date",
            book.title
        );
        return false;
    }
    if !book.publish_date.is_empty() {
        if !is_valid_date(&book.publish_date) {
            warn!(
                "Validation failed: book \"{}\" has invalid publish date",
                book.title
            );
            return false;
        }
        // Applies to year-only dates too: "2999" resolves to Jan 1 2999.
        if is_future_date(&book.publish_date) {
            warn!(
                "Validation failed: book \"{}\" has a publish date in the future",
                book.title
            );
            return false;
        }
    }

    if book.status == ReadingStatus::Unknown {
        warn!(
            "Validation failed: book \"{}\" has an invalid status",
            book.title
        );
        return false;
    }

    true
}
