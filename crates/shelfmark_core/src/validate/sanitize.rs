//! The sanitizing pipeline.
//!
//! Takes an arbitrary [`StorageData`]-shaped blob (a storage load, a legacy
//! migration, or a user-supplied import) and returns one where every entity
//! satisfies the validation kernel and the image guard. Per-entity problems
//! drop the entity or clear its image with a warning; they never fail the
//! call. Structural problems (unparsable top-level blob) are the caller's
//! concern and happen before this function runs.
//!
//! Authors are sanitized before books on purpose: book validity depends on
//! the surviving author-name set, so a book whose sole author was just
//! dropped is itself dropped.

use crate::model::{Author, Book, StorageData};
use crate::validate::image::{
    MAX_AUTHOR_IMAGE_SIZE_BYTES, MAX_IMAGE_SIZE_BYTES, validate_image, validate_image_content,
};
use crate::validate::rules::{validate_author, validate_book};
use log::warn;
use std::collections::BTreeSet;

/// Runs the full pipeline. Idempotent: sanitizing already-clean data is a
/// no-op.
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Large function, called on every load and save"
)]
pub async fn sanitize_data(data: StorageData) -> StorageData {
    let mut valid_authors: Vec<Author> = Vec::with_capacity(data.authors.len());
    for mut author in data.authors {
        if !validate_author(&author) {
            warn!("Skipping invalid author: {}", author.name);
            continue;
        }

        if let Some(photo) = author.photo.take() {
            if !validate_image(&photo, MAX_AUTHOR_IMAGE_SIZE_BYTES) {
                warn!(
                    "Dropping photo for author \"{}\": invalid format or size",
                    author.name
                );
            } else if !validate_image_content(&photo).await {
                warn!(
                    "Dropping photo for author \"{}\": failed to decode",
                    author.name
                );
            } else {
                author.photo = Some(photo);
            }
        }

        valid_authors.push(author);
    }

    let author_names: Vec<String> = valid_authors
        .iter()
        .map(|author| author.name.clone())
        .collect();

    let mut valid_books: Vec<Book> = Vec::with_capacity(data.books.len());
    for mut book in data.books {
        if !validate_book(&book, &author_names) {
            warn!("Skipping invalid book: {}", book.title);
            continue;
        }

        if let Some(cover) = book.cover_image.take() {
            if !validate_image(&cover, MAX_IMAGE_SIZE_BYTES) {
                warn!(
                    "Dropping cover image for book \"{}\": invalid format or size",
                    book.title
                );
            } else if !validate_image_content(&cover).await {
                warn!(
                    "Dropping cover image for book \"{}\": failed to decode",
                    book.title
                );
            } else {
                book.cover_image = Some(cover);
            }
        }

        valid_books.push(book);
    }

    StorageData {
        books: valid_books,
        authors: valid_authors,
        languages: dedupe_sorted(data.languages),
        publishers: dedupe_sorted(data.publishers),
        settings: data.settings,
    }
}

/// Exact-string dedupe plus sort. Registries are case-insensitive only at
/// insertion time; here only literal collisions collapse.
fn dedupe_sorted(values: Vec<String>) -> Vec<String> {
    values.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}
