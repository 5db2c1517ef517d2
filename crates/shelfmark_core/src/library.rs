//! The in-memory library aggregate.
//!
//! Holds the authoritative books/authors/languages/publishers for one
//! namespace and owns every invariant-preserving mutation: validate-then-
//! persist on writes, rename cascades for the denormalized author names,
//! reference-guarded author deletes, and duplicate prevention on the
//! free-text registries. The UI goes through this type; it never touches
//! the store directly.
//!
//! The write path is deliberately stricter than the load path: the same
//! validators that silently drop bad entities during a load here refuse
//! the single mutating operation and leave prior state untouched.

use crate::model::{Author, Book, ReadingStatus, Settings, StorageData};
use crate::store::{StoragePatch, Store};
use crate::validate::rules::validate_book;
use log::warn;
use std::collections::HashSet;
use uuid::Uuid;

/// Order in which [`Library::authors`] presents the registry. A pure
/// projection; stored order is always insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorSortOrder {
    #[default]
    Ascending,
    Descending,
    Insertion,
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    /// The book failed a field or author-reference check; nothing was
    /// mutated or persisted. The specific reason is in the log.
    #[error("book \"{title}\" failed validation, not saved")]
    InvalidBook { title: String },

    /// Deleting this author would orphan books that reference their name.
    #[error("cannot delete author \"{name}\" because they have books in the library")]
    AuthorReferenced { name: String },
}

/// A partial update to a single book. `Some` replaces the field; for the
/// optional book fields the inner `Option` distinguishes "set" from
/// "clear".
#[derive(Debug, Clone, Default)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
    pub pages: Option<i64>,
    pub publisher: Option<String>,
    pub purchase_date: Option<String>,
    pub publish_date: Option<String>,
    pub publish_year_only: Option<bool>,
    pub cover_image: Option<Option<String>>,
    pub price: Option<f64>,
    pub status: Option<ReadingStatus>,
    pub start_date: Option<Option<String>>,
    pub completion_date: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub current_page: Option<Option<i64>>,
    pub rating: Option<Option<i64>>,
    pub is_gifted: Option<bool>,
}

impl BookPatch {
    fn apply(self, base: &Book) -> Book {
        let mut book = base.clone();
        if let Some(title) = self.title {
            book.title = title;
        }
        if let Some(author) = self.author {
            book.author = author;
        }
        if let Some(language) = self.language {
            book.language = language;
        }
        if let Some(pages) = self.pages {
            book.pages = pages;
        }
        if let Some(publisher) = self.publisher {
            book.publisher = publisher;
        }
        if let Some(purchase_date) = self.purchase_date {
            book.purchase_date = purchase_date;
        }
        if let Some(publish_date) = self.publish_date {
            book.publish_date = publish_date;
        }
        if let Some(publish_year_only) = self.publish_year_only {
            book.publish_year_only = publish_year_only;
        }
        if let Some(cover_image) = self.cover_image {
            book.cover_image = cover_image;
        }
        if let Some(price) = self.price {
            book.price = price;
        }
        if let Some(status) = self.status {
            book.status = status;
        }
        if let Some(start_date) = self.start_date {
            book.start_date = start_date;
        }
        if let Some(completion_date) = self.completion_date {
            book.completion_date = completion_date;
        }
        if let Some(notes) = self.notes {
            book.notes = notes;
        }
        if let Some(current_page) = self.current_page {
            book.current_page = current_page;
        }
        if let Some(rating) = self.rating {
            book.rating = rating;
        }
        if let Some(is_gifted) = self.is_gifted {
            book.is_gifted = is_gifted;
        }
        book
    }
}

pub struct Library {
    store: Store,
    key: String,
    books: Vec<Book>,
    authors: Vec<Author>,
    languages: Vec<String>,
    publishers: Vec<String>,
    settings: Settings,
    author_sort: AuthorSortOrder,
}

impl Library {
    /// Loads the namespace under `key` through the full sanitizing
    /// pipeline and takes ownership of the store.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once per session"
    )]
    pub async fn open(store: Store, key: impl Into<String>) -> Self {
        let key = key.into();
        let data = store.load(&key).await;

        Self {
            store,
            key,
            books: data.books,
            authors: data.authors,
            languages: data.languages,
            publishers: data.publishers,
            settings: data.settings,
            author_sort: AuthorSortOrder::default(),
        }
    }

    #[must_use]
    #[inline]
    pub fn books(&self) -> &[Book] {
        &self.books
    }

    /// The author registry in the configured presentation order.
    #[must_use]
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub fn authors(&self) -> Vec<Author> {
        let mut authors = self.authors.clone();
        match self.author_sort {
            AuthorSortOrder::Ascending => {
                authors.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            }
            AuthorSortOrder::Descending => {
                authors.sort_by(|a, b| b.name.to_lowercase().cmp(&a.name.to_lowercase()));
            }
            AuthorSortOrder::Insertion => {}
        }
        authors
    }

    #[must_use]
    #[inline]
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    #[must_use]
    #[inline]
    pub fn publishers(&self) -> &[String] {
        &self.publishers
    }

    #[must_use]
    #[inline]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    #[inline]
    pub const fn author_sort(&self) -> AuthorSortOrder {
        self.author_sort
    }

    #[inline]
    pub fn set_author_sort(&mut self, order: AuthorSortOrder) {
        self.author_sort = order;
    }

    fn author_names(&self) -> Vec<String> {
        self.authors.iter().map(|a| a.name.clone()).collect()
    }

    /// Adds a book under a freshly generated id; any caller-supplied id is
    /// replaced. Returns the new id, or refuses without mutating anything
    /// if the book fails validation against the current author registry.
    ///
    /// # Errors
    /// [`LibraryError::InvalidBook`] when a field or author check fails.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn add_book(&mut self, mut book: Book) -> Result<String, LibraryError> {
        book.id = Uuid::new_v4().to_string();

        if !validate_book(&book, &self.author_names()) {
            return Err(LibraryError::InvalidBook { title: book.title });
        }

        let id = book.id.clone();
        self.books.push(book);
        self.persist_books().await;

        Ok(id)
    }

    /// Merges `patch` onto the stored book and re-validates the merged
    /// result, not just the patch. Unknown ids are a logged no-op.
    ///
    /// # Errors
    /// [`LibraryError::InvalidBook`] when the merged book fails validation;
    /// prior state stays untouched.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn update_book(&mut self, id: &str, patch: BookPatch) -> Result<(), LibraryError> {
        let Some(position) = self.books.iter().position(|book| book.id == id) else {
            warn!("Ignoring update for unknown book id {id}");
            return Ok(());
        };

        let merged = patch.apply(&self.books[position]);
        if !validate_book(&merged, &self.author_names()) {
            return Err(LibraryError::InvalidBook {
                title: merged.title,
            });
        }

        self.books[position] = merged;
        self.persist_books().await;

        Ok(())
    }

    /// Unconditional removal by id.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn delete_book(&mut self, id: &str) {
        self.books.retain(|book| book.id != id);
        self.persist_books().await;
    }

    /// Adds an author under a fresh id. A name that already exists
    /// case-insensitively is a silent no-op.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn add_author(&mut self, name: &str, photo: Option<String>) {
        let lowered = name.to_lowercase();
        if self
            .authors
            .iter()
            .any(|author| author.name.to_lowercase() == lowered)
        {
            return;
        }

        self.authors
            .push(Author::new(Uuid::new_v4().to_string(), name.to_owned(), photo));
        self.persist_authors().await;
    }

    /// Renames an author and/or replaces their photo. `photo` of `None`
    /// keeps the stored photo.
    ///
    /// A name change cascades: every book referencing the old name is
    /// rewritten to the new one, and books and authors go to the store in
    /// a single save so no window exists where books reference a name
    /// that is gone.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Large function, called rarely"
    )]
    pub async fn update_author(&mut self, id: &str, name: &str, photo: Option<String>) {
        let Some(old) = self.authors.iter().find(|author| author.id == id).cloned() else {
            warn!("Ignoring update for unknown author id {id}");
            return;
        };

        for author in &mut self.authors {
            if author.id == id {
                author.name = name.to_owned();
                if let Some(photo) = photo.clone() {
                    author.photo = Some(photo);
                }
            }
        }

        if old.name == name {
            self.persist_authors().await;
            return;
        }

        for book in &mut self.books {
            if book.author == old.name {
                book.author = name.to_owned();
            }
        }

        // Both fields in one patch: the cascade must land atomically.
        self.store
            .save(
                StoragePatch {
                    books: Some(self.books.clone()),
                    authors: Some(self.authors.clone()),
                    ..StoragePatch::default()
                },
                &self.key,
            )
            .await;
    }

    /// Removes an author, refusing while any book still references their
    /// name. The refusal is non-destructive and reports why.
    ///
    /// # Errors
    /// [`LibraryError::AuthorReferenced`] when books still use the name.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn delete_author(&mut self, id: &str) -> Result<(), LibraryError> {
        let Some(author) = self.authors.iter().find(|author| author.id == id) else {
            return Ok(());
        };
        let name = author.name.clone();

        if self.books.iter().any(|book| book.author == name) {
            warn!("Cannot delete author \"{name}\" because they have books in the library");
            return Err(LibraryError::AuthorReferenced { name });
        }

        self.authors.retain(|author| author.id != id);
        self.persist_authors().await;

        Ok(())
    }

    /// Distinct author names that appear on books but not in the registry,
    /// in book order. A read-only consistency report; non-empty output
    /// means the data has drifted (schema migration, external edit, or the
    /// bootstrap exception admitting a book before its author existed).
    #[must_use]
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub fn check_orphans(&self) -> Vec<String> {
        let known: HashSet<&str> = self.authors.iter().map(|a| a.name.as_str()).collect();

        let mut seen: HashSet<&str> = HashSet::new();
        self.books
            .iter()
            .filter(|book| !known.contains(book.author.as_str()))
            .filter(|book| seen.insert(book.author.as_str()))
            .map(|book| book.author.clone())
            .collect()
    }

    /// Bulk-rewrites every book authored `old_name` to `new_name`. Used to
    /// resolve orphans reported by [`Library::check_orphans`], where no
    /// author entity for `old_name` need exist at all.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn reassign_books(&mut self, old_name: &str, new_name: &str) {
        for book in &mut self.books {
            if book.author == old_name {
                book.author = new_name.to_owned();
            }
        }
        self.persist_books().await;
    }

    /// Adds to the language registry; case-insensitive duplicates are
    /// rejected silently.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn add_language(&mut self, language: &str) {
        if push_unique(&mut self.languages, language) {
            self.store
                .save(StoragePatch::languages(self.languages.clone()), &self.key)
                .await;
        }
    }

    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn delete_language(&mut self, language: &str) {
        self.languages.retain(|entry| entry != language);
        self.store
            .save(StoragePatch::languages(self.languages.clone()), &self.key)
            .await;
    }

    /// Adds to the publisher registry; case-insensitive duplicates are
    /// rejected silently.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn add_publisher(&mut self, publisher: &str) {
        if push_unique(&mut self.publishers, publisher) {
            self.store
                .save(StoragePatch::publishers(self.publishers.clone()), &self.key)
                .await;
        }
    }

    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn delete_publisher(&mut self, publisher: &str) {
        self.publishers.retain(|entry| entry != publisher);
        self.store
            .save(StoragePatch::publishers(self.publishers.clone()), &self.key)
            .await;
    }

    /// Updates the display currency and persists the settings object.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub async fn set_currency(&mut self, currency: &str) {
        self.settings.currency = currency.to_owned();
        self.store
            .save(StoragePatch::settings(self.settings.clone()), &self.key)
            .await;
    }

    /// Snapshot of the full aggregate, e.g. for a backup export.
    #[must_use]
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called rarely"
    )]
    pub fn snapshot(&self) -> StorageData {
        StorageData {
            books: self.books.clone(),
            authors: self.authors.clone(),
            languages: self.languages.clone(),
            publishers: self.publishers.clone(),
            settings: self.settings.clone(),
        }
    }

    /// Replaces the whole aggregate from imported data and reloads the
    /// in-memory state from what actually survived sanitization.
    pub(crate) fn adopt(&mut self, data: StorageData) {
        self.books = data.books;
        self.authors = data.authors;
        self.languages = data.languages;
        self.publishers = data.publishers;
        self.settings = data.settings;
    }

    #[must_use]
    #[inline]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    async fn persist_books(&self) {
        self.store
            .save(StoragePatch::books(self.books.clone()), &self.key)
            .await;
    }

    async fn persist_authors(&self) {
        self.store
            .save(StoragePatch::authors(self.authors.clone()), &self.key)
            .await;
    }
}

/// Case-insensitive duplicate check; pushes and re-sorts on success.
fn push_unique(registry: &mut Vec<String>, entry: &str) -> bool {
    let lowered = entry.to_lowercase();
    if registry.iter().any(|existing| existing.to_lowercase() == lowered) {
        return false;
    }

    registry.push(entry.to_owned());
    registry.sort();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DEFAULT_STORAGE_KEY;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn book_for(author: &str, title: &str) -> Book {
        Book {
            id: String::from("pending"),
            title: String::from(title),
            author: String::from(author),
            language: String::from("English"),
            pages: 300,
            publisher: String::from("Orbit"),
            price: 15.0,
            status: ReadingStatus::ToRead,
            ..Book::default()
        }
    }

    async fn open_library(dir: &TempDir) -> Library {
        let store = Store::open(&dir.path().join("shelf.db"), None).await.unwrap();
        Library::open(store, DEFAULT_STORAGE_KEY).await
    }

    async fn library_with_author(dir: &TempDir, name: &str) -> Library {
        let mut library = open_library(dir).await;
        library.add_author(name, None).await;
        library
    }

    #[tokio::test]
    async fn add_book_assigns_id_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_author(&dir, "Ann Leckie").await;

        let id = library
            .add_book(book_for("Ann Leckie", "Ancillary Justice"))
            .await
            .unwrap();

        assert_ne!(id, "pending");
        assert_eq!(library.books().len(), 1);

        let stored = library.store().load(library.key()).await;
        assert_eq!(stored.books.len(), 1);
        assert_eq!(stored.books[0].id, id);
    }

    #[tokio::test]
    async fn invalid_book_is_refused_without_mutation() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_author(&dir, "Ann Leckie").await;

        let mut bad = book_for("Ann Leckie", "Zero Pages");
        bad.pages = 0;
        assert!(library.add_book(bad).await.is_err());

        let unknown_author = book_for("Nobody", "Ghosted");
        assert!(library.add_book(unknown_author).await.is_err());

        assert_eq!(library.books().len(), 0);
        assert_eq!(library.store().load(library.key()).await.books.len(), 0);
    }

    #[tokio::test]
    async fn update_book_validates_the_merged_result() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_author(&dir, "Ann Leckie").await;
        let id = library
            .add_book(book_for("Ann Leckie", "Ancillary Justice"))
            .await
            .unwrap();

        let bad_patch = BookPatch {
            pages: Some(0),
            ..BookPatch::default()
        };
        assert!(library.update_book(&id, bad_patch).await.is_err());
        assert_eq!(library.books()[0].pages, 300);

        let good_patch = BookPatch {
            status: Some(ReadingStatus::Completed),
            rating: Some(Some(5)),
            ..BookPatch::default()
        };
        library.update_book(&id, good_patch).await.unwrap();
        assert_eq!(library.books()[0].status, ReadingStatus::Completed);
        assert_eq!(library.books()[0].rating, Some(5));

        // Unknown id is a no-op, not an error.
        library
            .update_book("no-such-id", BookPatch::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_book_removes_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_author(&dir, "Ann Leckie").await;
        let id = library
            .add_book(book_for("Ann Leckie", "Ancillary Justice"))
            .await
            .unwrap();

        library.delete_book(&id).await;

        assert_eq!(library.books().len(), 0);
        assert_eq!(library.store().load(library.key()).await.books.len(), 0);
    }

    #[tokio::test]
    async fn duplicate_author_names_are_rejected_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let mut library = open_library(&dir).await;

        library.add_author("Ted Chiang", None).await;
        library.add_author("ted chiang", None).await;

        assert_eq!(library.authors().len(), 1);
    }

    #[tokio::test]
    async fn rename_cascades_to_every_referencing_book() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_author(&dir, "Old").await;
        for title in ["One", "Two", "Three"] {
            library.add_book(book_for("Old", title)).await.unwrap();
        }
        let author_id = library.authors()[0].id.clone();
        assert_eq!(library.check_orphans(), Vec::<String>::new());

        library.update_author(&author_id, "New", None).await;

        assert!(library.books().iter().all(|book| book.author == "New"));
        assert_eq!(library.check_orphans(), Vec::<String>::new());

        // The cascade went to the store as one save: the reloaded blob has
        // both the renamed author and the rewritten books.
        let stored = library.store().load(library.key()).await;
        assert_eq!(stored.authors[0].name, "New");
        assert_eq!(stored.books.len(), 3);
        assert!(stored.books.iter().all(|book| book.author == "New"));
    }

    #[tokio::test]
    async fn photo_only_update_leaves_books_alone() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_author(&dir, "Ted Chiang").await;
        library
            .add_book(book_for("Ted Chiang", "Exhalation"))
            .await
            .unwrap();
        let author_id = library.authors()[0].id.clone();

        library.update_author(&author_id, "Ted Chiang", None).await;

        assert_eq!(library.books()[0].author, "Ted Chiang");
        assert_eq!(library.authors()[0].photo, None);
    }

    #[tokio::test]
    async fn referenced_author_cannot_be_deleted() {
        let dir = TempDir::new().unwrap();
        let mut library = library_with_author(&dir, "Ted Chiang").await;
        library
            .add_book(book_for("Ted Chiang", "Exhalation"))
            .await
            .unwrap();
        let author_id = library.authors()[0].id.clone();

        let refusal = library.delete_author(&author_id).await;
        assert!(matches!(
            refusal,
            Err(LibraryError::AuthorReferenced { .. })
        ));
        assert_eq!(library.authors().len(), 1);

        let book_id = library.books()[0].id.clone();
        library.delete_book(&book_id).await;
        library.delete_author(&author_id).await.unwrap();
        assert_eq!(library.authors().len(), 0);
    }

    #[tokio::test]
    async fn orphans_are_reported_and_reassignable() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("shelf.db"), None).await.unwrap();

        // Seed books with no author registry at all: the bootstrap
        // exception admits them, and they surface as orphans.
        let mut seeded = StorageData::default();
        let mut book = book_for("Ghost", "Haunted");
        book.id = String::from("b1");
        seeded.books.push(book);
        store.replace(seeded, DEFAULT_STORAGE_KEY).await.unwrap();

        let mut library = Library::open(store, DEFAULT_STORAGE_KEY).await;
        assert_eq!(library.check_orphans(), vec![String::from("Ghost")]);

        library.add_author("Real Name", None).await;
        library.reassign_books("Ghost", "Real Name").await;

        assert_eq!(library.check_orphans(), Vec::<String>::new());
        let stored = library.store().load(library.key()).await;
        assert_eq!(stored.books[0].author, "Real Name");
    }

    #[tokio::test]
    async fn registries_reject_case_insensitive_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut library = open_library(&dir).await;

        library.add_language("English").await;
        library.add_language("english").await;
        library.add_language("Dutch").await;
        assert_eq!(
            library.languages(),
            &[String::from("Dutch"), String::from("English")]
        );

        library.delete_language("Dutch").await;
        assert_eq!(library.languages(), &[String::from("English")]);

        library.add_publisher("Tor").await;
        library.add_publisher("TOR").await;
        assert_eq!(library.publishers(), &[String::from("Tor")]);
    }

    #[tokio::test]
    async fn author_view_order_is_a_pure_projection() {
        let dir = TempDir::new().unwrap();
        let mut library = open_library(&dir).await;
        library.add_author("Zadie Smith", None).await;
        library.add_author("Ann Leckie", None).await;

        let ascending: Vec<String> = library.authors().into_iter().map(|a| a.name).collect();
        assert_eq!(ascending, vec!["Ann Leckie", "Zadie Smith"]);

        library.set_author_sort(AuthorSortOrder::Descending);
        let descending: Vec<String> = library.authors().into_iter().map(|a| a.name).collect();
        assert_eq!(descending, vec!["Zadie Smith", "Ann Leckie"]);

        library.set_author_sort(AuthorSortOrder::Insertion);
        let insertion: Vec<String> = library.authors().into_iter().map(|a| a.name).collect();
        assert_eq!(insertion, vec!["Zadie Smith", "Ann Leckie"]);
    }

    #[tokio::test]
    async fn currency_update_persists_settings() {
        let dir = TempDir::new().unwrap();
        let mut library = open_library(&dir).await;

        library.set_currency("¥").await;

        assert_eq!(library.settings().currency, "¥");
        let stored = library.store().load(library.key()).await;
        assert_eq!(stored.settings.currency, "¥");
    }
}
