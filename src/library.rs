//! Per-user saved books and their reading progress.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, RwLock};
use std::{fmt::Display, ops::Deref};

use crate::errors::{ReaderError, ReaderResult};
use crate::fallback::WebFallbackResult;
use crate::progress::ProgressUpdate;
use crate::sources::SearchResult;
use crate::storage::StorageManager;

pub const WEB_SOURCE: &str = "web";

/// Stable persistence key for one logical book.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(String);

impl BookId {
    /// `{source}_{id}`. Characters of `id` outside `[A-Za-z0-9-]` are
    /// written as `_XX` per UTF-8 byte, so distinct ids never collide.
    pub fn for_source(source: &str, id: &str) -> Self {
        let mut escaped = format!("{source}_");
        for c in id.chars() {
            if c.is_ascii_alphanumeric() || c == '-' {
                escaped.push(c);
            } else {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    escaped.push_str(&format!("_{b:02X}"));
                }
            }
        }
        BookId(escaped)
    }

    pub fn for_web(url: &str) -> Self {
        let digest = Sha256::digest(url.trim().as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        BookId(format!("{WEB_SOURCE}_{}", &hex[..16]))
    }

    pub fn is_web(&self) -> bool {
        self.0.starts_with("web_")
    }
}

impl Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for BookId {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for BookId {
    fn from(fr: &str) -> Self {
        BookId(fr.to_string())
    }
}

/// Anything that can be opened in the reader.
pub trait BookIdentity {
    fn source_tag(&self) -> &str;

    /// Source-local id, or the URL for web books.
    fn local_id(&self) -> &str;

    fn book_title(&self) -> &str;

    fn book_authors(&self) -> &str;

    fn is_persistent(&self) -> bool {
        self.source_tag() != WEB_SOURCE
    }
}

impl BookIdentity for SearchResult {
    fn source_tag(&self) -> &str {
        self.kind().tag()
    }

    fn local_id(&self) -> &str {
        self.id()
    }

    fn book_title(&self) -> &str {
        self.title()
    }

    fn book_authors(&self) -> &str {
        self.authors()
    }
}

/// A book opened straight from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebBook {
    pub url: String,
    pub title: String,
}

impl BookIdentity for WebBook {
    fn source_tag(&self) -> &str {
        WEB_SOURCE
    }

    fn local_id(&self) -> &str {
        &self.url
    }

    fn book_title(&self) -> &str {
        &self.title
    }

    fn book_authors(&self) -> &str {
        "Unknown"
    }
}

impl BookIdentity for WebFallbackResult {
    fn source_tag(&self) -> &str {
        WEB_SOURCE
    }

    fn local_id(&self) -> &str {
        &self.url
    }

    fn book_title(&self) -> &str {
        &self.title
    }

    fn book_authors(&self) -> &str {
        "Unknown"
    }
}

pub fn generate_book_id(book: &(impl BookIdentity + ?Sized)) -> BookId {
    if book.source_tag() == WEB_SOURCE {
        BookId::for_web(book.local_id())
    } else {
        BookId::for_source(book.source_tag(), book.local_id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryBook {
    pub book_id: BookId,
    pub source: String,
    pub title: String,
    pub authors: String,
    pub progress_percent: f64,
    pub last_read_sector: usize,
    /// Unix milliseconds
    pub saved_at: i64,
}

pub trait LibraryStore: Send + Sync {
    fn list(&self, user: &str) -> ReaderResult<Vec<LibraryBook>>;
    fn get(&self, user: &str, book_id: &BookId) -> ReaderResult<Option<LibraryBook>>;
    /// Inserts, or replaces the record with the same `book_id`.
    fn upsert(&self, user: &str, book: LibraryBook) -> ReaderResult<()>;
    fn remove(&self, user: &str, book_id: &BookId) -> ReaderResult<bool>;
    /// Returns false when the book is not in the library.
    fn update_progress(
        &self,
        user: &str,
        book_id: &BookId,
        update: &ProgressUpdate,
    ) -> ReaderResult<bool>;
}

fn validate_user(user: &str) -> ReaderResult<()> {
    let valid = !user.is_empty()
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '-'));
    if !valid {
        return Err(ReaderError::InvalidInput(format!("invalid user id {user:?}")));
    }
    Ok(())
}

/// One CSV file per user.
pub struct BackendCsv {
    storage: Arc<dyn StorageManager>,
    lock: RwLock<()>,
}

impl BackendCsv {
    pub fn new(storage: Arc<dyn StorageManager>) -> Self {
        Self {
            storage,
            lock: RwLock::new(()),
        }
    }

    fn ident(user: &str) -> ReaderResult<String> {
        validate_user(user)?;
        Ok(format!("{user}.csv"))
    }

    fn load(&self, ident: &str) -> ReaderResult<Vec<LibraryBook>> {
        if !self.storage.exists(ident) {
            return Ok(Vec::new());
        }

        let data = self.storage.read(ident)?;
        let mut reader = csv::Reader::from_reader(data.as_slice());
        let books = reader
            .deserialize::<LibraryBook>()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(books)
    }

    fn save(&self, ident: &str, books: &[LibraryBook]) -> ReaderResult<()> {
        if books.is_empty() {
            if self.storage.exists(ident) {
                self.storage.delete(ident)?;
            }
            return Ok(());
        }

        let mut writer = csv::Writer::from_writer(vec![]);
        for book in books {
            writer.serialize(book)?;
        }
        let data = writer.into_inner().map_err(|e| ReaderError::IO(e.into_error()))?;

        self.storage.write(ident, &data)?;
        Ok(())
    }

    /// Read-modify-write of one user's file under the write lock.
    fn modify<T>(
        &self,
        user: &str,
        f: impl FnOnce(&mut Vec<LibraryBook>) -> (T, bool),
    ) -> ReaderResult<T> {
        let ident = Self::ident(user)?;
        let _guard = self
            .lock
            .write()
            .map_err(|_| anyhow::anyhow!("library lock poisoned"))?;

        let mut books = self.load(&ident)?;
        let (out, changed) = f(&mut books);
        if changed {
            self.save(&ident, &books)?;
        }
        Ok(out)
    }
}

impl LibraryStore for BackendCsv {
    fn list(&self, user: &str) -> ReaderResult<Vec<LibraryBook>> {
        let ident = Self::ident(user)?;
        let _guard = self
            .lock
            .read()
            .map_err(|_| anyhow::anyhow!("library lock poisoned"))?;
        self.load(&ident)
    }

    fn get(&self, user: &str, book_id: &BookId) -> ReaderResult<Option<LibraryBook>> {
        Ok(self
            .list(user)?
            .into_iter()
            .find(|b| &b.book_id == book_id))
    }

    fn upsert(&self, user: &str, book: LibraryBook) -> ReaderResult<()> {
        if book.book_id.is_web() {
            return Err(ReaderError::NotBookmarkable(book.title));
        }
        self.modify(user, |books| {
            match books.iter_mut().find(|b| b.book_id == book.book_id) {
                Some(existing) => *existing = book,
                None => books.push(book),
            }
            ((), true)
        })
    }

    fn remove(&self, user: &str, book_id: &BookId) -> ReaderResult<bool> {
        self.modify(user, |books| {
            let before = books.len();
            books.retain(|b| &b.book_id != book_id);
            let removed = books.len() != before;
            (removed, removed)
        })
    }

    fn update_progress(
        &self,
        user: &str,
        book_id: &BookId,
        update: &ProgressUpdate,
    ) -> ReaderResult<bool> {
        self.modify(user, |books| {
            match books.iter_mut().find(|b| &b.book_id == book_id) {
                Some(book) => {
                    book.progress_percent = update.progress_percent;
                    book.last_read_sector = update.last_read_sector;
                    (true, true)
                }
                None => (false, false),
            }
        })
    }
}

/// Library operations as the reader uses them.
#[derive(Clone)]
pub struct Library {
    store: Arc<dyn LibraryStore>,
}

impl Library {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }

    pub fn list(&self, user: &str) -> ReaderResult<Vec<LibraryBook>> {
        self.store.list(user)
    }

    pub fn get_library_book(
        &self,
        user: &str,
        book_id: &BookId,
    ) -> ReaderResult<Option<LibraryBook>> {
        self.store.get(user, book_id)
    }

    /// Saves the book, keeping progress if it is already saved. Web books
    /// are rejected with `NotBookmarkable`.
    pub fn add_book_to_library(
        &self,
        user: &str,
        book: &(impl BookIdentity + ?Sized),
    ) -> ReaderResult<LibraryBook> {
        if !book.is_persistent() {
            return Err(ReaderError::NotBookmarkable(book.book_title().to_string()));
        }

        let book_id = generate_book_id(book);
        if let Some(existing) = self.store.get(user, &book_id)? {
            return Ok(existing);
        }

        let record = LibraryBook {
            book_id,
            source: book.source_tag().to_string(),
            title: book.book_title().to_string(),
            authors: book.book_authors().to_string(),
            progress_percent: 0.0,
            last_read_sector: 0,
            saved_at: chrono::Utc::now().timestamp_millis(),
        };

        self.store.upsert(user, record.clone())?;
        log::info!("user={user} book={} saved to library", record.book_id);
        Ok(record)
    }

    pub fn remove_book_from_library(&self, user: &str, book_id: &BookId) -> ReaderResult<bool> {
        let removed = self.store.remove(user, book_id)?;
        if removed {
            log::info!("user={user} book={book_id} removed from library");
        }
        Ok(removed)
    }

    pub fn update_book_progress(
        &self,
        user: &str,
        book_id: &BookId,
        update: ProgressUpdate,
    ) -> ReaderResult<bool> {
        let update = update.validated()?;
        let updated = self.store.update_progress(user, book_id, &update)?;
        if !updated {
            log::debug!("user={user} book={book_id} not in library, progress ignored");
        }
        Ok(updated)
    }
}
