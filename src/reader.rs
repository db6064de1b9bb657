//! An open book: load, resume, page, bookmark.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::{ReaderError, ReaderResult};
use crate::fallback::WebBookFetcher;
use crate::library::{generate_book_id, BookId, BookIdentity, Library, WebBook};
use crate::progress::{resume_sector, ProgressTracker, ProgressUpdate};
use crate::segment::{segment, Sector, Segmentation, TocEntry};
use crate::sources::{SearchResult, SourceManager};

/// Hands out load tickets; only the newest ticket may commit.
#[derive(Debug, Default)]
pub struct LoadGeneration(AtomicU64);

impl LoadGeneration {
    pub fn begin(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.0.load(Ordering::SeqCst) == ticket
    }
}

#[derive(Debug, Clone)]
enum OpenedFrom {
    Source(SearchResult),
    Web(WebBook),
}

impl OpenedFrom {
    fn identity(&self) -> &dyn BookIdentity {
        match self {
            OpenedFrom::Source(result) => result,
            OpenedFrom::Web(book) => book,
        }
    }
}

#[derive(Debug)]
struct OpenBook {
    from: OpenedFrom,
    book_id: BookId,
    user: Option<String>,
    segmentation: Segmentation,
    current: usize,
    bookmarked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookView {
    pub book_id: BookId,
    pub title: String,
    pub authors: String,
    pub sector_count: usize,
    pub current_sector: usize,
    pub bookmarked: bool,
    pub toc: Vec<TocEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum LoadOutcome {
    Loaded(BookView),
    /// A newer load started while this one was in flight; its result was
    /// discarded.
    Superseded,
}

pub struct ReaderSession {
    manager: Arc<SourceManager>,
    web: Arc<WebBookFetcher>,
    library: Library,
    tracker: Arc<ProgressTracker>,
    generation: LoadGeneration,
    open: Mutex<Option<OpenBook>>,
}

impl ReaderSession {
    pub fn new(
        manager: Arc<SourceManager>,
        web: Arc<WebBookFetcher>,
        library: Library,
        tracker: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            manager,
            web,
            library,
            tracker,
            generation: LoadGeneration::default(),
            open: Mutex::new(None),
        }
    }

    fn state(&self) -> ReaderResult<MutexGuard<'_, Option<OpenBook>>> {
        self.open
            .lock()
            .map_err(|_| anyhow::anyhow!("reader state poisoned").into())
    }

    pub fn open_book(
        &self,
        user: Option<&str>,
        result: &SearchResult,
    ) -> ReaderResult<LoadOutcome> {
        let ticket = self.generation.begin();
        let content = self.manager.fetch_book_text(result);
        self.commit(ticket, user, OpenedFrom::Source(result.clone()), content)
    }

    pub fn open_web_book(
        &self,
        user: Option<&str>,
        url: &str,
        title: &str,
    ) -> ReaderResult<LoadOutcome> {
        let ticket = self.generation.begin();
        let content = self.web.fetch_content_from_url(url);
        let book = WebBook {
            url: url.to_string(),
            title: title.to_string(),
        };
        self.commit(ticket, user, OpenedFrom::Web(book), content)
    }

    fn commit(
        &self,
        ticket: u64,
        user: Option<&str>,
        from: OpenedFrom,
        content: ReaderResult<String>,
    ) -> ReaderResult<LoadOutcome> {
        let book_id = generate_book_id(from.identity());

        if !self.generation.is_current(ticket) {
            log::debug!("book={book_id} load superseded, discarding");
            return Ok(LoadOutcome::Superseded);
        }

        let segmentation = segment(&content?);
        if segmentation.is_empty() {
            log::warn!("book={book_id} has no readable paragraphs");
        }

        let saved = match (user, from.identity().is_persistent()) {
            (Some(user), true) => self.library.get_library_book(user, &book_id)?,
            _ => None,
        };
        let current = resume_sector(
            saved.as_ref().map(|b| b.last_read_sector),
            segmentation.len(),
        );

        let mut state = self.state()?;
        // a newer load may have committed while the library was read
        if !self.generation.is_current(ticket) {
            return Ok(LoadOutcome::Superseded);
        }

        log::info!(
            "book={book_id} opened sectors={} resume={current}",
            segmentation.len()
        );

        let book = OpenBook {
            from,
            book_id,
            user: user.map(str::to_string),
            segmentation,
            current,
            bookmarked: saved.is_some(),
        };
        let view = view_of(&book);
        *state = Some(book);

        Ok(LoadOutcome::Loaded(view))
    }

    /// Move to `sector`, clamped to the book. Bookmarked books get a
    /// debounced progress write.
    pub fn go_to(&self, sector: usize) -> ReaderResult<usize> {
        let mut state = self.state()?;
        let book = state
            .as_mut()
            .ok_or_else(|| ReaderError::InvalidInput("no book is open".into()))?;

        book.current = resume_sector(Some(sector), book.segmentation.len());

        if let (true, Some(user)) = (book.bookmarked, &book.user) {
            if let Some(update) = ProgressUpdate::at_sector(book.current, book.segmentation.len()) {
                self.tracker.schedule(user, &book.book_id, update);
            }
        }

        Ok(book.current)
    }

    /// Save or unsave the open book. Returns the new bookmark state.
    pub fn toggle_bookmark(&self) -> ReaderResult<bool> {
        let mut state = self.state()?;
        let book = state
            .as_mut()
            .ok_or_else(|| ReaderError::InvalidInput("no book is open".into()))?;

        let identity = book.from.identity();
        if !identity.is_persistent() {
            return Err(ReaderError::NotBookmarkable(identity.book_title().to_string()));
        }
        let user = book
            .user
            .clone()
            .ok_or_else(|| ReaderError::InvalidInput("a user is required to bookmark".into()))?;

        if book.bookmarked {
            self.tracker.cancel(&user, &book.book_id);
            self.library.remove_book_from_library(&user, &book.book_id)?;
            book.bookmarked = false;
        } else {
            self.library.add_book_to_library(&user, identity)?;
            book.bookmarked = true;
            if let Some(update) = ProgressUpdate::at_sector(book.current, book.segmentation.len()) {
                self.tracker.schedule(&user, &book.book_id, update);
            }
        }

        Ok(book.bookmarked)
    }

    pub fn view(&self) -> ReaderResult<Option<BookView>> {
        Ok(self.state()?.as_ref().map(view_of))
    }

    pub fn current_sector(&self) -> ReaderResult<Option<Sector>> {
        Ok(self
            .state()?
            .as_ref()
            .and_then(|b| b.segmentation.sectors.get(b.current).cloned()))
    }
}

fn view_of(book: &OpenBook) -> BookView {
    let identity = book.from.identity();
    BookView {
        book_id: book.book_id.clone(),
        title: identity.book_title().to_string(),
        authors: identity.book_authors().to_string(),
        sector_count: book.segmentation.len(),
        current_sector: book.current,
        bookmarked: book.bookmarked,
        toc: book.segmentation.toc.clone(),
    }
}
