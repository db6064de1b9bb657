use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::fixtures::{
    adapters_with, gutendex_result, wikisource_result, Behaviour, FixtureHttp, StubAdapter,
};
use crate::errors::{ReaderError, ReaderResult};
use crate::fallback::WebBookFetcher;
use crate::library::{generate_book_id, BackendCsv, Library};
use crate::progress::{ProgressTracker, ProgressUpdate};
use crate::reader::{LoadGeneration, LoadOutcome, ReaderSession};
use crate::sources::{RawContent, SearchResult, SourceAdapter, SourceKind, SourceManager};
use crate::storage;

fn chapters(count: usize) -> String {
    (1..=count)
        .map(|i| format!("CHAPTER {i}\n\nFirst.\n\nSecond.\n\nThird."))
        .collect::<Vec<_>>()
        .join("\n\n")
}

struct Harness {
    session: ReaderSession,
    library: Library,
    tracker: Arc<ProgressTracker>,
    _tmp: tempfile::TempDir,
}

fn harness(adapters: Vec<Box<dyn SourceAdapter>>, http: FixtureHttp) -> Harness {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let store = Arc::new(storage::BackendLocal::new(tmp.path().to_str().unwrap()).unwrap());
    let library = Library::new(Arc::new(BackendCsv::new(store)));
    let tracker = Arc::new(ProgressTracker::new(library.clone(), Duration::from_secs(60)).unwrap());
    let manager = Arc::new(SourceManager::new(
        adapters_with(adapters),
        SourceKind::ALL.to_vec(),
        None,
    ));

    let session = ReaderSession::new(
        manager,
        Arc::new(WebBookFetcher::new(http.arc())),
        library.clone(),
        tracker.clone(),
    );

    Harness {
        session,
        library,
        tracker,
        _tmp: tmp,
    }
}

fn gutendex_with(content: String) -> Box<dyn SourceAdapter> {
    Box::new(StubAdapter {
        kind: SourceKind::Gutendex,
        behaviour: Behaviour::Results(vec![]),
        content,
    })
}

fn loaded(outcome: LoadOutcome) -> crate::reader::BookView {
    match outcome {
        LoadOutcome::Loaded(view) => view,
        LoadOutcome::Superseded => panic!("load was superseded"),
    }
}

// --- resume ---

#[test]
fn open_resumes_saved_sector() {
    let h = harness(vec![gutendex_with(chapters(5))], FixtureHttp::new());
    let book = gutendex_result("2701", "Moby Dick");
    let id = generate_book_id(&book);
    h.library.add_book_to_library("alice", &book).unwrap();
    h.library
        .update_book_progress(
            "alice",
            &id,
            ProgressUpdate {
                progress_percent: 60.0,
                last_read_sector: 3,
            },
        )
        .unwrap();

    let view = loaded(h.session.open_book(Some("alice"), &book).unwrap());
    assert_eq!(view.sector_count, 5);
    assert_eq!(view.current_sector, 3);
    assert!(view.bookmarked);
    assert_eq!(view.toc.len(), 5);
}

#[test]
fn saved_sector_past_end_is_clamped() {
    let h = harness(vec![gutendex_with(chapters(2))], FixtureHttp::new());
    let book = gutendex_result("2701", "Moby Dick");
    let id = generate_book_id(&book);
    h.library.add_book_to_library("alice", &book).unwrap();
    h.library
        .update_book_progress(
            "alice",
            &id,
            ProgressUpdate {
                progress_percent: 90.0,
                last_read_sector: 40,
            },
        )
        .unwrap();

    let view = loaded(h.session.open_book(Some("alice"), &book).unwrap());
    assert_eq!(view.current_sector, 1);
}

#[test]
fn anonymous_reader_starts_at_zero() {
    let h = harness(vec![gutendex_with(chapters(3))], FixtureHttp::new());
    let view = loaded(
        h.session
            .open_book(None, &gutendex_result("2701", "Moby Dick"))
            .unwrap(),
    );
    assert_eq!(view.current_sector, 0);
    assert!(!view.bookmarked);
}

// --- paging and bookmarks ---

#[test]
fn paging_a_bookmarked_book_persists_progress() {
    let h = harness(vec![gutendex_with(chapters(4))], FixtureHttp::new());
    let book = gutendex_result("2701", "Moby Dick");
    let id = generate_book_id(&book);

    loaded(h.session.open_book(Some("alice"), &book).unwrap());
    assert!(h.session.toggle_bookmark().unwrap());

    assert_eq!(h.session.go_to(1).unwrap(), 1);
    assert_eq!(h.session.go_to(99).unwrap(), 3);
    h.tracker.flush();

    let saved = h.library.get_library_book("alice", &id).unwrap().unwrap();
    assert_eq!(saved.last_read_sector, 3);
    assert_eq!(saved.progress_percent, 100.0);
    assert_eq!(
        h.session.current_sector().unwrap().unwrap().paragraphs[0],
        "CHAPTER 4"
    );
}

#[test]
fn unbookmarking_cancels_pending_progress() {
    let h = harness(vec![gutendex_with(chapters(4))], FixtureHttp::new());
    let book = gutendex_result("2701", "Moby Dick");
    let id = generate_book_id(&book);

    loaded(h.session.open_book(Some("alice"), &book).unwrap());
    h.session.toggle_bookmark().unwrap();
    h.session.go_to(2).unwrap();
    assert!(!h.session.toggle_bookmark().unwrap());
    h.tracker.flush();

    assert_eq!(h.library.get_library_book("alice", &id).unwrap(), None);
}

#[test]
fn web_book_cannot_be_bookmarked() {
    let http = FixtureHttp::new().route("https://a.org/moby.txt", chapters(2));
    let h = harness(vec![], http);

    let view = loaded(
        h.session
            .open_web_book(Some("alice"), "https://a.org/moby.txt", "Moby")
            .unwrap(),
    );
    assert!(view.book_id.is_web());
    assert_eq!(view.sector_count, 2);

    let err = h.session.toggle_bookmark().unwrap_err();
    assert!(matches!(err, ReaderError::NotBookmarkable(_)));
}

#[test]
fn pdf_link_is_unsupported() {
    let h = harness(vec![], FixtureHttp::new());
    let err = h
        .session
        .open_web_book(None, "https://a.org/moby.pdf", "Moby")
        .unwrap_err();
    assert!(err.is_unsupported_format());
    assert_eq!(h.session.view().unwrap(), None);
}

#[test]
fn html_link_is_extracted() {
    let url = "https://a.org/moby.html";
    let page = r#"<html><body>
        <nav>Home | Books | About</nav>
        <main>
            <p>Call me Ishmael. Some years ago, never mind how long precisely,</p>
            <p>having little or no money in my purse, I thought I would sail about a little.</p>
        </main>
    </body></html>"#;
    let fetcher = WebBookFetcher::new(FixtureHttp::new().route(url, page).arc());

    assert_eq!(
        fetcher.fetch_content_from_url(url).unwrap(),
        "Call me Ishmael. Some years ago, never mind how long precisely,\n\n\
         having little or no money in my purse, I thought I would sail about a little."
    );
}

#[test]
fn html_link_without_prose_is_extraction_error() {
    let url = "https://a.org/index.htm";
    let page = r#"<html><body>
        <nav>Home | Books | About</nav>
        <script>window.analytics = true;</script>
    </body></html>"#;
    let h = harness(vec![], FixtureHttp::new().route(url, page));

    let err = h.session.open_web_book(None, url, "Index").unwrap_err();
    assert!(matches!(err, ReaderError::ContentExtraction(_)));
    assert_eq!(h.session.view().unwrap(), None);
}

// --- stale loads ---

#[test]
fn generation_tickets_supersede() {
    let generation = LoadGeneration::default();
    let first = generation.begin();
    let second = generation.begin();
    assert!(!generation.is_current(first));
    assert!(generation.is_current(second));
}

/// Blocks in `fetch_content` until released.
struct GatedAdapter {
    started: Mutex<mpsc::Sender<()>>,
    gate: Mutex<mpsc::Receiver<()>>,
}

impl SourceAdapter for GatedAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Wikisource
    }

    fn search(&self, _query: &str) -> ReaderResult<Vec<SearchResult>> {
        Ok(vec![])
    }

    fn fetch_content(&self, _result: &SearchResult) -> ReaderResult<RawContent> {
        self.started.lock().unwrap().send(()).unwrap();
        self.gate.lock().unwrap().recv().unwrap();
        Ok(RawContent::Text(chapters(9)))
    }
}

#[test]
fn slow_load_is_discarded_when_newer_load_wins() {
    let (started_tx, started_rx) = mpsc::channel();
    let (gate_tx, gate_rx) = mpsc::channel();
    let gated: Box<dyn SourceAdapter> = Box::new(GatedAdapter {
        started: Mutex::new(started_tx),
        gate: Mutex::new(gate_rx),
    });
    let h = harness(vec![gated, gutendex_with(chapters(2))], FixtureHttp::new());

    let slow_outcome = std::thread::scope(|s| {
        let slow = s.spawn(|| h.session.open_book(None, &wikisource_result(1, "Slow")));

        started_rx.recv().unwrap();
        let fast = loaded(
            h.session
                .open_book(None, &gutendex_result("2701", "Moby Dick"))
                .unwrap(),
        );
        assert_eq!(fast.sector_count, 2);

        gate_tx.send(()).unwrap();
        slow.join().unwrap().unwrap()
    });

    assert_eq!(slow_outcome, LoadOutcome::Superseded);
    let view = h.session.view().unwrap().unwrap();
    assert_eq!(view.title, "Moby Dick");
    assert_eq!(view.sector_count, 2);
}
