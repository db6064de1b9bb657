use std::sync::Arc;

use super::fixtures::{gutendex_result, wikisource_result};
use crate::errors::ReaderError;
use crate::library::{
    generate_book_id, BackendCsv, BookId, Library, LibraryBook, LibraryStore, WebBook,
};
use crate::progress::ProgressUpdate;
use crate::sources::SearchResult;
use crate::storage::{self, StorageManager};

fn fresh_library() -> (Library, Arc<storage::BackendLocal>, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let store = Arc::new(storage::BackendLocal::new(tmp.path().to_str().unwrap()).unwrap());
    let library = Library::new(Arc::new(BackendCsv::new(store.clone())));
    (library, store, tmp)
}

fn manybooks_result(path: &str, title: &str) -> SearchResult {
    SearchResult::Manybooks {
        id: path.to_string(),
        title: title.to_string(),
        authors: "Unknown".to_string(),
        cover_path: None,
    }
}

// --- book ids ---

#[test]
fn book_id_is_stable_across_constructions() {
    let a = gutendex_result("2701", "Moby Dick");
    let b = gutendex_result("2701", "Moby Dick");
    assert_eq!(generate_book_id(&a), generate_book_id(&b));
    assert_eq!(generate_book_id(&a).as_str(), "gutendex_2701");
}

#[test]
fn web_book_id_depends_on_url_only() {
    let a = WebBook {
        url: "https://a.org/moby.txt".into(),
        title: "Moby".into(),
    };
    let b = WebBook {
        url: "https://a.org/moby.txt".into(),
        title: "Another title".into(),
    };
    assert_eq!(generate_book_id(&a), generate_book_id(&b));
    assert!(generate_book_id(&a).is_web());
}

// --- bookmarks ---

#[test]
fn add_then_remove_leaves_no_trace() {
    let (library, store, _tmp) = fresh_library();
    let book = gutendex_result("2701", "Moby Dick");
    let id = generate_book_id(&book);

    let saved = library.add_book_to_library("alice", &book).unwrap();
    assert_eq!(saved.book_id, id);
    assert_eq!(saved.source, "gutendex");
    assert_eq!(saved.last_read_sector, 0);
    assert!(store.exists("alice.csv"));

    assert!(library.remove_book_from_library("alice", &id).unwrap());
    assert_eq!(library.get_library_book("alice", &id).unwrap(), None);
    assert!(library.list("alice").unwrap().is_empty());
    assert!(!store.exists("alice.csv"));
}

#[test]
fn web_books_are_not_bookmarkable() {
    let (library, _store, _tmp) = fresh_library();
    let book = WebBook {
        url: "https://a.org/moby.txt".into(),
        title: "Moby".into(),
    };

    let err = library.add_book_to_library("alice", &book).unwrap_err();
    assert!(matches!(err, ReaderError::NotBookmarkable(_)));
    assert!(library.list("alice").unwrap().is_empty());
}

#[test]
fn store_rejects_web_book_records() {
    let (_library, store, _tmp) = fresh_library();
    let backend = BackendCsv::new(store.clone());
    let record = LibraryBook {
        book_id: BookId::for_web("https://a.org/moby.txt"),
        source: "web".into(),
        title: "Moby".into(),
        authors: "Unknown".into(),
        progress_percent: 0.0,
        last_read_sector: 0,
        saved_at: 0,
    };

    let err = backend.upsert("alice", record).unwrap_err();
    assert!(matches!(err, ReaderError::NotBookmarkable(_)));
    assert!(!store.exists("alice.csv"));
}

#[test]
fn similar_paths_get_separate_records() {
    let (library, _store, _tmp) = fresh_library();
    let dotted = manybooks_result("/books/a.b", "Dotted");
    let underscored = manybooks_result("/books/a_b", "Underscored");

    library.add_book_to_library("alice", &dotted).unwrap();
    library.add_book_to_library("alice", &underscored).unwrap();

    let titles: Vec<_> = library
        .list("alice")
        .unwrap()
        .into_iter()
        .map(|b| b.title)
        .collect();
    assert_eq!(titles, vec!["Dotted", "Underscored"]);
}

#[test]
fn adding_twice_keeps_progress() {
    let (library, _store, _tmp) = fresh_library();
    let book = wikisource_result(42, "The Raven");
    let id = generate_book_id(&book);

    library.add_book_to_library("alice", &book).unwrap();
    library
        .update_book_progress(
            "alice",
            &id,
            ProgressUpdate {
                progress_percent: 40.0,
                last_read_sector: 3,
            },
        )
        .unwrap();
    library.add_book_to_library("alice", &book).unwrap();

    let books = library.list("alice").unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].last_read_sector, 3);
    assert_eq!(books[0].progress_percent, 40.0);
}

#[test]
fn libraries_are_per_user() {
    let (library, _store, _tmp) = fresh_library();
    let book = gutendex_result("2701", "Moby Dick");

    library.add_book_to_library("alice", &book).unwrap();
    assert!(library.list("bob").unwrap().is_empty());
    assert_eq!(library.list("alice").unwrap().len(), 1);
}

#[test]
fn progress_for_unsaved_book_is_ignored() {
    let (library, store, _tmp) = fresh_library();
    let updated = library
        .update_book_progress(
            "alice",
            &BookId::from("gutendex_1"),
            ProgressUpdate {
                progress_percent: 10.0,
                last_read_sector: 1,
            },
        )
        .unwrap();
    assert!(!updated);
    assert!(!store.exists("alice.csv"));
}

#[test]
fn library_survives_reload() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().to_str().unwrap().to_string();
    let book = gutendex_result("2701", "Moby, Dick; \"or\" the Whale");

    {
        let store = Arc::new(storage::BackendLocal::new(&path).unwrap());
        let library = Library::new(Arc::new(BackendCsv::new(store)));
        library.add_book_to_library("alice", &book).unwrap();
    }

    let store = Arc::new(storage::BackendLocal::new(&path).unwrap());
    let library = Library::new(Arc::new(BackendCsv::new(store)));
    let books = library.list("alice").unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].title, "Moby, Dick; \"or\" the Whale");
}

#[test]
fn invalid_user_is_rejected() {
    let (library, _store, _tmp) = fresh_library();
    let err = library.list("../../etc").unwrap_err();
    assert!(matches!(err, ReaderError::InvalidInput(_)));
}
