use std::sync::Arc;
use std::time::Duration;

use super::fixtures::gutendex_result;
use crate::library::{generate_book_id, BackendCsv, Library, LibraryBook, LibraryStore};
use crate::progress::{ProgressTracker, ProgressUpdate};
use crate::storage;

fn saved_library() -> (Library, crate::library::BookId, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let store = Arc::new(storage::BackendLocal::new(tmp.path().to_str().unwrap()).unwrap());
    let library = Library::new(Arc::new(BackendCsv::new(store)));
    let book = gutendex_result("2701", "Moby Dick");
    library.add_book_to_library("alice", &book).unwrap();
    (library, generate_book_id(&book), tmp)
}

fn saved(library: &Library, id: &crate::library::BookId) -> LibraryBook {
    library.get_library_book("alice", id).unwrap().unwrap()
}

fn at(sector: usize) -> ProgressUpdate {
    ProgressUpdate::at_sector(sector, 10).unwrap()
}

#[test]
fn rapid_changes_write_only_latest_position() {
    let (library, id, _tmp) = saved_library();
    let tracker = ProgressTracker::new(library.clone(), Duration::from_secs(60)).unwrap();

    tracker.schedule("alice", &id, at(1));
    tracker.schedule("alice", &id, at(2));
    tracker.schedule("alice", &id, at(5));

    // nothing lands before the delay
    assert_eq!(saved(&library, &id).last_read_sector, 0);

    tracker.flush();
    let book = saved(&library, &id);
    assert_eq!(book.last_read_sector, 5);
    assert_eq!(book.progress_percent, 60.0);
}

#[test]
fn write_fires_after_debounce() {
    let (library, id, _tmp) = saved_library();
    let tracker = ProgressTracker::new(library.clone(), Duration::from_millis(20)).unwrap();

    tracker.schedule("alice", &id, at(7));

    let mut written = false;
    for _ in 0..100 {
        std::thread::sleep(Duration::from_millis(10));
        if saved(&library, &id).last_read_sector == 7 {
            written = true;
            break;
        }
    }
    assert!(written, "debounced write never fired");
}

#[test]
fn cancel_drops_pending_write() {
    let (library, id, _tmp) = saved_library();
    let tracker = ProgressTracker::new(library.clone(), Duration::from_secs(60)).unwrap();

    tracker.schedule("alice", &id, at(4));
    tracker.cancel("alice", &id);
    tracker.flush();

    assert_eq!(saved(&library, &id).last_read_sector, 0);
}

#[test]
fn drop_flushes_pending_writes() {
    let (library, id, _tmp) = saved_library();
    {
        let tracker = ProgressTracker::new(library.clone(), Duration::from_secs(60)).unwrap();
        tracker.schedule("alice", &id, at(3));
    }
    assert_eq!(saved(&library, &id).last_read_sector, 3);
}

struct FailingStore;

impl LibraryStore for FailingStore {
    fn list(&self, _user: &str) -> crate::errors::ReaderResult<Vec<LibraryBook>> {
        Ok(vec![])
    }
    fn get(
        &self,
        _user: &str,
        _book_id: &crate::library::BookId,
    ) -> crate::errors::ReaderResult<Option<LibraryBook>> {
        Ok(None)
    }
    fn upsert(&self, _user: &str, _book: LibraryBook) -> crate::errors::ReaderResult<()> {
        Ok(())
    }
    fn remove(
        &self,
        _user: &str,
        _book_id: &crate::library::BookId,
    ) -> crate::errors::ReaderResult<bool> {
        Ok(false)
    }
    fn update_progress(
        &self,
        _user: &str,
        _book_id: &crate::library::BookId,
        _update: &ProgressUpdate,
    ) -> crate::errors::ReaderResult<bool> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
    }
}

#[test]
fn failed_write_is_reported_not_raised() {
    let library = Library::new(Arc::new(FailingStore));
    let tracker = ProgressTracker::new(library, Duration::from_secs(60)).unwrap();
    let id = generate_book_id(&gutendex_result("2701", "Moby Dick"));

    tracker.schedule("alice", &id, at(2));
    tracker.flush();

    let errors = tracker.drain_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        crate::errors::ReaderError::ProgressSync { book_id, .. } if book_id == "gutendex_2701"
    ));
    assert!(tracker.drain_errors().is_empty());
}
