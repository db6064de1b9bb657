//! Reading position: resume policy and debounced persistence.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::errors::{ReaderError, ReaderResult};
use crate::library::{BookId, Library};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub progress_percent: f64,
    pub last_read_sector: usize,
}

impl ProgressUpdate {
    /// Position after reading up to and including `active`.
    pub fn at_sector(active: usize, sector_count: usize) -> Option<Self> {
        if sector_count == 0 {
            return None;
        }
        let active = active.min(sector_count - 1);
        Some(Self {
            progress_percent: (active + 1) as f64 * 100.0 / sector_count as f64,
            last_read_sector: active,
        })
    }

    pub fn validated(self) -> ReaderResult<Self> {
        if !self.progress_percent.is_finite() {
            return Err(ReaderError::InvalidInput(format!(
                "progress percent must be a number, got {}",
                self.progress_percent
            )));
        }
        Ok(Self {
            progress_percent: self.progress_percent.clamp(0.0, 100.0),
            ..self
        })
    }
}

/// Sector to open a book at. A saved position past the end, e.g. after the
/// content changed and was re-segmented shorter, is clamped to the last
/// sector.
pub fn resume_sector(saved: Option<usize>, sector_count: usize) -> usize {
    match (saved, sector_count) {
        (_, 0) | (None, _) => 0,
        (Some(sector), count) => sector.min(count - 1),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PendingKey {
    user: String,
    book_id: BookId,
}

enum Command {
    Schedule {
        key: PendingKey,
        update: ProgressUpdate,
    },
    Cancel(PendingKey),
    Flush(mpsc::Sender<()>),
    Shutdown,
}

/// Debounces progress writes on a worker thread. A new position for a book
/// replaces any write for it that has not fired yet, so a stale position
/// never lands after a fresher one.
pub struct ProgressTracker {
    tx: mpsc::Sender<Command>,
    worker: Option<JoinHandle<()>>,
    errors: Arc<Mutex<Vec<ReaderError>>>,
}

impl ProgressTracker {
    pub fn new(library: Library, debounce: Duration) -> ReaderResult<Self> {
        let (tx, rx) = mpsc::channel();
        let errors = Arc::new(Mutex::new(Vec::new()));

        let worker = {
            let errors = errors.clone();
            std::thread::Builder::new()
                .name("progress".into())
                .spawn(move || run_worker(rx, library, debounce, errors))?
        };

        Ok(Self {
            tx,
            worker: Some(worker),
            errors,
        })
    }

    pub fn schedule(&self, user: &str, book_id: &BookId, update: ProgressUpdate) {
        let key = PendingKey {
            user: user.to_string(),
            book_id: book_id.clone(),
        };
        if self.tx.send(Command::Schedule { key, update }).is_err() {
            log::warn!("progress worker gone, dropping update for {book_id}");
        }
    }

    pub fn cancel(&self, user: &str, book_id: &BookId) {
        let key = PendingKey {
            user: user.to_string(),
            book_id: book_id.clone(),
        };
        let _ = self.tx.send(Command::Cancel(key));
    }

    /// Write everything pending now and wait for it.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.tx.send(Command::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Failed writes since the last call.
    pub fn drain_errors(&self) -> Vec<ReaderError> {
        match self.errors.lock() {
            Ok(mut errors) => std::mem::take(&mut *errors),
            Err(_) => Vec::new(),
        }
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(
    rx: mpsc::Receiver<Command>,
    library: Library,
    debounce: Duration,
    errors: Arc<Mutex<Vec<ReaderError>>>,
) {
    let mut pending: HashMap<PendingKey, (Instant, ProgressUpdate)> = HashMap::new();

    let write = |key: PendingKey, update: ProgressUpdate| {
        if let Err(err) = library.update_book_progress(&key.user, &key.book_id, update) {
            let err = ReaderError::ProgressSync {
                book_id: key.book_id.to_string(),
                reason: err.to_string(),
            };
            log::warn!("user={} {err}", key.user);
            if let Ok(mut errors) = errors.lock() {
                errors.push(err);
            }
        } else {
            log::debug!(
                "user={} book={} progress saved sector={}",
                key.user,
                key.book_id,
                update.last_read_sector
            );
        }
    };

    loop {
        let next_deadline = pending.values().map(|(deadline, _)| *deadline).min();

        let command = match next_deadline {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => Some(Command::Shutdown),
                }
            }
            None => match rx.recv() {
                Ok(command) => Some(command),
                Err(_) => Some(Command::Shutdown),
            },
        };

        match command {
            None => {
                let now = Instant::now();
                let due: Vec<PendingKey> = pending
                    .iter()
                    .filter(|(_, (deadline, _))| *deadline <= now)
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in due {
                    if let Some((_, update)) = pending.remove(&key) {
                        write(key, update);
                    }
                }
            }
            Some(Command::Schedule { key, update }) => {
                pending.insert(key, (Instant::now() + debounce, update));
            }
            Some(Command::Cancel(key)) => {
                pending.remove(&key);
            }
            Some(Command::Flush(ack)) => {
                for (key, (_, update)) in pending.drain() {
                    write(key, update);
                }
                let _ = ack.send(());
            }
            Some(Command::Shutdown) => {
                for (key, (_, update)) in pending.drain() {
                    write(key, update);
                }
                break;
            }
        }
    }
}
