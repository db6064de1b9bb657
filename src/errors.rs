#[derive(thiserror::Error, Debug)]
pub enum ReaderError {
    #[error("fetch failed for {url}: {reason}")]
    AdapterFetch { url: String, reason: String },

    #[error("content extraction failed: {0}")]
    ContentExtraction(String),

    #[error("unsupported format for in-app reading: {mime}")]
    UnsupportedFormat { mime: String },

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("{adapter} adapter cannot handle a {got} result")]
    SourceMismatch { adapter: &'static str, got: String },

    #[error("progress sync failed for {book_id}: {reason}")]
    ProgressSync { book_id: String, reason: String },

    #[error("{0} is not a persistent book and cannot be saved to the library")]
    NotBookmarkable(String),

    #[error("url blocked by policy: {0}")]
    BlockedUrl(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("json error: {0:?}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0:?}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl ReaderError {
    pub fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AdapterFetch {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::ContentExtraction(message.into())
    }

    /// Errors a reader UI shows as "wrong format" rather than "nothing found".
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, Self::UnsupportedFormat { .. })
    }
}

pub type ReaderResult<T> = Result<T, ReaderError>;
