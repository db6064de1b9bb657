pub mod gutendex;
pub mod manager;
pub mod manybooks;
pub mod open_library;
pub mod standard_ebooks;
pub mod wikisource;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::errors::{ReaderError, ReaderResult};

pub use manager::SourceManager;

/// The repositories a search can fan out to, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "gutendex")]
    Gutendex,
    #[serde(rename = "openLibrary")]
    OpenLibrary,
    #[serde(rename = "standardEbooks")]
    StandardEbooks,
    #[serde(rename = "wikisource")]
    Wikisource,
    #[serde(rename = "manybooks")]
    Manybooks,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Gutendex,
        SourceKind::OpenLibrary,
        SourceKind::StandardEbooks,
        SourceKind::Wikisource,
        SourceKind::Manybooks,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            SourceKind::Gutendex => "gutendex",
            SourceKind::OpenLibrary => "openLibrary",
            SourceKind::StandardEbooks => "standardEbooks",
            SourceKind::Wikisource => "wikisource",
            SourceKind::Manybooks => "manybooks",
        }
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for SourceKind {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|k| k.tag().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ReaderError::UnknownSource(s.to_string()))
    }
}

/// One book as found by one source. Each variant carries what its
/// adapter needs to fetch the content without searching again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source")]
pub enum SearchResult {
    #[serde(rename = "gutendex")]
    Gutendex {
        id: String,
        title: String,
        authors: String,
        /// MIME type to download URL
        formats: BTreeMap<String, String>,
    },
    #[serde(rename = "openLibrary", rename_all = "camelCase")]
    OpenLibrary {
        id: String,
        title: String,
        authors: String,
        edition: String,
        cover: Option<String>,
        #[serde(default)]
        ia: Option<String>,
    },
    #[serde(rename = "standardEbooks")]
    StandardEbooks {
        id: String,
        title: String,
        authors: String,
        slug: String,
        epub: String,
    },
    #[serde(rename = "wikisource")]
    Wikisource {
        id: String,
        title: String,
        authors: String,
        pageid: u64,
    },
    /// `id` is the book's path on the site, e.g. `/books/stoker-bram/dracula`.
    #[serde(rename = "manybooks", rename_all = "camelCase")]
    Manybooks {
        id: String,
        title: String,
        authors: String,
        cover_path: Option<String>,
    },
}

impl SearchResult {
    pub fn kind(&self) -> SourceKind {
        match self {
            SearchResult::Gutendex { .. } => SourceKind::Gutendex,
            SearchResult::OpenLibrary { .. } => SourceKind::OpenLibrary,
            SearchResult::StandardEbooks { .. } => SourceKind::StandardEbooks,
            SearchResult::Wikisource { .. } => SourceKind::Wikisource,
            SearchResult::Manybooks { .. } => SourceKind::Manybooks,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SearchResult::Gutendex { id, .. }
            | SearchResult::OpenLibrary { id, .. }
            | SearchResult::StandardEbooks { id, .. }
            | SearchResult::Wikisource { id, .. }
            | SearchResult::Manybooks { id, .. } => id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            SearchResult::Gutendex { title, .. }
            | SearchResult::OpenLibrary { title, .. }
            | SearchResult::StandardEbooks { title, .. }
            | SearchResult::Wikisource { title, .. }
            | SearchResult::Manybooks { title, .. } => title,
        }
    }

    pub fn authors(&self) -> &str {
        match self {
            SearchResult::Gutendex { authors, .. }
            | SearchResult::OpenLibrary { authors, .. }
            | SearchResult::StandardEbooks { authors, .. }
            | SearchResult::Wikisource { authors, .. }
            | SearchResult::Manybooks { authors, .. } => authors,
        }
    }
}

/// What a content fetch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawContent {
    Text(String),
    /// A format the reader cannot display, e.g. an epub archive.
    Binary { mime: String, bytes: Vec<u8> },
}

impl RawContent {
    /// The readable text, or `UnsupportedFormat` for binary content.
    pub fn into_text(self) -> ReaderResult<String> {
        match self {
            RawContent::Text(text) => Ok(text),
            RawContent::Binary { mime, .. } => Err(ReaderError::UnsupportedFormat { mime }),
        }
    }
}

/// One external book repository.
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Network and parse failures are logged and yield an empty list;
    /// an `Err` is reserved for misuse.
    fn search(&self, query: &str) -> ReaderResult<Vec<SearchResult>>;

    /// Best available representation of the book behind `result`.
    fn fetch_content(&self, result: &SearchResult) -> ReaderResult<RawContent>;
}

/// Shared adapter-boundary behaviour: log a failed search and degrade to
/// no results.
pub(crate) fn degrade_search(
    kind: SourceKind,
    outcome: ReaderResult<Vec<SearchResult>>,
) -> ReaderResult<Vec<SearchResult>> {
    match outcome {
        Ok(results) => Ok(results),
        Err(err) => {
            log::warn!("source={kind} search failed err={err}");
            Ok(Vec::new())
        }
    }
}

pub(crate) fn mismatch(adapter: SourceKind, got: &SearchResult) -> ReaderError {
    ReaderError::SourceMismatch {
        adapter: adapter.tag(),
        got: got.kind().tag().to_string(),
    }
}

pub(crate) fn encode(query: &str) -> String {
    url::form_urlencoded::byte_serialize(query.as_bytes()).collect()
}
