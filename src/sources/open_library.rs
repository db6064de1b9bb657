use serde::Deserialize;
use std::sync::Arc;

use crate::errors::ReaderResult;
use crate::extract;
use crate::scrape::HttpFetch;
use crate::sources::{
    degrade_search, encode, mismatch, RawContent, SearchResult, SourceAdapter, SourceKind,
};

const SEARCH_URL: &str = "https://openlibrary.org/search.json";
const SEARCH_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
struct OpenLibraryResponse {
    #[serde(default)]
    docs: Vec<OpenLibraryDoc>,
}

#[derive(Debug, Deserialize)]
struct OpenLibraryDoc {
    key: String,
    title: String,
    #[serde(default)]
    author_name: Vec<String>,
    cover_i: Option<i64>,
    #[serde(default)]
    edition_key: Vec<String>,
    #[serde(default)]
    ia: Vec<String>,
}

fn map_doc(doc: OpenLibraryDoc) -> Option<SearchResult> {
    let edition = doc.edition_key.into_iter().next()?;
    let authors = if doc.author_name.is_empty() {
        "Unknown".to_string()
    } else {
        doc.author_name.join(", ")
    };

    Some(SearchResult::OpenLibrary {
        id: doc.key,
        title: doc.title,
        authors,
        edition,
        cover: doc
            .cover_i
            .map(|cover| format!("https://covers.openlibrary.org/b/id/{cover}-L.jpg")),
        ia: doc.ia.into_iter().next(),
    })
}

/// The full-text URL: the Internet Archive scan when there is one,
/// otherwise the edition's text export.
pub fn content_url(edition: &str, ia: Option<&str>) -> String {
    match ia {
        Some(ia) => format!("https://archive.org/download/{ia}/{ia}_djvu.txt"),
        None => format!("https://openlibrary.org/books/{edition}.txt"),
    }
}

pub struct OpenLibrarySource {
    http: Arc<dyn HttpFetch>,
}

impl OpenLibrarySource {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self { http }
    }

    fn try_search(&self, query: &str) -> ReaderResult<Vec<SearchResult>> {
        let url = format!(
            "{SEARCH_URL}?q={}&limit={SEARCH_LIMIT}&has_fulltext=true",
            encode(query.trim())
        );
        let data: OpenLibraryResponse = self.http.get_ok(&url)?.json()?;

        Ok(data.docs.into_iter().filter_map(map_doc).collect())
    }
}

impl SourceAdapter for OpenLibrarySource {
    fn kind(&self) -> SourceKind {
        SourceKind::OpenLibrary
    }

    fn search(&self, query: &str) -> ReaderResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        degrade_search(self.kind(), self.try_search(query))
    }

    fn fetch_content(&self, result: &SearchResult) -> ReaderResult<RawContent> {
        let SearchResult::OpenLibrary { edition, ia, .. } = result else {
            return Err(mismatch(self.kind(), result));
        };

        let url = content_url(edition, ia.as_deref());
        let text = self.http.get_ok(&url)?.text();
        Ok(RawContent::Text(extract::normalize_newlines(&text)))
    }
}
