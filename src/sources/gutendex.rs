use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::{ReaderError, ReaderResult};
use crate::extract;
use crate::scrape::HttpFetch;
use crate::sources::{
    degrade_search, encode, mismatch, RawContent, SearchResult, SourceAdapter, SourceKind,
};

const API_URL: &str = "https://gutendex.com/books";

/// Plain-text MIME keys, most preferred first.
const PLAIN_TEXT_FORMATS: [&str; 3] = [
    "text/plain; charset=utf-8",
    "text/plain; charset=us-ascii",
    "text/plain",
];
const HTML_FORMATS: [&str; 2] = ["text/html; charset=utf-8", "text/html"];
const EPUB_FORMAT: &str = "application/epub+zip";

#[derive(Debug, Deserialize)]
struct GutendexResponse {
    #[serde(default)]
    results: Vec<GutendexBook>,
}

#[derive(Debug, Deserialize)]
struct GutendexBook {
    id: u64,
    title: String,
    #[serde(default)]
    authors: Vec<GutendexAuthor>,
    #[serde(default)]
    formats: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct GutendexAuthor {
    name: String,
}

/// The representation chosen for a Gutendex book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatChoice<'a> {
    PlainText(&'a str),
    Html(&'a str),
    Epub(&'a str),
}

/// Plain text that is not a zip, then HTML, then epub.
pub fn choose_format(formats: &BTreeMap<String, String>) -> Option<FormatChoice<'_>> {
    let not_archive = |url: &&String| !url.to_lowercase().ends_with(".zip");

    PLAIN_TEXT_FORMATS
        .iter()
        .find_map(|key| formats.get(*key).filter(not_archive))
        .map(|url| FormatChoice::PlainText(url))
        .or_else(|| {
            HTML_FORMATS
                .iter()
                .find_map(|key| formats.get(*key).filter(not_archive))
                .map(|url| FormatChoice::Html(url))
        })
        .or_else(|| formats.get(EPUB_FORMAT).map(|url| FormatChoice::Epub(url)))
}

pub struct GutendexSource {
    http: Arc<dyn HttpFetch>,
}

impl GutendexSource {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self { http }
    }

    fn try_search(&self, query: &str) -> ReaderResult<Vec<SearchResult>> {
        // no query lists popular books
        let url = if query.trim().is_empty() {
            API_URL.to_string()
        } else {
            format!("{API_URL}?search={}", encode(query.trim()))
        };

        let data: GutendexResponse = self.http.get_ok(&url)?.json()?;

        Ok(data
            .results
            .into_iter()
            .map(|book| SearchResult::Gutendex {
                id: book.id.to_string(),
                title: book.title,
                authors: book
                    .authors
                    .into_iter()
                    .map(|a| a.name)
                    .collect::<Vec<_>>()
                    .join(", "),
                formats: book.formats,
            })
            .collect())
    }
}

impl SourceAdapter for GutendexSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Gutendex
    }

    fn search(&self, query: &str) -> ReaderResult<Vec<SearchResult>> {
        degrade_search(self.kind(), self.try_search(query))
    }

    fn fetch_content(&self, result: &SearchResult) -> ReaderResult<RawContent> {
        let SearchResult::Gutendex { formats, .. } = result else {
            return Err(mismatch(self.kind(), result));
        };

        match choose_format(formats) {
            Some(FormatChoice::PlainText(url)) => {
                let text = extract::normalize_newlines(&self.http.get_ok(url)?.text());
                Ok(RawContent::Text(extract::strip_gutenberg_boilerplate(&text)))
            }
            Some(FormatChoice::Html(url)) => {
                let html = self.http.get_ok(url)?.text();
                Ok(RawContent::Text(extract::extract_text(&html, &extract::GUTENBERG)?))
            }
            Some(FormatChoice::Epub(url)) => {
                let resp = self.http.get_ok(url)?;
                Ok(RawContent::Binary {
                    mime: EPUB_FORMAT.to_string(),
                    bytes: resp.body,
                })
            }
            None => Err(ReaderError::extraction(
                "no compatible format found for this Gutendex book (txt, html or epub)",
            )),
        }
    }
}
