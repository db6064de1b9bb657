//! Last-resort web search for books no source adapter knows about.
//!
//! The search capability returns raw links; [`classify`] keeps only links
//! that point at a file the reader can deal with.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{ReaderError, ReaderResult};
use crate::extract;
use crate::scrape::HttpFetch;
use crate::sources::encode;

const DDG_LITE_URL: &str = "https://lite.duckduckgo.com/lite/";

pub const UNTITLED: &str = "Untitled";
pub const NO_DESCRIPTION: &str = "No description available.";

static RESULT_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.result-link").expect("Failed to compile result link selector"));
static RESULT_SNIPPET_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".result-snippet").expect("Failed to compile result snippet selector")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Txt,
    Pdf,
    Html,
    Other,
}

impl FileType {
    /// Classify by the suffix of the URL path; query and fragment are ignored.
    pub fn from_url(link: &str) -> Self {
        let path = match url::Url::parse(link) {
            Ok(parsed) => parsed.path().to_lowercase(),
            Err(_) => link
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_lowercase(),
        };

        if path.ends_with(".txt") {
            FileType::Txt
        } else if path.ends_with(".pdf") {
            FileType::Pdf
        } else if path.ends_with(".htm") || path.ends_with(".html") {
            FileType::Html
        } else {
            FileType::Other
        }
    }
}

/// A candidate link as the web search returned it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawWebHit {
    pub title: Option<String>,
    pub link: Option<String>,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebFallbackResult {
    pub title: String,
    pub url: String,
    pub filetype: FileType,
    pub snippet: String,
}

/// Keep readable file links only, at most `limit` of them.
pub fn classify(raw: Vec<RawWebHit>, limit: usize) -> Vec<WebFallbackResult> {
    raw.into_iter()
        .filter_map(|hit| {
            let url = hit.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())?;
            let filetype = FileType::from_url(&url);
            if filetype == FileType::Other {
                return None;
            }

            let non_blank = |s: Option<String>| {
                s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
            };

            Some(WebFallbackResult {
                title: non_blank(hit.title).unwrap_or_else(|| UNTITLED.to_string()),
                url,
                filetype,
                snippet: non_blank(hit.snippet).unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            })
        })
        .take(limit)
        .collect()
}

/// A general web search returning candidate links.
pub trait WebSearch: Send + Sync {
    fn name(&self) -> &'static str;

    fn search(&self, query: &str) -> ReaderResult<Vec<RawWebHit>>;
}

/// Query steered toward direct file links.
pub fn craft_query(query: &str) -> String {
    format!(
        "{} ebook free filetype:txt OR filetype:pdf OR filetype:html",
        query.trim()
    )
}

/// DDG wraps result links as `//duckduckgo.com/l/?uddg=<target>`.
fn unwrap_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    url::Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

/// Links and snippets of the DDG lite results page, paired by position.
pub fn parse_lite_results(html: &str) -> Vec<RawWebHit> {
    let document = Html::parse_document(html);

    let mut snippets = document
        .select(&RESULT_SNIPPET_SELECTOR)
        .map(|s| s.text().collect::<String>().trim().to_string());

    document
        .select(&RESULT_LINK_SELECTOR)
        .map(|a| RawWebHit {
            title: Some(a.text().collect::<String>().trim().to_string()),
            link: a.attr("href").map(unwrap_redirect),
            snippet: snippets.next(),
        })
        .collect()
}

pub struct DdgLiteSearch {
    http: Arc<dyn HttpFetch>,
}

impl DdgLiteSearch {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self { http }
    }
}

impl WebSearch for DdgLiteSearch {
    fn name(&self) -> &'static str {
        "ddg-lite"
    }

    fn search(&self, query: &str) -> ReaderResult<Vec<RawWebHit>> {
        let url = format!("{DDG_LITE_URL}?q={}", encode(query));
        let html = self.http.get_ok(&url)?.text();
        Ok(parse_lite_results(&html))
    }
}

/// The fallback path the source manager invokes.
pub struct WebFallback {
    search: Box<dyn WebSearch>,
    max_results: usize,
}

impl WebFallback {
    pub fn new(search: Box<dyn WebSearch>, max_results: usize) -> Self {
        Self {
            search,
            max_results,
        }
    }

    /// Search failures degrade to no results.
    pub fn find(&self, query: &str) -> Vec<WebFallbackResult> {
        let name = self.search.name();
        match self.search.search(&craft_query(query)) {
            Ok(raw) => {
                let found = raw.len();
                let results = classify(raw, self.max_results);
                log::info!(
                    "fallback={name} outcome=success raw={found} kept={}",
                    results.len()
                );
                results
            }
            Err(err) => {
                log::warn!("fallback={name} outcome=error err={err}");
                Vec::new()
            }
        }
    }
}

/// Loads the text behind a fallback link.
pub struct WebBookFetcher {
    http: Arc<dyn HttpFetch>,
}

impl WebBookFetcher {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self { http }
    }

    /// `txt` is returned as served, `html` goes through the extractor.
    /// PDFs are never fetched here; they have to be opened externally.
    pub fn fetch_content_from_url(&self, url: &str) -> ReaderResult<String> {
        match FileType::from_url(url) {
            FileType::Txt => Ok(self.http.get_ok(url)?.text()),
            FileType::Html => {
                let html = self.http.get_ok(url)?.text();
                let text = extract::extract_text(&html, &extract::GENERIC)?;
                if text.trim().is_empty() {
                    return Err(ReaderError::extraction(format!("no readable text at {url}")));
                }
                Ok(text)
            }
            FileType::Pdf => Err(ReaderError::UnsupportedFormat {
                mime: "application/pdf".to_string(),
            }),
            FileType::Other => Err(ReaderError::UnsupportedFormat {
                mime: "application/octet-stream".to_string(),
            }),
        }
    }
}
