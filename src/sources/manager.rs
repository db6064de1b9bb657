use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::config::Config;
use crate::errors::{ReaderError, ReaderResult};
use crate::fallback::{WebFallback, WebFallbackResult};
use crate::scrape::HttpFetch;
use crate::sources::{
    gutendex::GutendexSource, manybooks::ManybooksSource, open_library::OpenLibrarySource,
    standard_ebooks::StandardEbooksSource, wikisource::WikisourceSource, RawContent, SearchResult,
    SourceAdapter, SourceKind,
};

/// How one adapter fared during a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SourceOutcome {
    Success { count: usize },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub source: SourceKind,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
    pub duration_ms: u64,
}

/// `fallback` is only ever populated when `primary` is empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResponse {
    pub primary: Vec<SearchResult>,
    pub fallback: Vec<WebFallbackResult>,
    pub report: Vec<SourceReport>,
}

/// One adapter per source. Dispatch matches on these fields, so a new
/// source does not compile until it has an adapter here.
pub struct Adapters {
    pub gutendex: Box<dyn SourceAdapter>,
    pub open_library: Box<dyn SourceAdapter>,
    pub standard_ebooks: Box<dyn SourceAdapter>,
    pub wikisource: Box<dyn SourceAdapter>,
    pub manybooks: Box<dyn SourceAdapter>,
}

impl Adapters {
    /// The network adapters, all sharing `http`.
    pub fn over(http: Arc<dyn HttpFetch>) -> Self {
        Self {
            gutendex: Box::new(GutendexSource::new(http.clone())),
            open_library: Box::new(OpenLibrarySource::new(http.clone())),
            standard_ebooks: Box::new(StandardEbooksSource::new(http.clone())),
            wikisource: Box::new(WikisourceSource::new(http.clone())),
            manybooks: Box::new(ManybooksSource::new(http)),
        }
    }

    pub fn get(&self, kind: SourceKind) -> &dyn SourceAdapter {
        match kind {
            SourceKind::Gutendex => self.gutendex.as_ref(),
            SourceKind::OpenLibrary => self.open_library.as_ref(),
            SourceKind::StandardEbooks => self.standard_ebooks.as_ref(),
            SourceKind::Wikisource => self.wikisource.as_ref(),
            SourceKind::Manybooks => self.manybooks.as_ref(),
        }
    }

    fn for_result(&self, result: &SearchResult) -> &dyn SourceAdapter {
        match result {
            SearchResult::Gutendex { .. } => self.gutendex.as_ref(),
            SearchResult::OpenLibrary { .. } => self.open_library.as_ref(),
            SearchResult::StandardEbooks { .. } => self.standard_ebooks.as_ref(),
            SearchResult::Wikisource { .. } => self.wikisource.as_ref(),
            SearchResult::Manybooks { .. } => self.manybooks.as_ref(),
        }
    }
}

pub struct SourceManager {
    adapters: Adapters,
    enabled: Vec<SourceKind>,
    fallback: Option<WebFallback>,
}

impl SourceManager {
    pub fn new(
        adapters: Adapters,
        enabled: Vec<SourceKind>,
        fallback: Option<WebFallback>,
    ) -> Self {
        Self {
            adapters,
            enabled,
            fallback,
        }
    }

    /// Every source adapter over `http`, plus the web fallback when enabled.
    pub fn with_defaults(
        config: &Config,
        http: Arc<dyn HttpFetch>,
        fallback: Option<WebFallback>,
    ) -> Self {
        let fallback = if config.fallback.enabled { fallback } else { None };
        Self::new(Adapters::over(http), config.sources.enabled.clone(), fallback)
    }

    /// Fan the query out to the enabled adapters, wait for all of them and
    /// concatenate in declaration order. A failing adapter contributes
    /// nothing. The web fallback runs only when no adapter found anything.
    pub fn search_across_sources(
        &self,
        query: &str,
        enabled: Option<&[SourceKind]>,
    ) -> SearchResponse {
        let enabled = enabled.unwrap_or(&self.enabled);

        let participants: Vec<(SourceKind, &dyn SourceAdapter)> = SourceKind::ALL
            .into_iter()
            .filter(|kind| enabled.contains(kind))
            .map(|kind| (kind, self.adapters.get(kind)))
            .collect();

        let outcomes: Vec<(SourceKind, ReaderResult<Vec<SearchResult>>, u64)> =
            thread::scope(|s| {
                let handles: Vec<_> = participants
                    .iter()
                    .map(|&(kind, adapter)| {
                        let handle = s.spawn(move || {
                            let started = Instant::now();
                            let outcome = adapter.search(query);
                            (outcome, started.elapsed().as_millis() as u64)
                        });
                        (kind, handle)
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|(kind, handle)| match handle.join() {
                        Ok((outcome, elapsed)) => (kind, outcome, elapsed),
                        Err(_) => (
                            kind,
                            Err(ReaderError::fetch(kind.tag(), "search thread panicked")),
                            0,
                        ),
                    })
                    .collect()
            });

        let mut response = SearchResponse::default();

        for (source, outcome, duration_ms) in outcomes {
            let outcome = match outcome {
                Ok(results) => {
                    log::info!(
                        "source={source} outcome=success results={} duration_ms={duration_ms}",
                        results.len()
                    );
                    let count = results.len();
                    response.primary.extend(results);
                    SourceOutcome::Success { count }
                }
                Err(err) => {
                    log::warn!("source={source} outcome=error err={err} duration_ms={duration_ms}");
                    SourceOutcome::Error {
                        message: err.to_string(),
                    }
                }
            };
            response.report.push(SourceReport {
                source,
                outcome,
                duration_ms,
            });
        }

        if response.primary.is_empty() && !query.trim().is_empty() {
            if let Some(fallback) = &self.fallback {
                log::info!("no primary results for query={query:?}, trying web fallback");
                response.fallback = fallback.find(query);
            }
        }

        response
    }

    /// Dispatch on the result's source to the adapter that produced it.
    pub fn fetch_book_content(&self, result: &SearchResult) -> ReaderResult<RawContent> {
        log::info!("source={} fetching content id={}", result.kind(), result.id());
        self.adapters.for_result(result).fetch_content(result)
    }

    /// Content as readable text; binary content is `UnsupportedFormat`.
    pub fn fetch_book_text(&self, result: &SearchResult) -> ReaderResult<String> {
        self.fetch_book_content(result)?.into_text()
    }
}
