use serde::Deserialize;
use std::sync::Arc;

use crate::errors::{ReaderError, ReaderResult};
use crate::extract;
use crate::scrape::HttpFetch;
use crate::sources::{
    degrade_search, encode, mismatch, RawContent, SearchResult, SourceAdapter, SourceKind,
};

const API_URL: &str = "https://en.wikisource.org/w/api.php";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    search: Option<Vec<SearchItem>>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    pageid: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parse: Option<ParsedPage>,
}

#[derive(Debug, Deserialize)]
struct ParsedPage {
    text: String,
}

pub fn search_url(query: &str) -> String {
    format!(
        "{API_URL}?action=query&list=search&srsearch={}&format=json",
        encode(query)
    )
}

pub fn parse_url(pageid: u64) -> String {
    format!("{API_URL}?action=parse&pageid={pageid}&prop=text&format=json&formatversion=2")
}

pub struct WikisourceSource {
    http: Arc<dyn HttpFetch>,
}

impl WikisourceSource {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self { http }
    }

    fn try_search(&self, query: &str) -> ReaderResult<Vec<SearchResult>> {
        let data: SearchResponse = self.http.get_ok(&search_url(query.trim()))?.json()?;

        let Some(items) = data.query.and_then(|q| q.search) else {
            log::warn!("source=wikisource invalid search response");
            return Ok(Vec::new());
        };

        Ok(items
            .into_iter()
            .map(|item| SearchResult::Wikisource {
                id: item.pageid.to_string(),
                title: item.title,
                // the search API carries no author data
                authors: "Unknown".to_string(),
                pageid: item.pageid,
            })
            .collect())
    }
}

impl SourceAdapter for WikisourceSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Wikisource
    }

    fn search(&self, query: &str) -> ReaderResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        degrade_search(self.kind(), self.try_search(query))
    }

    fn fetch_content(&self, result: &SearchResult) -> ReaderResult<RawContent> {
        let SearchResult::Wikisource { pageid, .. } = result else {
            return Err(mismatch(self.kind(), result));
        };

        let data: ParseResponse = self.http.get_ok(&parse_url(*pageid))?.json()?;
        let page = data.parse.ok_or_else(|| {
            ReaderError::extraction(format!("wikisource returned no page for pageid {pageid}"))
        })?;

        Ok(RawContent::Text(extract::extract_text(
            &page.text,
            &extract::WIKISOURCE,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_html_drops_edit_links_and_header() {
        let html = r#"<div class="mw-parser-output">
            <div id="headertemplate">The Raven (1845) by Edgar Allan Poe</div>
            <h2>The Raven<span class="mw-editsection">[edit]</span></h2>
            <p>Once upon a midnight dreary, while I pondered, weak and weary,<br>
            Over many a quaint and curious volume of forgotten lore.<sup class="reference">[1]</sup></p>
        </div>"#;

        let text = extract::extract_text(html, &extract::WIKISOURCE).unwrap();
        assert_eq!(
            text,
            "The Raven\n\nOnce upon a midnight dreary, while I pondered, weak and weary, Over many a quaint and curious volume of forgotten lore."
        );
    }

    #[test]
    fn test_search_url_encodes_query() {
        assert_eq!(
            search_url("the raven"),
            "https://en.wikisource.org/w/api.php?action=query&list=search&srsearch=the+raven&format=json"
        );
    }
}
