use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::sync::Arc;

use crate::errors::ReaderResult;
use crate::extract;
use crate::scrape::HttpFetch;
use crate::sources::{
    degrade_search, encode, mismatch, RawContent, SearchResult, SourceAdapter, SourceKind,
};

const BASE_URL: &str = "https://standardebooks.org";
const EPUB_MIME: &str = "application/epub+zip";

static ENTRY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#ebooks-list > li").expect("Failed to compile entry selector"));
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href^="/ebooks/"]"#).expect("Failed to compile link selector")
});
static AUTHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p.author").expect("Failed to compile author selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p:not(.author)").expect("Failed to compile title selector"));

pub fn epub_url(slug: &str) -> String {
    format!(
        "{BASE_URL}/ebooks/{slug}/downloads/{}.epub",
        slug.replace('/', "_")
    )
}

pub fn single_page_url(slug: &str) -> String {
    format!("{BASE_URL}/ebooks/{slug}/text/single-page")
}

/// Parse the catalogue search page.
pub fn parse_search_page(html: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);

    document
        .select(&ENTRY_SELECTOR)
        .filter_map(|entry| {
            let href = entry.select(&LINK_SELECTOR).next()?.attr("href")?;
            let slug = href.trim_start_matches("/ebooks/").trim_matches('/');
            if slug.is_empty() {
                return None;
            }

            let title = entry
                .select(&TITLE_SELECTOR)
                .map(|p| p.text().collect::<String>().trim().to_string())
                .find(|t| !t.is_empty())?;
            let authors = entry
                .select(&AUTHOR_SELECTOR)
                .next()
                .map(|p| p.text().collect::<String>().trim().to_string())
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| "Unknown".to_string());

            Some(SearchResult::StandardEbooks {
                id: slug.to_string(),
                title,
                authors,
                slug: slug.to_string(),
                epub: epub_url(slug),
            })
        })
        .collect()
}

pub struct StandardEbooksSource {
    http: Arc<dyn HttpFetch>,
}

impl StandardEbooksSource {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self { http }
    }

    fn try_search(&self, query: &str) -> ReaderResult<Vec<SearchResult>> {
        let url = format!("{BASE_URL}/ebooks?query={}", encode(query.trim()));
        let html = self.http.get_ok(&url)?.text();
        Ok(parse_search_page(&html))
    }
}

impl SourceAdapter for StandardEbooksSource {
    fn kind(&self) -> SourceKind {
        SourceKind::StandardEbooks
    }

    fn search(&self, query: &str) -> ReaderResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        degrade_search(self.kind(), self.try_search(query))
    }

    fn fetch_content(&self, result: &SearchResult) -> ReaderResult<RawContent> {
        let SearchResult::StandardEbooks { slug, epub, .. } = result else {
            return Err(mismatch(self.kind(), result));
        };

        match self.http.get_ok(&single_page_url(slug)) {
            Ok(resp) => Ok(RawContent::Text(extract::extract_text(
                &resp.text(),
                &extract::STANDARD_EBOOKS,
            )?)),
            Err(err) => {
                log::warn!(
                    "source=standardEbooks single page unavailable slug={slug} err={err}, trying epub"
                );
                let resp = self.http.get_ok(epub)?;
                Ok(RawContent::Binary {
                    mime: EPUB_MIME.to_string(),
                    bytes: resp.body,
                })
            }
        }
    }
}
