use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::sync::Arc;

use crate::errors::{ReaderError, ReaderResult};
use crate::extract;
use crate::scrape::HttpFetch;
use crate::sources::{
    degrade_search, encode, mismatch, RawContent, SearchResult, SourceAdapter, SourceKind,
};

const BASE_URL: &str = "https://manybooks.net";
const EPUB_MIME: &str = "application/epub+zip";

static TEASER_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("article.book-teaser").expect("Failed to compile teaser selector")
});
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a").expect("Failed to compile link selector"));
static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("Failed to compile img selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2 a").expect("Failed to compile title selector"));
static AUTHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.text-sm > span > a").expect("Failed to compile author selector")
});
static DOWNLOAD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.dropdown-item").expect("Failed to compile download selector"));

fn resolve(base: &str, href: &str) -> Option<String> {
    url::Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .ok()
}

pub fn book_page_url(path: &str) -> String {
    if path.starts_with('/') {
        format!("{BASE_URL}{path}")
    } else {
        format!("{BASE_URL}/{path}")
    }
}

/// Parse the search results page.
pub fn parse_search_page(html: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);

    document
        .select(&TEASER_SELECTOR)
        .filter_map(|el| {
            let path = el
                .select(&LINK_SELECTOR)
                .next()
                .and_then(|a| a.attr("href"))
                .map(str::trim)
                .filter(|p| !p.is_empty())?;

            let text_of = |sel: &Selector, default: &str| {
                el.select(sel)
                    .next()
                    .map(|n| n.text().collect::<String>().trim().to_string())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| default.to_string())
            };

            Some(SearchResult::Manybooks {
                id: path.to_string(),
                title: text_of(&*TITLE_SELECTOR, "Untitled"),
                authors: text_of(&*AUTHOR_SELECTOR, "Unknown"),
                cover_path: el
                    .select(&IMG_SELECTOR)
                    .next()
                    .and_then(|img| img.attr("src"))
                    .and_then(|src| resolve(BASE_URL, src)),
            })
        })
        .collect()
}

/// Download links on a book page.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DownloadLinks {
    pub plain_text: Option<String>,
    pub epub: Option<String>,
}

pub fn parse_download_links(html: &str, page_url: &str) -> DownloadLinks {
    let document = Html::parse_document(html);
    let mut links = DownloadLinks::default();

    for a in document.select(&DOWNLOAD_SELECTOR) {
        let label = a.text().collect::<String>();
        let Some(href) = a.attr("href").and_then(|h| resolve(page_url, h)) else {
            continue;
        };
        match label.trim() {
            "Plain Text" if links.plain_text.is_none() => links.plain_text = Some(href),
            "EPUB" if links.epub.is_none() => links.epub = Some(href),
            _ => {}
        }
    }

    links
}

pub struct ManybooksSource {
    http: Arc<dyn HttpFetch>,
}

impl ManybooksSource {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self { http }
    }

    fn try_search(&self, query: &str) -> ReaderResult<Vec<SearchResult>> {
        let url = format!("{BASE_URL}/search-book?search={}", encode(query.trim()));
        let html = self.http.get_ok(&url)?.text();
        Ok(parse_search_page(&html))
    }
}

impl SourceAdapter for ManybooksSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Manybooks
    }

    fn search(&self, query: &str) -> ReaderResult<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        degrade_search(self.kind(), self.try_search(query))
    }

    fn fetch_content(&self, result: &SearchResult) -> ReaderResult<RawContent> {
        let SearchResult::Manybooks { id, .. } = result else {
            return Err(mismatch(self.kind(), result));
        };

        let page_url = book_page_url(id);
        let page = self.http.get_ok(&page_url)?.text();

        match parse_download_links(&page, &page_url) {
            DownloadLinks {
                plain_text: Some(url),
                ..
            } => {
                let text = self.http.get_ok(&url)?.text();
                Ok(RawContent::Text(extract::normalize_newlines(&text)))
            }
            DownloadLinks { epub: Some(url), .. } => {
                let resp = self.http.get_ok(&url)?;
                Ok(RawContent::Binary {
                    mime: EPUB_MIME.to_string(),
                    bytes: resp.body,
                })
            }
            DownloadLinks { .. } => Err(ReaderError::extraction(
                "could not find a readable download format (Plain Text) for this book on ManyBooks",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_page() {
        let html = r#"<html><body>
            <article class="book-teaser">
                <a href="/books/stoker-bram/dracula"><img src="/covers/dracula.jpg"></a>
                <h2><a href="/books/stoker-bram/dracula"> Dracula </a></h2>
                <div class="text-sm"><span><a href="/authors/stoker">Bram Stoker</a></span></div>
            </article>
            <article class="book-teaser">
                <h2>No link at all</h2>
            </article>
        </body></html>"#;

        let results = parse_search_page(html);
        assert_eq!(
            results,
            vec![SearchResult::Manybooks {
                id: "/books/stoker-bram/dracula".into(),
                title: "Dracula".into(),
                authors: "Bram Stoker".into(),
                cover_path: Some("https://manybooks.net/covers/dracula.jpg".into()),
            }]
        );
    }

    #[test]
    fn test_parse_download_links_resolves_relative() {
        let html = r#"<div class="dropdown-menu">
            <a class="dropdown-item" href="/download/dracula.epub">EPUB</a>
            <a class="dropdown-item" href="download/dracula.txt"> Plain Text </a>
        </div>"#;
        let links = parse_download_links(html, "https://manybooks.net/books/stoker-bram/dracula");
        assert_eq!(
            links,
            DownloadLinks {
                plain_text: Some("https://manybooks.net/books/stoker-bram/download/dracula.txt".into()),
                epub: Some("https://manybooks.net/download/dracula.epub".into()),
            }
        );
    }

    #[test]
    fn test_book_page_url() {
        assert_eq!(book_page_url("/books/a/b"), "https://manybooks.net/books/a/b");
        assert_eq!(book_page_url("books/a/b"), "https://manybooks.net/books/a/b");
    }
}
