//! HTML to readable text.
//!
//! Boilerplate nodes are detached from the tree first, then a content
//! container is chosen from a per-site [`HtmlStrategy`], and block-level
//! elements inside it become paragraphs joined by a blank line, the
//! delimiter the segmenter splits on.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::errors::{ReaderError, ReaderResult};

/// Below this many characters of block text, fall back to raw text.
pub const MIN_TEXT_CHARS: usize = 100;

pub const PARAGRAPH_DELIMITER: &str = "\n\n";

const NON_CONTENT: &str = "script, style, nav, header, footer, form, iframe, noscript";

const BLOCK_TAGS: [&str; 10] = [
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "li", "pre",
];

static NON_CONTENT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(NON_CONTENT).expect("Failed to compile non-content selector"));

static BLOCK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(&BLOCK_TAGS.join(", ")).expect("Failed to compile block selector")
});

static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("Failed to compile body selector"));

static BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("Failed to compile blank line regex"));

/// Where one site keeps its prose and what else to throw away.
#[derive(Debug, Clone, Copy)]
pub struct HtmlStrategy {
    pub name: &'static str,
    /// Tried in order; the first match is the content container.
    pub content_selectors: &'static [&'static str],
    /// Removed in addition to the shared non-content set.
    pub extra_removals: &'static [&'static str],
}

pub const GENERIC: HtmlStrategy = HtmlStrategy {
    name: "generic",
    content_selectors: &["main", "article", "#content", ".content"],
    extra_removals: &[],
};

pub const GUTENBERG: HtmlStrategy = HtmlStrategy {
    name: "gutenberg",
    content_selectors: &["main", "#pg-content", "body"],
    extra_removals: &["#pg-header", "#pg-footer", "section.pg-boilerplate", ".pg-boilerplate"],
};

pub const STANDARD_EBOOKS: HtmlStrategy = HtmlStrategy {
    name: "standard-ebooks",
    content_selectors: &["section.main", "main", "article"],
    extra_removals: &["#colophon", "#imprint", "#uncopyright"],
};

pub const WIKISOURCE: HtmlStrategy = HtmlStrategy {
    name: "wikisource",
    content_selectors: &[".mw-parser-output", "#mw-content-text"],
    extra_removals: &[
        ".mw-editsection",
        ".ws-noexport",
        ".reference",
        ".references",
        "#headertemplate",
        ".ws-header",
        "sup",
    ],
};

/// Extract readable text from an HTML document.
///
/// Fails with `ContentExtraction` when nothing readable remains, so an
/// empty book and a failed scrape stay distinguishable.
pub fn extract_text(html: &str, strategy: &HtmlStrategy) -> ReaderResult<String> {
    let mut document = Html::parse_document(html);
    strip_non_content(&mut document, strategy);

    let container = find_container(&document, strategy).ok_or_else(|| {
        ReaderError::extraction(format!("{}: no content container", strategy.name))
    })?;

    let mut chunks = collect_blocks(container);
    let block_chars: usize = chunks.iter().map(|c| c.chars().count()).sum();

    if block_chars < MIN_TEXT_CHARS {
        log::debug!(
            "strategy={} block text too short ({block_chars} chars), using raw text",
            strategy.name
        );
        chunks = split_paragraphs(&container.text().collect::<String>());
    }

    if chunks.is_empty() {
        return Err(ReaderError::extraction(format!(
            "{}: no readable text found",
            strategy.name
        )));
    }

    Ok(chunks.join(PARAGRAPH_DELIMITER))
}

/// Detach non-content nodes. Must run before the container is chosen.
fn strip_non_content(document: &mut Html, strategy: &HtmlStrategy) {
    let mut selectors = vec![NON_CONTENT_SELECTOR.clone()];
    for raw in strategy.extra_removals {
        match Selector::parse(raw) {
            Ok(sel) => selectors.push(sel),
            Err(e) => log::warn!(
                "strategy={} invalid removal selector {raw}: {e:?}",
                strategy.name
            ),
        }
    }

    let ids: Vec<_> = selectors
        .iter()
        .flat_map(|sel| document.select(sel).map(|el| el.id()).collect::<Vec<_>>())
        .collect();

    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn find_container<'a>(document: &'a Html, strategy: &HtmlStrategy) -> Option<ElementRef<'a>> {
    for raw in strategy.content_selectors {
        let Ok(sel) = Selector::parse(raw) else {
            log::warn!("strategy={} invalid content selector {raw}", strategy.name);
            continue;
        };
        if let Some(el) = document.select(&sel).next() {
            log::debug!("strategy={} container={raw}", strategy.name);
            return Some(el);
        }
    }

    document.select(&BODY_SELECTOR).next()
}

/// Text of each outermost block element, in document order.
fn collect_blocks(container: ElementRef) -> Vec<String> {
    container
        .select(&BLOCK_SELECTOR)
        .filter(|el| !has_block_ancestor(*el, container))
        .filter_map(|el| {
            let raw = el.text().collect::<String>();
            let text = if el.value().name() == "pre" {
                raw.trim().to_string()
            } else {
                collapse_whitespace(&raw)
            };
            (!text.is_empty()).then_some(text)
        })
        .collect()
}

fn has_block_ancestor(el: ElementRef, container: ElementRef) -> bool {
    el.ancestors()
        .take_while(|node| node.id() != container.id())
        .filter_map(ElementRef::wrap)
        .any(|a| BLOCK_TAGS.contains(&a.value().name()))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split on blank lines, trimming and dropping empty chunks.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    BLANK_LINES
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unify line endings to `\n`.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Cut a Project Gutenberg text down to the work itself when both the
/// start and end licence markers are present.
pub fn strip_gutenberg_boilerplate(text: &str) -> String {
    let start = text.find("*** START OF");
    let end = text.find("*** END OF");

    match (start, end) {
        (Some(start), Some(end)) if start < end => match gutenberg_body_start(text, start, end) {
            Some(body_start) => text[body_start..end].trim().to_string(),
            None => text.to_string(),
        },
        _ => text.to_string(),
    }
}

/// First byte after the START marker: the next line, or right after the
/// marker's closing `***` when the END marker shares its line.
fn gutenberg_body_start(text: &str, start: usize, end: usize) -> Option<usize> {
    let next_line = text[start..].find('\n').map(|i| start + i + 1);
    if let Some(line) = next_line.filter(|line| *line <= end) {
        return Some(line);
    }

    let opener = "*** START OF".len();
    text[start + opener..end]
        .find("***")
        .map(|i| start + opener + i + "***".len())
}
