//! Turns book text into fixed-size sectors and a table of contents.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extract;

/// Paragraphs per sector.
pub const SECTOR_SIZE: usize = 4;

/// Books with no detected headings get a landmark this often, once they
/// are longer than this many sectors.
const FALLBACK_TOC_INTERVAL: usize = 10;

static HEADING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^(?i:chapter)\s+\d+",
        r"^CHAPTER\b",
        r"^[IVXLCDM]+\.\s",
        r"^(?i:part)\s+[A-Z]+\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Failed to compile heading pattern"))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
    pub index: usize,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TocEntry {
    pub title: String,
    pub sector_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segmentation {
    pub sectors: Vec<Sector>,
    pub toc: Vec<TocEntry>,
}

impl Segmentation {
    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    /// All paragraphs in reading order.
    #[cfg(test)]
    pub fn paragraphs(&self) -> impl Iterator<Item = &str> {
        self.sectors
            .iter()
            .flat_map(|s| s.paragraphs.iter().map(String::as_str))
    }
}

pub fn is_heading(paragraph: &str) -> bool {
    HEADING_PATTERNS.iter().any(|re| re.is_match(paragraph))
}

fn heading_label(paragraph: &str) -> String {
    paragraph.lines().next().unwrap_or_default().trim().to_string()
}

/// Split `content` into sectors of [`SECTOR_SIZE`] paragraphs and derive
/// the table of contents. Pure: the same input always gives the same output.
pub fn segment(content: &str) -> Segmentation {
    let paragraphs = extract::split_paragraphs(content);

    let mut sectors = Vec::with_capacity(paragraphs.len().div_ceil(SECTOR_SIZE));
    let mut toc = Vec::new();

    for (index, window) in paragraphs.chunks(SECTOR_SIZE).enumerate() {
        if let Some(heading) = window.iter().find(|p| is_heading(p)) {
            toc.push(TocEntry {
                title: heading_label(heading),
                sector_index: index,
            });
        }
        sectors.push(Sector {
            index,
            paragraphs: window.to_vec(),
        });
    }

    if toc.is_empty() && sectors.len() > FALLBACK_TOC_INTERVAL {
        toc = (0..sectors.len())
            .step_by(FALLBACK_TOC_INTERVAL)
            .map(|i| TocEntry {
                title: format!("Sector {}", i + 1),
                sector_index: i,
            })
            .collect();
    }

    Segmentation { sectors, toc }
}
