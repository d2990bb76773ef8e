//! Ranked content selectors, most specific first.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use super::sanitize::Fragment;

/// Class, id, attribute and tag selectors in priority order.
pub const CONTENT_SELECTORS: &[&str] = &[
    ".release-body",
    ".press-release",
    ".news-release",
    "#release-body",
    "#news-release",
    ".article-body",
    "#article-body",
    ".article-content",
    ".entry-content",
    ".post-content",
    ".story-body",
    "#content-body",
    "[itemprop=\"articleBody\"]",
    "article",
    "main",
    "#content",
    ".content",
];

pub static COMPILED: Lazy<Vec<(&'static str, Selector)>> = Lazy::new(|| {
    CONTENT_SELECTORS
        .iter()
        .map(|s| (*s, Selector::parse(s).expect("content selector")))
        .collect()
});

/// Inner content of the first element matching the selector at `rank`.
pub fn candidate(doc: &Html, rank: usize) -> Option<(String, String)> {
    let (_, sel) = COMPILED.get(rank)?;
    let el = doc.select(sel).next()?;
    let mut frag = Fragment::new();
    frag.push_children(el);
    Some(frag.finish())
}

/// Confidence base for a selector hit; decays with rank from 0.85 to 0.60.
pub fn base_confidence(rank: usize) -> f32 {
    let n = CONTENT_SELECTORS.len().saturating_sub(1).max(1) as f32;
    0.85 - 0.25 * (rank as f32 / n)
}
