//! Last-resort heuristics when no template or selector produced usable content.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::sanitize::{is_dropped, Fragment};

/// Minimum text length for a "dense" paragraph.
pub const DENSE_PARAGRAPH_CHARS: usize = 100;

// "NEW YORK, Jan. 5, 2025 /PRNewswire/ -- ..." or "CHICAGO — ..."
static DATELINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*[A-Z][A-Za-z.'\-]*(?:\s+[A-Z][A-Za-z.'\-]*){0,3}(?:,\s*[A-Za-z0-9.][A-Za-z0-9. ]{0,30})*\s*(?:\([^)]{1,40}\)\s*)?(?:/[^/]{1,40}/\s*)?(?:--|[-\u{2013}\u{2014}:])\s+\S",
    )
    .expect("dateline regex")
});

static P: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("p selector"));
static DIV: Lazy<Selector> = Lazy::new(|| Selector::parse("div").expect("div selector"));

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn render(el: ElementRef<'_>) -> (String, String) {
    let mut frag = Fragment::new();
    frag.push_children(el);
    frag.finish()
}

fn visible(el: ElementRef<'_>) -> bool {
    !el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(is_dropped)
        && !is_dropped(el)
}

pub fn is_dateline(text: &str) -> bool {
    DATELINE.is_match(text)
}

/// Container of the first dense paragraph that opens with a dateline.
pub fn dateline(doc: &Html) -> Option<(String, String)> {
    let p = doc.select(&P).find(|p| {
        let t = text_of(*p);
        t.trim().chars().count() >= DENSE_PARAGRAPH_CHARS && is_dateline(&t) && visible(*p)
    })?;
    let container = p.parent().and_then(ElementRef::wrap).unwrap_or(p);
    Some(render(container))
}

/// The `<div>` whose direct `<p>` children carry the most text, provided
/// at least one of them is a dense paragraph.
pub fn paragraph_run(doc: &Html) -> Option<(String, String)> {
    let best = doc
        .select(&DIV)
        .filter(|d| visible(*d))
        .filter_map(|d| {
            let lens: Vec<usize> = d
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| c.value().name() == "p")
                .map(|c| text_of(c).trim().chars().count())
                .collect();
            if lens.iter().any(|&n| n >= DENSE_PARAGRAPH_CHARS) {
                Some((lens.iter().sum::<usize>(), d))
            } else {
                None
            }
        })
        // First div in document order wins ties.
        .fold(None::<(usize, ElementRef<'_>)>, |acc, (n, d)| match acc {
            Some((best, _)) if best >= n => acc,
            _ => Some((n, d)),
        })?;
    Some(render(best.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dateline_patterns() {
        assert!(is_dateline(
            "NEW YORK, Jan. 5, 2025 /PRNewswire/ -- Acme Corp today announced"
        ));
        assert!(is_dateline("CHICAGO \u{2014} Acme Corp said on Monday"));
        assert!(is_dateline("SAN DIEGO, Calif. (BUSINESS WIRE) -- Acme"));
        assert!(!is_dateline("the quick brown fox jumps over the lazy dog"));
    }

    #[test]
    fn paragraph_run_prefers_densest_div() {
        let long = "word ".repeat(30);
        let html = format!(
            r#"<div id="a"><p>short</p></div><div id="b"><p>{long}</p><p>{long}</p></div>"#
        );
        let doc = Html::parse_document(&html);
        let (_, text) = paragraph_run(&doc).unwrap();
        assert_eq!(text.matches("word").count(), 60);
    }

    #[test]
    fn paragraph_run_requires_dense_paragraph() {
        let doc = Html::parse_document("<div><p>tiny</p><p>also tiny</p></div>");
        assert!(paragraph_run(&doc).is_none());
    }
}
