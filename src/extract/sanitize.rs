//! Sanitizing serializer over the `scraper` parse tree.
//!
//! Walks element children and produces two projections of the same content
//! at once: a restricted HTML fragment and a plain-text rendering.

use scraper::{node::Node, ElementRef};

/// Subtrees dropped entirely (chrome, scripts, embeds, forms).
const DROP_TAGS: &[&str] = &[
    "script", "style", "noscript", "iframe", "object", "embed", "form", "input", "button",
    "select", "textarea", "nav", "header", "footer", "aside", "svg", "canvas", "template",
    "head", "link", "meta", "title",
];

/// Class/id fragments that mark non-article blocks.
const DROP_MARKERS: &[&str] = &[
    "share", "social", "advert", "newsletter", "cookie", "related-", "breadcrumb",
];

/// Tags kept in the HTML projection. Everything else is unwrapped.
const KEEP_TAGS: &[&str] = &[
    "p", "br", "hr", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "blockquote", "pre",
    "code", "em", "strong", "b", "i", "u", "sub", "sup", "table", "thead", "tbody", "tfoot", "tr",
    "th", "td", "caption", "a", "img", "figure", "figcaption",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img"];

/// Elements that start a new line in the text projection.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "li", "h1", "h2", "h3", "h4", "h5", "h6", "tr",
    "br", "hr", "blockquote", "pre", "table", "ul", "ol", "figure", "figcaption", "center",
];

/// Accumulates both projections of a candidate.
#[derive(Debug, Default, Clone)]
pub struct Fragment {
    html: String,
    text: String,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize an element's children (its inner content).
    pub fn push_children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(t) => self.push_text(t),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.push_element(child_el);
                    }
                }
                _ => {}
            }
        }
    }

    /// Serialize an element including its own tag (when kept).
    pub fn push_element(&mut self, el: ElementRef<'_>) {
        if is_dropped(el) {
            return;
        }
        let kept = self.enter(el);
        if !is_void(el) {
            self.push_children(el);
        }
        self.leave(el, kept);
    }

    /// Open an element: line break for blocks, then its tag if kept.
    pub fn enter(&mut self, el: ElementRef<'_>) -> bool {
        if BLOCK_TAGS.contains(&el.value().name()) {
            self.break_line();
        }
        self.open_tag(el)
    }

    /// Close an element previously opened with [`Fragment::enter`].
    pub fn leave(&mut self, el: ElementRef<'_>, kept: bool) {
        let name = el.value().name();
        if kept && !is_void(el) {
            self.close_tag(name);
        }
        if BLOCK_TAGS.contains(&name) {
            self.break_line();
        }
    }

    pub fn push_text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        self.html.push_str(&html_escape::encode_text(raw));
        // Source newlines are layout, not paragraph breaks.
        self.text
            .extend(raw.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
    }

    /// Emit the opening tag of a kept element; returns whether it was kept.
    fn open_tag(&mut self, el: ElementRef<'_>) -> bool {
        let name = el.value().name();
        if !KEEP_TAGS.contains(&name) {
            return false;
        }
        self.html.push('<');
        self.html.push_str(name);
        match name {
            "a" => {
                if let Some(href) = el.value().attr("href").filter(|h| safe_href(h)) {
                    push_attr(&mut self.html, "href", href);
                }
            }
            "img" => {
                let Some(src) = el.value().attr("src").filter(|s| safe_src(s)) else {
                    // Drop the half-open tag: an image without a usable source is noise.
                    self.html.truncate(self.html.len() - 1 - name.len());
                    return false;
                };
                push_attr(&mut self.html, "src", src);
                if let Some(alt) = el.value().attr("alt") {
                    push_attr(&mut self.html, "alt", alt);
                }
            }
            _ => {}
        }
        self.html.push('>');
        true
    }

    fn close_tag(&mut self, name: &str) {
        self.html.push_str("</");
        self.html.push_str(name);
        self.html.push('>');
    }

    fn break_line(&mut self) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
    }

    /// Finish into `(html, text)` with whitespace tidied in the text projection.
    pub fn finish(self) -> (String, String) {
        (self.html.trim().to_string(), tidy_text(&self.text))
    }
}

pub fn is_void(el: ElementRef<'_>) -> bool {
    VOID_TAGS.contains(&el.value().name())
}

/// True if the element (and its subtree) must not appear in the output.
pub fn is_dropped(el: ElementRef<'_>) -> bool {
    let v = el.value();
    if DROP_TAGS.contains(&v.name()) {
        return true;
    }
    let marked = |s: &str| {
        let s = s.to_ascii_lowercase();
        DROP_MARKERS.iter().any(|m| s.contains(m))
    };
    v.classes().any(marked) || v.id().is_some_and(marked)
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&html_escape::encode_double_quoted_attribute(value));
    out.push('"');
}

fn safe_href(href: &str) -> bool {
    let h = href.trim().to_ascii_lowercase();
    if h.is_empty() || h.starts_with('#') {
        return false;
    }
    match h.split_once(':') {
        Some((scheme, _)) if !scheme.contains('/') => {
            matches!(scheme, "http" | "https" | "mailto")
        }
        _ => true,
    }
}

fn safe_src(src: &str) -> bool {
    let s = src.trim().to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with('/')
}

/// Collapse spaces inside lines, drop blank lines, join paragraphs with a blank line.
pub fn tidy_text(raw: &str) -> String {
    raw.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
