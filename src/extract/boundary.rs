//! Structural boundary extraction for known wire-service templates.
//!
//! Content is everything after the start container opens, up to the first
//! end-marker element. With no end marker the cut falls back to the close of
//! the nearest enclosing `<section>`, and failing that to the end of the
//! document. The walk runs over the parse tree, so emitted tags stay balanced.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::sanitize::{is_dropped, is_void, Fragment};

pub struct BoundaryTemplate {
    pub name: &'static str,
    /// Host suffix used to try this template first when a source hint matches.
    pub host: &'static str,
    pub start: Selector,
    pub end: Vec<Selector>,
}

fn template(name: &'static str, host: &'static str, start: &str, end: &[&str]) -> BoundaryTemplate {
    BoundaryTemplate {
        name,
        host,
        start: Selector::parse(start).expect("boundary start selector"),
        end: end
            .iter()
            .map(|s| Selector::parse(s).expect("boundary end selector"))
            .collect(),
    }
}

pub static TEMPLATES: Lazy<Vec<BoundaryTemplate>> = Lazy::new(|| {
    vec![
        template(
            "prnewswire",
            "prnewswire.com",
            "section.release-body div.col-lg-10",
            &[".release-footer", ".prn-share", "#footer"],
        ),
        template(
            "globenewswire",
            "globenewswire.com",
            "#main-body-container",
            &[".main-tags", ".main-contact-container", ".pagination-container"],
        ),
        template(
            "businesswire",
            "businesswire.com",
            "div.bw-release-story",
            &[".bw-release-contact", ".bw-release-companyinfo"],
        ),
    ]
});

/// Templates in trial order: those matching `host_hint` first.
pub fn ordered(host_hint: Option<&str>) -> Vec<&'static BoundaryTemplate> {
    let mut out: Vec<&'static BoundaryTemplate> = TEMPLATES.iter().collect();
    if let Some(host) = host_hint {
        out.sort_by_key(|t| !host.ends_with(t.host));
    }
    out
}

/// Cut the fragment between the template's markers, if its start marker exists.
pub fn cut(doc: &Html, tpl: &BoundaryTemplate) -> Option<(String, String)> {
    let start = doc.select(&tpl.start).next()?;

    let section = start
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "section");

    let mut walk = Walk {
        start,
        end: &tpl.end,
        stop_at: None,
        phase: Phase::Before,
        frag: Fragment::new(),
    };

    // Probe pass: is there an end marker anywhere after the start?
    walk.run(doc.root_element());
    let found_end = walk.phase == Phase::Done;

    let mut walk = Walk {
        start,
        end: &tpl.end,
        stop_at: if found_end { None } else { section },
        phase: Phase::Before,
        frag: Fragment::new(),
    };
    walk.run(doc.root_element());
    Some(walk.frag.finish())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Before,
    Inside,
    Done,
}

struct Walk<'a, 'b> {
    start: ElementRef<'a>,
    end: &'b [Selector],
    /// Element whose close ends the cut when no end marker exists.
    stop_at: Option<ElementRef<'a>>,
    phase: Phase,
    frag: Fragment,
}

impl<'a> Walk<'a, '_> {
    fn run(&mut self, el: ElementRef<'a>) {
        if self.phase == Phase::Done {
            return;
        }

        if el.id() == self.start.id() {
            self.phase = Phase::Inside;
            self.children(el);
        } else if self.phase == Phase::Inside {
            if self.end.iter().any(|s| s.matches(&el)) {
                self.phase = Phase::Done;
                return;
            }
            if is_dropped(el) {
                return;
            }
            let kept = self.frag.enter(el);
            if !is_void(el) {
                self.children(el);
            }
            self.frag.leave(el, kept);
        } else {
            self.children(el);
        }

        if self.phase == Phase::Inside
            && self.stop_at.is_some_and(|s| s.id() == el.id())
        {
            self.phase = Phase::Done;
        }
    }

    fn children(&mut self, el: ElementRef<'a>) {
        for child in el.children() {
            if self.phase == Phase::Done {
                return;
            }
            if let Some(child_el) = ElementRef::wrap(child) {
                self.run(child_el);
            } else if self.phase == Phase::Inside {
                if let Some(text) = child.value().as_text() {
                    self.frag.push_text(text);
                }
            }
        }
    }
}
