// src/ingest/mod.rs
pub mod feed;
pub mod http;
pub mod poll;
pub mod types;
pub mod validator;

use once_cell::sync::Lazy;
use regex::Regex;

/// Normalize a feed title: `normalize_body`, then strip trailing punctuation and cap at 1500 chars.
pub fn normalize_text(s: &str) -> String {
    let mut out = normalize_body(s);

    // Strip trailing sentence punctuation (keep quotes)
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Normalize descriptive text: decode entities, strip tags, collapse whitespace.
/// No length cap; descriptions can stand in for the article body.
pub fn normalize_body(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = RE_TAGS.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
    out = RE_WS.replace_all(&out, " ").trim().to_string();

    // 5) Drop whitespace left before punctuation by tag stripping
    static RE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r" ([.,;:!?])").expect("punct regex"));
    RE_PUNCT.replace_all(&out, "$1").to_string()
}

/// First `max_sentences` sentences of `text`, capped at `max_chars`.
pub fn lead_sentences(text: &str, max_sentences: usize, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut end = flat.len();
    let mut seen = 0;
    for (i, c) in flat.char_indices() {
        if matches!(c, '.' | '!' | '?') && flat[i + 1..].starts_with(' ') {
            seen += 1;
            if seen == max_sentences {
                end = i + 1;
                break;
            }
        }
    }
    let lead = &flat[..end];
    if lead.chars().count() <= max_chars {
        return lead.to_string();
    }
    let cut: String = lead.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}
