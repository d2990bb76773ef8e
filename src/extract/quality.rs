//! Quality gate applied to every extraction candidate before acceptance.
//!
//! Pure function of the candidate text: evaluating the same text twice
//! always yields the same verdict.

use std::fmt;

pub const MIN_CHARS: usize = 50;
pub const MIN_WORDS: usize = 20;
pub const MIN_SENTENCE_MARKS: usize = 2;

/// Openers that mark navigation/boilerplate rather than article prose.
pub const BOILERPLATE_OPENERS: &[&str] = &[
    "share",
    "follow",
    "subscribe",
    "contact",
    "advertisement",
    "home",
    "news",
    "previous",
    "next",
    "learn more",
    "visit us",
    "for more",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    TooShort { chars: usize },
    TooFewWords { words: usize },
    Boilerplate { opener: &'static str },
    TooFewSentences { marks: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooShort { chars } => write!(f, "text too short ({chars} chars)"),
            Rejection::TooFewWords { words } => write!(f, "too few words ({words})"),
            Rejection::Boilerplate { opener } => write!(f, "opens with boilerplate '{opener}'"),
            Rejection::TooFewSentences { marks } => {
                write!(f, "too few sentence marks ({marks})")
            }
        }
    }
}

/// Summary of the signals the gate looked at; reused for confidence scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualitySignals {
    pub chars: usize,
    pub words: usize,
    pub sentence_marks: usize,
}

/// Check a candidate's plain text. `Ok` carries the measured signals.
pub fn check(text: &str) -> Result<QualitySignals, Rejection> {
    let stripped = collapse(text);

    let chars = stripped.chars().count();
    if chars < MIN_CHARS {
        return Err(Rejection::TooShort { chars });
    }

    let words = stripped.split_whitespace().count();
    if words < MIN_WORDS {
        return Err(Rejection::TooFewWords { words });
    }

    if let Some(opener) = boilerplate_opener(&stripped) {
        return Err(Rejection::Boilerplate { opener });
    }

    let sentence_marks = stripped
        .chars()
        .filter(|c| matches!(c, '.' | '!' | '?'))
        .count();
    if sentence_marks < MIN_SENTENCE_MARKS {
        return Err(Rejection::TooFewSentences {
            marks: sentence_marks,
        });
    }

    Ok(QualitySignals {
        chars,
        words,
        sentence_marks,
    })
}

pub fn passes(text: &str) -> bool {
    check(text).is_ok()
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// Phrase must end on a word boundary: "News" rejects, "Newsmax" does not.
fn boilerplate_opener(stripped: &str) -> Option<&'static str> {
    let lower = stripped.to_lowercase();
    BOILERPLATE_OPENERS.iter().copied().find(|phrase| {
        lower.starts_with(phrase)
            && lower[phrase.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric())
    })
}
