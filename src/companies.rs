// src/companies.rs
//! Company matching for merged releases.
//!
//! Fallback order: source binding → alias/name containment → fuzzy token window.

use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

use crate::config::SeedCompany;

const FUZZY_THRESHOLD: f64 = 0.93;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl From<&SeedCompany> for Company {
    fn from(s: &SeedCompany) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            aliases: s.aliases.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompanyMatch {
    pub id: String,
    pub name: String,
}

impl From<&Company> for CompanyMatch {
    fn from(c: &Company) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
        }
    }
}

/// Lowercase, punctuation → space, collapsed whitespace.
fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whole-token containment, so "Acme" does not match "Acmeville".
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    format!(" {haystack} ").contains(&format!(" {needle} "))
}

pub struct CompanyMatcher {
    companies: Vec<Company>,
}

impl CompanyMatcher {
    pub fn new(companies: Vec<Company>) -> Self {
        Self { companies }
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    pub fn by_id(&self, id: &str) -> Option<CompanyMatch> {
        self.companies.iter().find(|c| c.id == id).map(CompanyMatch::from)
    }

    /// Match a release title. A bound company (from the feed source) wins outright.
    pub fn match_title(&self, title: &str, bound_company: Option<&str>) -> Option<CompanyMatch> {
        if let Some(found) = bound_company.and_then(|id| self.by_id(id)) {
            return Some(found);
        }

        let t = normalize(title);
        if t.is_empty() {
            return None;
        }

        // Containment: longest matching phrase wins.
        let mut best: Option<(&Company, usize)> = None;
        for c in &self.companies {
            for phrase in std::iter::once(&c.name).chain(c.aliases.iter()) {
                let p = normalize(phrase);
                if contains_phrase(&t, &p) && best.map_or(true, |(_, len)| p.len() > len) {
                    best = Some((c, p.len()));
                }
            }
        }
        if let Some((c, _)) = best {
            return Some(c.into());
        }

        // Fuzzy: compare the name against title windows of the same token count.
        let tokens: Vec<&str> = t.split(' ').collect();
        let mut fuzzy: Option<(&Company, f64)> = None;
        for c in &self.companies {
            let name = normalize(&c.name);
            let n = name.split(' ').count();
            if n == 0 || n > tokens.len() {
                continue;
            }
            for w in tokens.windows(n) {
                let score = jaro_winkler(&w.join(" "), &name);
                if score >= FUZZY_THRESHOLD && fuzzy.map_or(true, |(_, s)| score > s) {
                    fuzzy = Some((c, score));
                }
            }
        }
        fuzzy.map(|(c, score)| {
            tracing::debug!(target: "companies", company = %c.id, score, "fuzzy company match");
            c.into()
        })
    }
}
