// src/ingest/feed.rs
//! RSS 2.0 / Atom envelope parsing via `quick-xml` serde.

use chrono::{DateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::error::IngestError;
use crate::ingest::{normalize_body, normalize_text};
use crate::ingest::types::{FeedItem, ParsedFeed};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Atom {
    title: Option<AtomText>,
    #[serde(rename = "entry", default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    Rss,
    Atom,
}

fn to_utc(odt: OffsetDateTime) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(odt.unix_timestamp(), odt.nanosecond()).single()
}

pub fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .and_then(to_utc)
        // chrono is more lenient with obsolete zone names ("EST", "PDT").
        .or_else(|| {
            DateTime::parse_from_rfc2822(ts)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        })
}

pub fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339).ok().and_then(to_utc)
}

/// Name of the first element in the document, used to pick the envelope.
pub fn detect_envelope(xml: &str) -> Option<Envelope> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return match e.local_name().as_ref() {
                    b"rss" => Some(Envelope::Rss),
                    b"feed" => Some(Envelope::Atom),
                    _ => None,
                };
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Parse a feed body. `feed_url` tags each item's origin; `now` fills missing dates.
pub fn parse_feed(xml: &str, feed_url: &str, now: DateTime<Utc>) -> Result<ParsedFeed, IngestError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);

    let parsed = match detect_envelope(&xml_clean) {
        Some(Envelope::Rss) => parse_rss(&xml_clean, feed_url, now)?,
        Some(Envelope::Atom) => parse_atom(&xml_clean, feed_url, now)?,
        None => {
            return Err(IngestError::InvalidFeed(
                "no <rss> or <feed> root element".to_string(),
            ))
        }
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("feed_parse_ms").record(ms);
    counter!("feed_items_total").increment(parsed.items.len() as u64);
    Ok(parsed)
}

fn parse_rss(xml: &str, feed_url: &str, now: DateTime<Utc>) -> Result<ParsedFeed, IngestError> {
    let rss: Rss = from_str(xml).map_err(|e| IngestError::InvalidFeed(format!("rss: {e}")))?;

    let mut items = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        // Some feeds only carry a permalink guid.
        let Some(link) = it
            .link
            .or(it.guid.filter(|g| g.starts_with("http")))
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
        else {
            continue;
        };
        items.push(FeedItem {
            title: normalize_text(it.title.as_deref().unwrap_or_default()),
            description: normalize_body(it.description.as_deref().unwrap_or_default()),
            published_at: it
                .pub_date
                .as_deref()
                .and_then(parse_rfc2822)
                .unwrap_or(now),
            link,
            source_feed_url: feed_url.to_string(),
        });
    }

    Ok(ParsedFeed {
        title: rss.channel.title.map(|t| normalize_text(&t)).filter(|t| !t.is_empty()),
        items,
    })
}

fn parse_atom(xml: &str, feed_url: &str, now: DateTime<Utc>) -> Result<ParsedFeed, IngestError> {
    let atom: Atom = from_str(xml).map_err(|e| IngestError::InvalidFeed(format!("atom: {e}")))?;

    let mut items = Vec::with_capacity(atom.entry.len());
    for e in atom.entry {
        let link = e
            .link
            .iter()
            .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
            .or_else(|| e.link.first())
            .and_then(|l| l.href.clone())
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        let Some(link) = link else {
            continue;
        };
        let description = e
            .summary
            .or(e.content)
            .map(|t| normalize_body(&t.value))
            .unwrap_or_default();
        items.push(FeedItem {
            title: e.title.map(|t| normalize_text(&t.value)).unwrap_or_default(),
            description,
            published_at: e
                .published
                .as_deref()
                .or(e.updated.as_deref())
                .and_then(parse_rfc3339)
                .unwrap_or(now),
            link,
            source_feed_url: feed_url.to_string(),
        });
    }

    Ok(ParsedFeed {
        title: atom.title.map(|t| normalize_text(&t.value)).filter(|t| !t.is_empty()),
        items,
    })
}

/// HTML entities are common in feeds but undefined in XML.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
        .replace("&trade;", "(TM)")
        .replace("&reg;", "(R)")
        .replace("&copy;", "(C)")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>Acme Investor News</title>
  <item>
    <title>Acme Reports Q3&nbsp;Results</title>
    <link>https://investors.acme.com/news/q3</link>
    <pubDate>Tue, 10 Jun 2025 14:30:00 GMT</pubDate>
    <description><![CDATA[<p>Record <b>revenue</b>.</p>]]></description>
  </item>
  <item>
    <title>No link here</title>
  </item>
  <item>
    <title>Guid only</title>
    <guid>https://investors.acme.com/news/guid</guid>
  </item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="text">Wire Feed</title>
  <entry>
    <title type="html">Beta Corp Launches Product</title>
    <link rel="alternate" href="https://www.globenewswire.com/news/beta"/>
    <published>2025-06-10T12:00:00Z</published>
    <summary>Beta launched a thing.</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_items_and_title() {
        let now = Utc::now();
        let f = parse_feed(RSS, "https://investors.acme.com/rss", now).unwrap();
        assert_eq!(f.title.as_deref(), Some("Acme Investor News"));
        assert_eq!(f.items.len(), 2);
        let first = &f.items[0];
        assert_eq!(first.title, "Acme Reports Q3 Results");
        assert_eq!(first.description, "Record revenue.");
        assert_eq!(first.published_at.to_rfc3339(), "2025-06-10T14:30:00+00:00");
        assert_eq!(f.items[1].link, "https://investors.acme.com/news/guid");
        assert_eq!(f.items[1].published_at, now);
    }

    #[test]
    fn parses_atom_entries() {
        let f = parse_feed(ATOM, "https://wire.example/atom", Utc::now()).unwrap();
        assert_eq!(f.title.as_deref(), Some("Wire Feed"));
        assert_eq!(f.items.len(), 1);
        assert_eq!(f.items[0].link, "https://www.globenewswire.com/news/beta");
        assert_eq!(f.items[0].title, "Beta Corp Launches Product");
    }

    #[test]
    fn rejects_non_feed_documents() {
        let err = parse_feed("<html><body>nope</body></html>", "u", Utc::now()).unwrap_err();
        assert!(matches!(err, IngestError::InvalidFeed(_)));
    }
}
