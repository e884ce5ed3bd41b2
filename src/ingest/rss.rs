// src/ingest/rss.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::types::{FeedDefinition, FeedProvider, RawEntry};

const MAX_ATTEMPTS: u8 = 3;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

/// RSS 1.0: items are siblings of `channel` under `rdf:RDF`.
#[derive(Debug, Deserialize)]
struct RdfFeed {
    #[serde(rename = "item", default)]
    item: Vec<RdfItem>,
}

#[derive(Debug, Deserialize)]
struct RdfItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "dc:date", alias = "date")]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(default)]
    link: Vec<AtomLink>,
    summary: Option<String>,
    content: Option<String>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedFormat {
    Rss,
    Rdf,
    Atom,
}

/// Parse an RSS 2.0, RSS 1.0 (RDF) or Atom document into raw entries.
pub fn parse_feed_document(s: &str) -> Result<Vec<RawEntry>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(s);

    let entries: Vec<RawEntry> = match sniff_format(&xml_clean) {
        FeedFormat::Atom => {
            let feed: AtomFeed = from_str(&xml_clean).context("parsing atom xml")?;
            feed.entry
                .into_iter()
                .map(|it| {
                    let link = it
                        .link
                        .iter()
                        .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
                        .or_else(|| it.link.first())
                        .and_then(|l| l.href.clone());
                    RawEntry {
                        title: it.title,
                        link,
                        description: it.summary.or(it.content),
                        published: it.published,
                        updated: it.updated,
                        created: None,
                    }
                })
                .collect()
        }
        FeedFormat::Rdf => {
            let rdf: RdfFeed = from_str(&xml_clean).context("parsing rdf xml")?;
            rdf.item
                .into_iter()
                .map(|it| RawEntry {
                    title: it.title,
                    link: it.link,
                    description: it.description,
                    published: it.date,
                    updated: None,
                    created: None,
                })
                .collect()
        }
        FeedFormat::Rss => {
            let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;
            rss.channel
                .item
                .into_iter()
                .map(|it| RawEntry {
                    title: it.title,
                    link: it.link,
                    description: it.description,
                    published: it.pub_date,
                    updated: None,
                    created: None,
                })
                .collect()
        }
    };

    histogram!("digest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(entries)
}

fn sniff_format(s: &str) -> FeedFormat {
    let head: String = s.chars().take(512).collect();
    if head.contains("<rss") {
        FeedFormat::Rss
    } else if head.contains("<rdf:RDF") {
        FeedFormat::Rdf
    } else if head.contains("<feed") {
        FeedFormat::Atom
    } else {
        FeedFormat::Rss
    }
}

pub struct RssFeedProvider {
    feed: FeedDefinition,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

impl RssFeedProvider {
    /// Serve a fixed document; used in tests and demos.
    pub fn from_fixture(feed: FeedDefinition, xml: &str) -> Self {
        Self {
            feed,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(feed: FeedDefinition, client: reqwest::Client) -> Self {
        Self {
            feed,
            mode: Mode::Http { client },
        }
    }

    /// Shared client with the timeouts and headers feeds expect.
    pub fn default_client() -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; market-digest/0.1; FeedReader)")
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("building feed http client")
    }

    async fn fetch_body(&self, client: &reqwest::Client) -> Result<String> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = client
                .get(&self.feed.url)
                .header(
                    reqwest::header::ACCEPT,
                    "application/rss+xml,application/atom+xml,application/xml,text/xml;q=0.9,*/*;q=0.8",
                )
                .send()
                .await;

            let retryable = match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        return rsp.text().await.context("feed http .text()");
                    }
                    if !status.is_server_error() {
                        return Err(anyhow!("HTTP {status}"));
                    }
                    anyhow!("HTTP {status}")
                }
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                    anyhow::Error::new(e).context("feed http get()")
                }
                Err(e) => return Err(e).context("feed http get()"),
            };

            if attempt >= MAX_ATTEMPTS {
                tracing::error!(
                    target: "ingest",
                    feed = %self.feed.name,
                    attempts = attempt,
                    error = %retryable,
                    "giving up on feed"
                );
                return Err(retryable);
            }
            tracing::warn!(
                target: "ingest",
                feed = %self.feed.name,
                attempt,
                error = %retryable,
                "feed attempt failed, retrying"
            );
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[async_trait]
impl FeedProvider for RssFeedProvider {
    async fn fetch_entries(&self) -> Result<Vec<RawEntry>> {
        match &self.mode {
            Mode::Fixture(s) => parse_feed_document(s),
            Mode::Http { client } => {
                let body = self.fetch_body(client).await?;
                parse_feed_document(&body)
            }
        }
    }

    fn definition(&self) -> &FeedDefinition {
        &self.feed
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_items_map_to_raw_entries() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title>
<item><title>One</title><link>https://x/1</link><description>First&nbsp;item</description><pubDate>Tue, 10 Jun 2025 08:30:00 +0000</pubDate></item>
<item><title>Two</title><link>https://x/2</link></item>
</channel></rss>"#;
        let entries = parse_feed_document(xml).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("One"));
        assert_eq!(entries[0].description.as_deref(), Some("First item"));
        assert!(entries[0].published.is_some());
        assert!(entries[1].published.is_none());
    }

    #[test]
    fn atom_entries_use_alternate_link() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>A</title>
<entry><title>Alpha</title>
<link rel="self" href="https://x/self"/><link rel="alternate" href="https://x/alpha"/>
<summary>Sum</summary><updated>2025-06-10T08:30:00Z</updated></entry>
</feed>"#;
        let entries = parse_feed_document(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link.as_deref(), Some("https://x/alpha"));
        assert_eq!(entries[0].updated.as_deref(), Some("2025-06-10T08:30:00Z"));
        assert!(entries[0].published.is_none());
    }

    #[test]
    fn rdf_items_next_to_channel_are_parsed() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:dc="http://purl.org/dc/elements/1.1/"
         xmlns="http://purl.org/rss/1.0/">
<channel rdf:about="https://x/"><title>R</title><link>https://x/</link></channel>
<item rdf:about="https://x/1"><title>Bonds rally</title><link>https://x/1</link>
<description>Yields &lt; 4%</description><dc:date>2025-06-10T08:30:00Z</dc:date></item>
<item rdf:about="https://x/2"><title>Gold flat</title><link>https://x/2</link></item>
</rdf:RDF>"#;
        let entries = parse_feed_document(xml).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("Bonds rally"));
        assert_eq!(entries[0].link.as_deref(), Some("https://x/1"));
        assert_eq!(entries[0].description.as_deref(), Some("Yields < 4%"));
        assert_eq!(entries[0].published.as_deref(), Some("2025-06-10T08:30:00Z"));
        assert!(entries[1].published.is_none());
    }

    #[test]
    fn empty_channel_is_ok() {
        let xml = r#"<rss version="2.0"><channel><title>Empty</title></channel></rss>"#;
        assert!(parse_feed_document(xml).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_feed_document("<html><body>nope</body></html>").is_err());
    }
}
