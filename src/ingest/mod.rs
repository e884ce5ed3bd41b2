// src/ingest/mod.rs
pub mod market;
pub mod rss;
pub mod types;

use crate::ingest::types::{Article, FeedDefinition, FeedProvider, FeedStatus, RawEntry};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    OffsetDateTime,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Descriptions longer than this are cut and suffixed with `...`.
pub const MAX_DESCRIPTION_CHARS: usize = 400;
pub const DEFAULT_MAX_ARTICLES_PER_FEED: usize = 10;
pub const DEFAULT_FEED_CONCURRENCY: usize = 5;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_feed_fetch_total", "Feeds fetched (success or failure).");
        describe_counter!("digest_feed_errors_total", "Feed fetch/parse errors.");
        describe_counter!(
            "digest_articles_total",
            "Articles kept after normalization."
        );
        describe_histogram!("digest_fetch_ms", "Wall time of one fetch_all pass in milliseconds.");
        describe_histogram!("digest_parse_ms", "Feed document parse time in milliseconds.");
    });
}

/// Strip markup from a feed description and cap its length.
pub fn clean_description(s: &str) -> String {
    // 1) Strip HTML tags first so escaped `&lt;`/`&gt;` survive as text
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"<[^>]+>").unwrap());
    let stripped = re_tags.replace_all(s, "");

    // 2) HTML entity decode
    let mut out = html_escape::decode_html_entities(&stripped).to_string();

    // 3) Collapse whitespace (covers decoded &nbsp;)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 4) Length cap
    if out.chars().count() > MAX_DESCRIPTION_CHARS {
        let mut cut: String = out.chars().take(MAX_DESCRIPTION_CHARS - 3).collect();
        cut.push_str("...");
        out = cut;
    }

    out
}

/// Parse a feed timestamp: RFC 2822 (RSS `pubDate`), RFC 3339 (Atom), or a naive ISO
/// timestamp taken as UTC.
pub fn parse_feed_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let ts = raw.trim();
    if ts.is_empty() {
        return None;
    }
    let from_time = OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0));
    if from_time.is_some() {
        return from_time;
    }
    // chrono is more lenient with named zones ("GMT", "EST") in RFC 2822.
    if let Ok(dt) = DateTime::parse_from_rfc2822(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|n| n.and_utc())
}

/// Turn a raw feed entry into an [`Article`]. Entries without a title are rejected.
pub fn normalize_entry(entry: RawEntry, feed: &FeedDefinition) -> Option<Article> {
    let title = entry.title.as_deref().unwrap_or_default().trim().to_string();
    if title.is_empty() {
        return None;
    }

    let description = entry
        .description
        .as_deref()
        .map(clean_description)
        .unwrap_or_default();

    let published_at = [&entry.published, &entry.updated, &entry.created]
        .into_iter()
        .flatten()
        .find_map(|candidate| parse_feed_timestamp(candidate))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true));

    Some(Article {
        title,
        description,
        link: entry.link.unwrap_or_default().trim().to_string(),
        source: feed.name.clone(),
        published_at,
        category: feed.category.clone(),
    })
}

#[derive(Clone, Copy, Debug)]
pub struct FetchOptions {
    pub max_concurrency: usize,
    pub max_articles_per_feed: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_FEED_CONCURRENCY,
            max_articles_per_feed: DEFAULT_MAX_ARTICLES_PER_FEED,
        }
    }
}

/// Flat article list plus one status per provider, in provider order.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub articles: Vec<Article>,
    pub statuses: Vec<FeedStatus>,
}

impl FetchOutcome {
    pub fn successes(&self) -> usize {
        self.statuses.iter().filter(|s| s.is_success()).count()
    }
}

/// Fetch every provider with bounded concurrency. A failing feed only yields a failed
/// status; it never aborts the others.
pub async fn fetch_all(providers: &[Arc<dyn FeedProvider>], opts: FetchOptions) -> FetchOutcome {
    ensure_metrics_described();
    let t0 = std::time::Instant::now();

    let permits = Arc::new(Semaphore::new(opts.max_concurrency.max(1)));
    let mut set = JoinSet::new();
    for (idx, provider) in providers.iter().enumerate() {
        let provider = Arc::clone(provider);
        let permits = Arc::clone(&permits);
        set.spawn(async move {
            let _permit = permits.acquire_owned().await;
            (idx, provider.fetch_entries().await)
        });
    }

    let mut slots: Vec<Option<(Vec<Article>, FeedStatus)>> = vec![None; providers.len()];
    while let Some(joined) = set.join_next().await {
        let (idx, res) = match joined {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(target: "ingest", error = %e, "feed task panicked");
                continue;
            }
        };
        let feed = providers[idx].definition();
        counter!("digest_feed_fetch_total").increment(1);
        let slot = match res {
            Ok(entries) => {
                let articles: Vec<Article> = entries
                    .into_iter()
                    .take(opts.max_articles_per_feed)
                    .filter_map(|e| normalize_entry(e, feed))
                    .collect();
                tracing::debug!(target: "ingest", feed = %feed.name, articles = articles.len(), "feed ok");
                let status = FeedStatus::ok(&feed.name, articles.len());
                (articles, status)
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, feed = %feed.name, "feed error");
                counter!("digest_feed_errors_total").increment(1);
                (Vec::new(), FeedStatus::failed(&feed.name, format!("{e:#}")))
            }
        };
        slots[idx] = Some(slot);
    }

    let mut out = FetchOutcome::default();
    for (idx, slot) in slots.into_iter().enumerate() {
        match slot {
            Some((mut articles, status)) => {
                out.articles.append(&mut articles);
                out.statuses.push(status);
            }
            None => out.statuses.push(FeedStatus::failed(
                &providers[idx].definition().name,
                "fetch task aborted",
            )),
        }
    }

    counter!("digest_articles_total").increment(out.articles.len() as u64);
    histogram!("digest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> FeedDefinition {
        FeedDefinition::new("Feed A", "https://example.test/rss")
    }

    #[test]
    fn clean_description_strips_tags_and_entities() {
        let s = "<p>Stocks&nbsp;rally <b>hard</b></p>\n\n on earnings";
        assert_eq!(clean_description(s), "Stocks rally hard on earnings");
    }

    #[test]
    fn escaped_angle_brackets_are_kept_as_text() {
        let s = "<p>S&amp;P 500 &lt; 5000 &gt; record</p>";
        assert_eq!(clean_description(s), "S&P 500 < 5000 > record");
    }

    #[test]
    fn long_description_is_truncated_with_ellipsis() {
        let s = "x".repeat(1_000);
        let out = clean_description(&s);
        assert_eq!(out.chars().count(), MAX_DESCRIPTION_CHARS);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn description_at_limit_is_untouched() {
        let s = "y".repeat(MAX_DESCRIPTION_CHARS);
        assert_eq!(clean_description(&s), s);
    }

    #[test]
    fn entry_without_title_is_rejected() {
        let e = RawEntry {
            title: Some("   ".into()),
            link: Some("https://x/a".into()),
            ..Default::default()
        };
        assert!(normalize_entry(e, &feed()).is_none());
    }

    #[test]
    fn timestamp_candidates_follow_priority() {
        let e = RawEntry {
            title: Some("Hello".into()),
            published: Some("not a date".into()),
            updated: Some("Tue, 10 Jun 2025 08:30:00 +0000".into()),
            created: Some("2024-01-01T00:00:00Z".into()),
            ..Default::default()
        };
        let a = normalize_entry(e, &feed()).unwrap();
        assert_eq!(a.published_at.as_deref(), Some("2025-06-10T08:30:00Z"));
        assert_eq!(a.source, "Feed A");
    }

    #[test]
    fn unparsable_timestamps_become_none() {
        let e = RawEntry {
            title: Some("Hello".into()),
            published: Some("yesterday-ish".into()),
            ..Default::default()
        };
        assert_eq!(normalize_entry(e, &feed()).unwrap().published_at, None);
    }

    #[test]
    fn rfc2822_with_named_zone_parses() {
        let dt = parse_feed_timestamp("Tue, 10 Jun 2025 08:30:00 GMT").unwrap();
        assert_eq!(dt.to_rfc3339_opts(SecondsFormat::Secs, true), "2025-06-10T08:30:00Z");
    }

    #[test]
    fn status_display_matches_report_format() {
        assert_eq!(FeedStatus::ok("Feed A", 3).to_string(), "✅ Feed A (3 articles)");
        let failed = FeedStatus::failed("Feed B", "timeout");
        assert_eq!(failed.to_string(), "❌ Feed B: timeout");
        assert!(!failed.is_success());
    }
}
