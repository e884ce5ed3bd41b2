// src/analyze/rank.rs
//! Cross-feed aggregation: collapse articles sharing a dedup key, then order the merged
//! stories by recency and corroboration.
//!
//! - The first contributor seeds an entry; a contributor with a strictly newer timestamp
//!   replaces title/link/summary (each only when non-empty) and `latest`.
//! - Every contributor adds its source and bumps `mention_count`.
//! - Order: score desc, then `latest` desc (undated lowest), then `mention_count` desc.
//!   Remaining ties keep first-seen order.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::dedup::article_key;
use super::scoring::{score, RankParams, ScoreInputs, ScoreWeights};
use crate::ingest::types::Article;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AggregateEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    /// Naive UTC.
    pub latest: Option<NaiveDateTime>,
    /// Distinct contributing sources, sorted.
    pub sources: Vec<String>,
    pub mention_count: usize,
    pub score: f64,
}

struct Accumulator {
    title: String,
    link: String,
    summary: String,
    latest: Option<DateTime<Utc>>,
    sources: BTreeSet<String>,
    mention_count: usize,
}

impl Accumulator {
    fn seed(article: &Article, published: Option<DateTime<Utc>>) -> Self {
        Self {
            title: article.title.trim().to_string(),
            link: article.link.clone(),
            summary: article.description.trim().to_string(),
            latest: published,
            sources: BTreeSet::new(),
            mention_count: 0,
        }
    }

    fn contribute(&mut self, article: &Article, published: Option<DateTime<Utc>>) {
        if let Some(ts) = published {
            if self.latest.map_or(true, |cur| ts > cur) {
                self.latest = Some(ts);
                if !article.description.trim().is_empty() {
                    self.summary = article.description.trim().to_string();
                }
                if !article.link.is_empty() {
                    self.link = article.link.clone();
                }
                if !article.title.trim().is_empty() {
                    self.title = article.title.trim().to_string();
                }
            }
        }
        let source = if article.source.is_empty() {
            "Unknown".to_string()
        } else {
            article.source.clone()
        };
        self.sources.insert(source);
        self.mention_count += 1;
    }
}

/// Parse `published_at` leniently; anything unparsable is `None`, never an error.
///
/// Accepts RFC 3339 (`Z` or offset), naive `YYYY-MM-DDTHH:MM:SS[.f]` (taken as UTC,
/// `T` or space separator) and bare dates.
pub fn parse_published_at(value: Option<&str>) -> Option<DateTime<Utc>> {
    let text = value?.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(n) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(n.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}

/// Rank against the wall clock.
pub fn rank_articles(articles: &[Article], params: RankParams) -> Vec<AggregateEntry> {
    rank_articles_at(articles, params, Utc::now())
}

/// Rank against an explicit `now`; pure and deterministic.
pub fn rank_articles_at(
    articles: &[Article],
    params: RankParams,
    now: DateTime<Utc>,
) -> Vec<AggregateEntry> {
    rank_articles_with(articles, params, now, &ScoreWeights::default())
}

pub fn rank_articles_with(
    articles: &[Article],
    params: RankParams,
    now: DateTime<Utc>,
    weights: &ScoreWeights,
) -> Vec<AggregateEntry> {
    if articles.is_empty() {
        return Vec::new();
    }
    let params = params.clamped();

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Accumulator> = Vec::new();

    for article in articles {
        let key = article_key(article);
        if key.is_empty() {
            continue;
        }
        let published = parse_published_at(article.published_at.as_deref());
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Accumulator::seed(article, published));
            groups.len() - 1
        });
        groups[slot].contribute(article, published);
    }

    let mut ranked: Vec<AggregateEntry> = groups
        .into_iter()
        .map(|acc| {
            let age_hours = acc
                .latest
                .map(|ts| (now - ts).num_milliseconds() as f64 / 3_600_000.0);
            let inputs = ScoreInputs {
                distinct_sources: acc.sources.len(),
                mention_count: acc.mention_count,
                age_hours,
            };
            AggregateEntry {
                score: score(&inputs, params, weights),
                title: acc.title,
                link: acc.link,
                summary: acc.summary,
                latest: acc.latest.map(|ts| ts.naive_utc()),
                sources: acc.sources.into_iter().collect(),
                mention_count: acc.mention_count,
            }
        })
        .collect();

    // Stable sort: equal keys keep first-seen order.
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.latest.cmp(&a.latest))
            .then_with(|| b.mention_count.cmp(&a.mention_count))
    });

    tracing::debug!(
        target: "rank",
        articles = articles.len(),
        entries = ranked.len(),
        "ranked articles"
    );
    ranked
}
