// src/analyze/context.rs
//! Markdown-flavored article digest fed to the prompt.
//!
//! The exact text is a contract with the prompt templates; keep it stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rank::{parse_published_at, AggregateEntry};
use crate::ingest::types::Article;

pub const NO_ARTICLES_SENTINEL: &str = "No articles were retrieved from the configured feeds.";
pub const TOP_STORIES_HEADER: &str = "## Top stories (prioritized by recency & cross-feed mentions)";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLimits {
    pub top_limit: usize,
    pub per_source_limit: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            top_limit: 10,
            per_source_limit: 5,
        }
    }
}

pub fn build_article_context(
    articles: &[Article],
    ranked: &[AggregateEntry],
    limits: ContextLimits,
) -> String {
    if articles.is_empty() {
        return NO_ARTICLES_SENTINEL.to_string();
    }

    let mut lines: Vec<String> = Vec::new();

    if !ranked.is_empty() {
        lines.push(TOP_STORIES_HEADER.to_string());
        for entry in ranked.iter().take(limits.top_limit) {
            let title = entry.title.trim();
            if title.is_empty() {
                continue;
            }
            let sources = if entry.sources.is_empty() {
                "Unknown source".to_string()
            } else {
                let mut s = entry.sources.clone();
                s.sort();
                s.join(", ")
            };
            let published = entry
                .latest
                .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "Unknown time".to_string());
            let plural = if entry.mention_count == 1 { "" } else { "s" };
            lines.push(format!(
                "- **{title}** — mentioned in {} feed{plural} ({sources}; published {published})",
                entry.mention_count
            ));
            if !entry.summary.is_empty() {
                lines.push(format!("  {}", entry.summary));
            }
            if !entry.link.is_empty() {
                lines.push(format!("  Source: {}", entry.link));
            }
        }
        lines.push(String::new());
    }

    for (source, items) in group_by_source(articles) {
        lines.push(format!("### {source} ({} articles)", items.len()));
        let mut sorted = items;
        sorted.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
        for entry in sorted.into_iter().take(limits.per_source_limit) {
            let title = entry.title.trim();
            if !title.is_empty() {
                lines.push(format!("- **{title}**"));
            }
            let description = entry.description.trim();
            if !description.is_empty() {
                lines.push(format!("  {description}"));
            }
            if !entry.link.is_empty() {
                lines.push(format!("  Source: {}", entry.link));
            }
        }
        lines.push(String::new());
    }

    lines.join("\n").trim().to_string()
}

/// Raw (non-deduplicated) articles per source, in first-appearance order.
fn group_by_source(articles: &[Article]) -> Vec<(&str, Vec<&Article>)> {
    let mut groups: Vec<(&str, Vec<&Article>)> = Vec::new();
    for article in articles {
        let source = if article.source.is_empty() {
            "Unknown"
        } else {
            article.source.as_str()
        };
        match groups.iter_mut().find(|(s, _)| *s == source) {
            Some((_, items)) => items.push(article),
            None => groups.push((source, vec![article])),
        }
    }
    groups
}

/// Undated articles sort lowest.
fn sort_key(article: &Article) -> (DateTime<Utc>, &str) {
    let ts = parse_published_at(article.published_at.as_deref()).unwrap_or(DateTime::<Utc>::MIN_UTC);
    (ts, article.title.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn art(title: &str, source: &str, published: Option<&str>) -> Article {
        Article {
            title: title.into(),
            description: String::new(),
            link: String::new(),
            source: source.into(),
            published_at: published.map(str::to_string),
            category: None,
        }
    }

    #[test]
    fn empty_articles_give_sentinel() {
        assert_eq!(
            build_article_context(&[], &[], ContextLimits::default()),
            NO_ARTICLES_SENTINEL
        );
    }

    #[test]
    fn per_source_sorted_newest_first_and_capped() {
        let articles = vec![
            art("Undated", "Wire", None),
            art("Old", "Wire", Some("2025-06-09T08:00:00Z")),
            art("New", "Wire", Some("2025-06-10T08:00:00Z")),
        ];
        let limits = ContextLimits {
            top_limit: 10,
            per_source_limit: 2,
        };
        let out = build_article_context(&articles, &[], limits);
        assert_eq!(out, "### Wire (3 articles)\n- **New**\n- **Old**");
    }

    #[test]
    fn blank_source_groups_under_unknown() {
        let out = build_article_context(&[art("T", "", None)], &[], ContextLimits::default());
        assert!(out.starts_with("### Unknown (1 articles)"));
    }
}
