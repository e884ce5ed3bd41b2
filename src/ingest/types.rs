// src/ingest/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical article record handed to the ranking core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub source: String,
    /// ISO-8601 instant (RFC 3339) or `None` when the feed gave nothing usable.
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// One entry as it comes out of the feed parser, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
    pub created: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedDefinition {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
}

impl FeedDefinition {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            category: None,
        }
    }
}

/// Per-feed outcome, used for reporting only (never for scoring).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FeedStatus {
    pub feed: String,
    pub article_count: usize,
    pub error: Option<String>,
}

impl FeedStatus {
    pub fn ok(feed: &str, article_count: usize) -> Self {
        Self {
            feed: feed.to_string(),
            article_count,
            error: None,
        }
    }

    pub fn failed(feed: &str, error: impl fmt::Display) -> Self {
        let msg: String = error.to_string().chars().take(180).collect();
        Self {
            feed: feed.to_string(),
            article_count: 0,
            error: Some(msg),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "✅ {} ({} articles)", self.feed, self.article_count),
            Some(e) => write!(f, "❌ {}: {}", self.feed, e),
        }
    }
}

#[async_trait::async_trait]
pub trait FeedProvider: Send + Sync {
    /// Fetch the feed and return raw, not-yet-normalized entries.
    async fn fetch_entries(&self) -> Result<Vec<RawEntry>>;
    fn definition(&self) -> &FeedDefinition;

    fn name(&self) -> &str {
        &self.definition().name
    }
}
