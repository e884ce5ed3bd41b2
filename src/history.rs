//! history.rs: bounded in-memory log of newsletter runs for the admin API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analyze::ai_adapter::TokenUsage;
use crate::pipeline::RunResult;

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: u64,
    pub newsletter: String,
    pub success: bool,
    pub ai_provider: String,
    pub article_count: usize,
    // rendered "✅ feed (n articles)" / "❌ feed: error" lines
    pub feed_statuses: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
    pub token_usage: Option<TokenUsage>,
    pub subject: Option<String>,
}

#[derive(Debug)]
pub struct RunHistory {
    inner: Mutex<Vec<RunRecord>>,
    next_id: AtomicU64,
    cap: usize,
}

impl RunHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(Vec::with_capacity(cap)),
            next_id: AtomicU64::new(1),
            cap,
        }
    }

    pub fn push(&self, r: &RunResult) -> RunRecord {
        let record = RunRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            newsletter: r.newsletter.clone(),
            success: r.success,
            ai_provider: r.ai_provider.clone(),
            article_count: r.article_count,
            feed_statuses: r.feed_statuses.iter().map(|s| s.to_string()).collect(),
            started_at: r.started_at,
            finished_at: r.finished_at,
            error: r.error.clone(),
            token_usage: r.token_usage.clone(),
            subject: r.subject.clone(),
        };

        let mut v = self.inner.lock().expect("run history mutex poisoned");
        v.push(record.clone());
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
        record
    }

    /// Newest first.
    pub fn recent(&self, n: usize) -> Vec<RunRecord> {
        let v = self.inner.lock().expect("run history mutex poisoned");
        v.iter().rev().take(n).cloned().collect()
    }

    pub fn last(&self) -> Option<RunRecord> {
        self.recent(1).into_iter().next()
    }

    pub fn last_for(&self, newsletter: &str) -> Option<RunRecord> {
        let v = self.inner.lock().expect("run history mutex poisoned");
        v.iter().rev().find(|r| r.newsletter == newsletter).cloned()
    }

    /// (runs, failures) started at or after `since`.
    pub fn counts_since(&self, since: DateTime<Utc>) -> (usize, usize) {
        let v = self.inner.lock().expect("run history mutex poisoned");
        v.iter()
            .filter(|r| r.started_at >= since)
            .fold((0, 0), |(runs, fails), r| (runs + 1, fails + usize::from(!r.success)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::FeedStatus;
    use chrono::Duration;

    fn result(name: &str, success: bool, started_at: DateTime<Utc>) -> RunResult {
        RunResult {
            newsletter: name.into(),
            success,
            ai_provider: "mock".into(),
            article_count: 3,
            feed_statuses: vec![FeedStatus::ok("Wire", 3), FeedStatus::failed("Down", "HTTP 503")],
            started_at,
            finished_at: started_at,
            error: (!success).then(|| "boom".to_string()),
            token_usage: None,
            subject: None,
            html_content: None,
        }
    }

    #[test]
    fn cap_drops_oldest_and_recent_is_newest_first() {
        let h = RunHistory::with_capacity(2);
        let now = Utc::now();
        h.push(&result("a", true, now));
        h.push(&result("b", true, now));
        let third = h.push(&result("c", false, now));
        assert_eq!(third.id, 3);
        let names: Vec<String> = h.recent(10).into_iter().map(|r| r.newsletter).collect();
        assert_eq!(names, vec!["c", "b"]);
        assert_eq!(h.last().unwrap().feed_statuses[1], "❌ Down: HTTP 503");
    }

    #[test]
    fn counts_only_runs_after_cutoff() {
        let h = RunHistory::with_capacity(10);
        let now = Utc::now();
        h.push(&result("old", false, now - Duration::days(2)));
        h.push(&result("a", true, now));
        h.push(&result("a", false, now));
        assert_eq!(h.counts_since(now - Duration::hours(1)), (2, 1));
        assert!(!h.last_for("a").unwrap().success);
        assert!(h.last_for("zzz").is_none());
    }
}
