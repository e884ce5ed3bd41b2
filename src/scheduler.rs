// src/scheduler.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use tokio::task::JoinHandle;

use crate::config::newsletters::NewsletterConfig;
use crate::history::RunHistory;
use crate::pipeline::NewsletterPipeline;

pub const DEFAULT_SEND_TIMES: &[&str] = &["06:30", "17:30"];

/// Strict `H:MM` / `HH:MM`, hours 00-23, minutes 00-59.
pub fn parse_schedule_time(s: &str) -> Option<NaiveTime> {
    let (h, m) = s.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    NaiveTime::from_hms_opt(h, m, 0)
}

/// Normalize to sorted, unique `HH:MM`. Invalid entries are dropped; nothing valid
/// means the defaults.
pub fn parse_schedule_times<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    let mut out: Vec<NaiveTime> = Vec::new();
    for it in items {
        let raw = it.as_ref().trim();
        if raw.is_empty() {
            continue;
        }
        match parse_schedule_time(raw) {
            Some(t) => out.push(t),
            None => tracing::warn!(target: "scheduler", value = raw, "invalid schedule time dropped"),
        }
    }
    if out.is_empty() {
        return DEFAULT_SEND_TIMES.iter().map(|s| s.to_string()).collect();
    }
    out.sort();
    out.dedup();
    out.into_iter().map(|t| t.format("%H:%M").to_string()).collect()
}

/// Earliest slot strictly after `now`, in `now`'s timezone. Slots that fall into a DST
/// gap are skipped for that day.
pub fn next_fire_after<Tz: TimeZone>(now: &DateTime<Tz>, times: &[NaiveTime]) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();
    let mut best: Option<DateTime<Tz>> = None;
    for day in 0..=2 {
        let date = today + Duration::days(day);
        for t in times {
            let Some(candidate) = tz.from_local_datetime(&date.and_time(*t)).earliest() else {
                continue;
            };
            if candidate > *now && best.as_ref().map_or(true, |b| candidate < *b) {
                best = Some(candidate);
            }
        }
        if best.is_some() {
            break;
        }
    }
    best
}

/// One task per active newsletter: sleep until the next slot, run, record.
pub fn spawn_newsletter_scheduler(
    pipeline: Arc<NewsletterPipeline>,
    history: Arc<RunHistory>,
    newsletters: Vec<NewsletterConfig>,
    default_times: Vec<String>,
) -> Vec<JoinHandle<()>> {
    newsletters
        .into_iter()
        .filter(|n| {
            if !n.active {
                tracing::info!(target: "scheduler", newsletter = %n.name, "inactive, not scheduled");
            }
            n.active
        })
        .map(|newsletter| {
            let pipeline = Arc::clone(&pipeline);
            let history = Arc::clone(&history);
            let configured = if newsletter.schedule_times.is_empty() {
                default_times.clone()
            } else {
                newsletter.schedule_times.clone()
            };
            let times: Vec<NaiveTime> = parse_schedule_times(configured.as_slice())
                .iter()
                .filter_map(|s| parse_schedule_time(s))
                .collect();

            tokio::spawn(async move {
                loop {
                    let now = Local::now();
                    let Some(next) = next_fire_after(&now, &times) else {
                        tracing::error!(target: "scheduler", newsletter = %newsletter.name, "no upcoming slot; scheduler stops");
                        return;
                    };
                    let wait = (next.clone() - now).to_std().unwrap_or_default();
                    tracing::info!(
                        target: "scheduler",
                        newsletter = %newsletter.name,
                        next = %next.format("%Y-%m-%d %H:%M %Z"),
                        "next run scheduled"
                    );
                    tokio::time::sleep(wait).await;

                    let result = pipeline.run(&newsletter).await;
                    if !result.success {
                        tracing::warn!(
                            target: "scheduler",
                            newsletter = %newsletter.name,
                            error = ?result.error,
                            "scheduled run did not deliver"
                        );
                    }
                    history.push(&result);
                }
            })
        })
        .collect()
}
