// src/config/mod.rs
//! Process settings from the environment (`.env` is loaded by the binaries via dotenvy).

pub mod ai;
pub mod newsletters;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

use crate::notify::recipients::coerce_recipient_list;
use crate::scheduler::{parse_schedule_times, DEFAULT_SEND_TIMES};

pub const DEFAULT_RUN_HISTORY_CAP: usize = 200;

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub environment: String,
    pub primary_model: String,
    pub secondary_model: Option<String>,
    /// low | medium | high
    pub reasoning_level: String,

    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub from_email: Option<String>,
    pub from_name: String,
    pub default_recipients: Vec<String>,
    /// Normalized `HH:MM` slots.
    pub default_send_times: Vec<String>,

    pub finnhub_api_key: Option<String>,
    pub newsletters_path: Option<PathBuf>,
    pub ai_pipeline_path: PathBuf,

    pub feed_concurrency: usize,
    pub max_articles_per_feed: usize,
    pub run_history_cap: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "Market Digest".to_string(),
            environment: "development".to_string(),
            primary_model: "gpt-5-mini".to_string(),
            secondary_model: Some("gemini-2.5-flash".to_string()),
            reasoning_level: "medium".to_string(),
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_pass: None,
            from_email: None,
            from_name: "Market Digest".to_string(),
            default_recipients: Vec::new(),
            default_send_times: DEFAULT_SEND_TIMES.iter().map(|s| s.to_string()).collect(),
            finnhub_api_key: None,
            newsletters_path: None,
            ai_pipeline_path: PathBuf::from(ai::DEFAULT_AI_PIPELINE_PATH),
            feed_concurrency: crate::ingest::DEFAULT_FEED_CONCURRENCY,
            max_articles_per_feed: crate::ingest::DEFAULT_MAX_ARTICLES_PER_FEED,
            run_history_cap: DEFAULT_RUN_HISTORY_CAP,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as `from_env`, reading through `get` (blank values count as unset).
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let d = Settings::default();

        let reasoning_level = match get("REASONING_LEVEL") {
            Some(v) if matches!(v.to_ascii_lowercase().as_str(), "low" | "medium" | "high") => {
                v.to_ascii_lowercase()
            }
            Some(v) => {
                tracing::warn!(value = %v, "invalid REASONING_LEVEL, using medium");
                d.reasoning_level.clone()
            }
            None => d.reasoning_level.clone(),
        };

        let default_send_times = match get("DEFAULT_SEND_TIMES") {
            Some(v) => {
                let parts: Vec<&str> = v.split(',').collect();
                parse_schedule_times(parts.as_slice())
            }
            None => d.default_send_times.clone(),
        };

        let default_recipients =
            coerce_recipient_list(get("DEFAULT_RECIPIENTS").as_deref(), None).unwrap_or_default();

        let s = Settings {
            app_name: get("APP_NAME").unwrap_or(d.app_name),
            environment: get("ENVIRONMENT").unwrap_or(d.environment),
            primary_model: get("PRIMARY_MODEL").unwrap_or(d.primary_model),
            secondary_model: get("SECONDARY_MODEL").or(d.secondary_model),
            reasoning_level,
            smtp_host: get("SMTP_HOST"),
            smtp_port: parse_num(get("SMTP_PORT"), "SMTP_PORT", d.smtp_port)?,
            smtp_user: get("SMTP_USER"),
            smtp_pass: get("SMTP_PASS"),
            from_email: get("DIGEST_FROM_EMAIL"),
            from_name: get("DIGEST_FROM_NAME").unwrap_or(d.from_name),
            default_recipients,
            default_send_times,
            finnhub_api_key: get("FINNHUB_API_KEY"),
            newsletters_path: get("NEWSLETTERS_PATH").map(PathBuf::from),
            ai_pipeline_path: get("AI_PIPELINE_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.ai_pipeline_path),
            feed_concurrency: parse_num(get("FEED_CONCURRENCY"), "FEED_CONCURRENCY", d.feed_concurrency)?,
            max_articles_per_feed: parse_num(
                get("MAX_ARTICLES_PER_FEED"),
                "MAX_ARTICLES_PER_FEED",
                d.max_articles_per_feed,
            )?,
            run_history_cap: parse_num(get("RUN_HISTORY_CAP"), "RUN_HISTORY_CAP", d.run_history_cap)?,
        };

        if s.feed_concurrency == 0 {
            bail!("FEED_CONCURRENCY must be >= 1");
        }
        if s.max_articles_per_feed == 0 {
            bail!("MAX_ARTICLES_PER_FEED must be >= 1");
        }
        Ok(s)
    }

    /// SMTP delivery needs at least a host and a sender address.
    pub fn smtp_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_email.is_some()
    }
}

fn parse_num<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v.parse::<T>().with_context(|| format!("invalid {key}: {v}")),
        None => Ok(default),
    }
}
