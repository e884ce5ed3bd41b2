// src/pipeline.rs
//! One newsletter run end to end: feeds → rank → quotes → context → prompt → model →
//! render → email. `run` never fails; problems end up in `RunResult::error`.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::analyze::ai_adapter::{AiCascade, GenerateRequest, TokenUsage};
use crate::analyze::{build_article_context, rank_articles, ContextLimits, RankParams};
use crate::config::ai::{resolve_cascade, AiPipelineConfig};
use crate::config::Settings;
use crate::ingest::market::{format_market_data, MarketDataClient, QuoteSource};
use crate::ingest::rss::RssFeedProvider;
use crate::ingest::types::{FeedProvider, FeedStatus};
use crate::ingest::{fetch_all, FetchOptions};
use crate::notify::{DigestMailer, DigestMetadata, DigestRenderer, OutgoingDigest, SmtpMailer};
use crate::prompt::{build_prompt, system_prompt, PromptInputs};

pub use crate::config::newsletters::NewsletterConfig;

pub const MAILER_MISSING: &str = "Email delivery not configured";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_runs_total", "Newsletter runs started.");
        describe_counter!("digest_run_failures_total", "Newsletter runs that did not deliver.");
        describe_histogram!("digest_ranked_entries", "Aggregated stories per run.");
    });
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub newsletter: String,
    pub success: bool,
    pub ai_provider: String,
    pub article_count: usize,
    pub feed_statuses: Vec<FeedStatus>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
    pub token_usage: Option<TokenUsage>,
    pub subject: Option<String>,
    #[serde(skip)]
    pub html_content: Option<String>,
}

impl RunResult {
    fn failed(newsletter: &str, started_at: DateTime<Utc>, error: String) -> Self {
        Self {
            newsletter: newsletter.to_string(),
            success: false,
            ai_provider: String::new(),
            article_count: 0,
            feed_statuses: Vec::new(),
            started_at,
            finished_at: Utc::now(),
            error: Some(error),
            token_usage: None,
            subject: None,
            html_content: None,
        }
    }
}

pub fn digest_subject(name: &str, started_at: DateTime<Utc>) -> String {
    format!("{name} Digest - {}", started_at.format("%Y-%m-%d"))
}

pub struct NewsletterPipeline {
    cascade: Arc<AiCascade>,
    quotes: Arc<dyn QuoteSource>,
    mailer: Option<Arc<dyn DigestMailer>>,
    renderer: DigestRenderer,
    http: reqwest::Client,
    fetch: FetchOptions,
    rank: RankParams,
    limits: ContextLimits,
}

impl NewsletterPipeline {
    pub fn new(
        cascade: Arc<AiCascade>,
        quotes: Arc<dyn QuoteSource>,
        mailer: Option<Arc<dyn DigestMailer>>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            cascade,
            quotes,
            mailer,
            renderer: DigestRenderer,
            http,
            fetch: FetchOptions::default(),
            rank: RankParams::default(),
            limits: ContextLimits::default(),
        }
    }

    /// Wire real collaborators from settings. A broken SMTP setup is logged and leaves
    /// the pipeline without a mailer rather than failing startup.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let pipeline_cfg = AiPipelineConfig::load_or_default(&settings.ai_pipeline_path)?;
        let cascade_cfg = resolve_cascade(
            &settings.primary_model,
            settings.secondary_model.as_deref(),
            &settings.reasoning_level,
            &pipeline_cfg,
        );
        let cascade = Arc::new(AiCascade::from_configs(&cascade_cfg));
        tracing::info!(target: "pipeline", providers = ?cascade.provider_names(), "ai cascade ready");

        let quotes: Arc<dyn QuoteSource> =
            Arc::new(MarketDataClient::new(settings.finnhub_api_key.clone())?);

        let mailer: Option<Arc<dyn DigestMailer>> = if settings.smtp_configured() {
            match SmtpMailer::from_settings(settings) {
                Ok(m) => Some(Arc::new(m)),
                Err(e) => {
                    tracing::warn!(target: "pipeline", error = %e, "smtp mailer unavailable");
                    None
                }
            }
        } else {
            tracing::warn!(target: "pipeline", "SMTP not configured; digests will not be sent");
            None
        };

        let http = RssFeedProvider::default_client().context("building feed http client")?;
        Ok(Self::new(cascade, quotes, mailer, http).with_fetch_options(FetchOptions {
            max_concurrency: settings.feed_concurrency,
            max_articles_per_feed: settings.max_articles_per_feed,
        }))
    }

    pub fn with_fetch_options(mut self, fetch: FetchOptions) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_rank_params(mut self, rank: RankParams, limits: ContextLimits) -> Self {
        self.rank = rank;
        self.limits = limits;
        self
    }

    pub fn has_mailer(&self) -> bool {
        self.mailer.is_some()
    }

    /// Run with HTTP feed providers built from `config.feeds`.
    pub async fn run(&self, config: &NewsletterConfig) -> RunResult {
        let providers: Vec<Arc<dyn FeedProvider>> = config
            .feeds
            .iter()
            .map(|f| {
                Arc::new(RssFeedProvider::from_url(f.clone(), self.http.clone()))
                    as Arc<dyn FeedProvider>
            })
            .collect();
        self.run_with_providers(config, &providers).await
    }

    pub async fn run_with_providers(
        &self,
        config: &NewsletterConfig,
        providers: &[Arc<dyn FeedProvider>],
    ) -> RunResult {
        ensure_metrics_described();
        counter!("digest_runs_total").increment(1);
        let started_at = Utc::now();
        tracing::info!(target: "pipeline", newsletter = %config.name, feeds = providers.len(), "starting run");

        let result = match self.execute(config, providers, started_at).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(target: "pipeline", newsletter = %config.name, error = ?e, "run failed");
                RunResult::failed(&config.name, started_at, format!("{e:#}"))
            }
        };
        if !result.success {
            counter!("digest_run_failures_total").increment(1);
        }
        tracing::info!(
            target: "pipeline",
            newsletter = %config.name,
            success = result.success,
            provider = %result.ai_provider,
            articles = result.article_count,
            "run finished"
        );
        result
    }

    async fn execute(
        &self,
        config: &NewsletterConfig,
        providers: &[Arc<dyn FeedProvider>],
        started_at: DateTime<Utc>,
    ) -> Result<RunResult> {
        let fetched = fetch_all(providers, self.fetch).await;
        let ranked = rank_articles(&fetched.articles, self.rank);
        histogram!("digest_ranked_entries").record(ranked.len() as f64);

        let watchlist = config.normalized_watchlist();
        let market_text = if watchlist.is_empty() {
            None
        } else {
            let quotes = self.quotes.fetch_quotes(&watchlist).await;
            (!quotes.is_empty()).then(|| format_market_data(&quotes))
        };

        let articles_text = build_article_context(&fetched.articles, &ranked, self.limits);
        let prompt = build_prompt(&PromptInputs {
            articles_text: &articles_text,
            market_text: market_text.as_deref(),
            watchlist: &watchlist,
            newsletter_type: Some(config.newsletter_type.as_str()),
            custom_prompt: Some(config.custom_prompt.as_str()),
        });

        let output = self
            .cascade
            .generate(GenerateRequest {
                prompt: &prompt,
                system_prompt: Some(system_prompt()),
                verbosity: Some(config.verbosity.as_str()),
            })
            .await;
        if let Some(u) = &output.usage {
            tracing::info!(
                target: "pipeline",
                provider = %output.provider,
                prompt = ?u.prompt_tokens,
                completion = ?u.completion_tokens,
                total = ?u.total_tokens,
                "ai usage"
            );
        }

        let meta = DigestMetadata {
            newsletter_name: config.name.clone(),
            ai_provider: output.provider.clone(),
            article_count: fetched.articles.len(),
            feed_successes: fetched.successes(),
            feed_total: fetched.statuses.len(),
            run_started_at: started_at,
        };
        let html = self.renderer.render(&output.text, &meta);
        let subject = digest_subject(&config.name, started_at);

        let (success, error) = match &self.mailer {
            None => {
                tracing::warn!(target: "pipeline", newsletter = %config.name, "{MAILER_MISSING}");
                (false, Some(MAILER_MISSING.to_string()))
            }
            Some(mailer) => {
                let digest = OutgoingDigest {
                    subject: subject.clone(),
                    html: html.clone(),
                    text: output.text.clone(),
                    recipients: config.recipients.clone(),
                };
                match mailer.send(&digest).await {
                    Ok(()) => (true, None),
                    Err(e) => {
                        tracing::warn!(target: "pipeline", error = %e, "email send failed");
                        (false, Some(format!("Email send failed: {e:#}")))
                    }
                }
            }
        };

        Ok(RunResult {
            newsletter: config.name.clone(),
            success,
            ai_provider: output.provider,
            article_count: fetched.articles.len(),
            feed_statuses: fetched.statuses,
            started_at,
            finished_at: Utc::now(),
            error,
            token_usage: output.usage,
            subject: Some(subject),
            html_content: Some(html),
        })
    }
}
