use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe every series up front so
    /// `/metrics` lists them before the first run.
    pub fn init(newsletters: usize) -> Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_all();
        gauge!("digest_newsletters_configured").set(newsletters as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

pub fn describe_all() {
    describe_counter!("digest_feed_fetch_total", "Feeds fetched (success or failure).");
    describe_counter!("digest_feed_errors_total", "Feed fetch/parse errors.");
    describe_counter!("digest_articles_total", "Articles kept after normalization.");
    describe_histogram!("digest_fetch_ms", "Wall time of one fetch_all pass in milliseconds.");
    describe_histogram!("digest_ranked_entries", "Aggregated stories per run.");
    describe_counter!("digest_runs_total", "Newsletter runs started.");
    describe_counter!("digest_run_failures_total", "Newsletter runs that did not deliver.");
    describe_counter!("digest_ai_fallbacks_total", "Runs answered by a non-primary AI provider.");
    describe_gauge!("digest_newsletters_configured", "Newsletters loaded at startup.");
}
