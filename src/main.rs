//! Market Digest binary entrypoint.
//! Loads settings and newsletters, starts the per-newsletter schedulers and serves the
//! admin router.

use anyhow::Context;
use shuttle_axum::ShuttleAxum;

use market_digest::api::{self, AppState};
use market_digest::config::{newsletters::load_newsletters_default, Settings};
use market_digest::metrics::Metrics;
use market_digest::pipeline::NewsletterPipeline;
use market_digest::scheduler::spawn_newsletter_scheduler;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    market_digest::init_tracing();

    let settings = Settings::from_env().context("loading settings")?;
    let newsletters = load_newsletters_default(settings.newsletters_path.as_deref())
        .context("loading newsletters")?;
    tracing::info!(
        app = %settings.app_name,
        environment = %settings.environment,
        newsletters = newsletters.len(),
        "starting"
    );

    let metrics = Metrics::init(newsletters.len())?;
    let pipeline = NewsletterPipeline::from_settings(&settings)?;
    let state = AppState::new(settings, pipeline, newsletters);

    let handles = spawn_newsletter_scheduler(
        state.pipeline.clone(),
        state.history.clone(),
        state.newsletters.as_ref().clone(),
        state.settings.default_send_times.clone(),
    );
    tracing::info!(schedulers = handles.len(), "newsletter schedulers running");

    let router = api::router(state).merge(metrics.router());
    Ok(router.into())
}
