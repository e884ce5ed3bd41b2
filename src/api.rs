use std::sync::Arc;

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::analyze::{
    build_article_context, rank_articles, AggregateEntry, ContextLimits, RankParams,
};
use crate::config::newsletters::NewsletterConfig;
use crate::config::Settings;
use crate::history::{RunHistory, RunRecord};
use crate::ingest::types::Article;
use crate::pipeline::NewsletterPipeline;

const DEFAULT_RUNS_LIMIT: usize = 20;
const MAX_RUNS_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub pipeline: Arc<NewsletterPipeline>,
    pub history: Arc<RunHistory>,
    pub newsletters: Arc<Vec<NewsletterConfig>>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        pipeline: NewsletterPipeline,
        newsletters: Vec<NewsletterConfig>,
    ) -> Self {
        let history = Arc::new(RunHistory::with_capacity(settings.run_history_cap));
        Self {
            settings: Arc::new(settings),
            pipeline: Arc::new(pipeline),
            history,
            newsletters: Arc::new(newsletters),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/runs", get(runs))
        .route("/newsletters", get(newsletters))
        .route("/newsletters/{name}/run", post(run_newsletter))
        .route("/preview", post(preview))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct NewsletterSummary {
    name: String,
    active: bool,
    newsletter_type: String,
    feeds: usize,
    watchlist: Vec<String>,
    schedule_times: Vec<String>,
    last_run: Option<RunRecord>,
}

#[derive(serde::Serialize)]
struct StatusOut {
    app: String,
    environment: String,
    mailer_configured: bool,
    newsletters: Vec<NewsletterSummary>,
    last_run: Option<RunRecord>,
    runs_today: usize,
    failures_today: usize,
}

/// Start of the current local day, as UTC.
fn local_midnight_utc() -> DateTime<Utc> {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc::now() - Duration::hours(24))
}

async fn status(State(state): State<AppState>) -> Json<StatusOut> {
    let (runs_today, failures_today) = state.history.counts_since(local_midnight_utc());
    let newsletters = state
        .newsletters
        .iter()
        .map(|n| NewsletterSummary {
            name: n.name.clone(),
            active: n.active,
            newsletter_type: n.newsletter_type.clone(),
            feeds: n.feeds.len(),
            watchlist: n.normalized_watchlist(),
            schedule_times: if n.schedule_times.is_empty() {
                state.settings.default_send_times.clone()
            } else {
                n.schedule_times.clone()
            },
            last_run: state.history.last_for(&n.name),
        })
        .collect();

    Json(StatusOut {
        app: state.settings.app_name.clone(),
        environment: state.settings.environment.clone(),
        mailer_configured: state.pipeline.has_mailer(),
        newsletters,
        last_run: state.history.last(),
        runs_today,
        failures_today,
    })
}

#[derive(serde::Deserialize)]
struct RunsQuery {
    limit: Option<usize>,
}

async fn runs(State(state): State<AppState>, Query(q): Query<RunsQuery>) -> Json<Vec<RunRecord>> {
    let n = q.limit.unwrap_or(DEFAULT_RUNS_LIMIT).clamp(1, MAX_RUNS_LIMIT);
    Json(state.history.recent(n))
}

async fn newsletters(State(state): State<AppState>) -> Json<Vec<NewsletterConfig>> {
    Json(state.newsletters.as_ref().clone())
}

async fn run_newsletter(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RunRecord>, (StatusCode, String)> {
    let Some(config) = state.newsletters.iter().find(|n| n.name == name) else {
        return Err((StatusCode::NOT_FOUND, format!("unknown newsletter '{name}'")));
    };
    tracing::info!(newsletter = %name, "manual run requested");
    let result = state.pipeline.run(config).await;
    Ok(Json(state.history.push(&result)))
}

#[derive(serde::Deserialize)]
struct PreviewReq {
    articles: Vec<Article>,
    #[serde(default)]
    top_limit: Option<usize>,
    #[serde(default)]
    per_source_limit: Option<usize>,
    #[serde(default)]
    recent_hours: Option<i64>,
    #[serde(default)]
    decay_window_hours: Option<i64>,
}

#[derive(serde::Serialize)]
struct PreviewOut {
    ranked: Vec<AggregateEntry>,
    context: String,
}

async fn preview(Json(body): Json<PreviewReq>) -> Json<PreviewOut> {
    let defaults = RankParams::default();
    let params = RankParams::new(
        body.recent_hours.unwrap_or(defaults.recent_hours),
        body.decay_window_hours.unwrap_or(defaults.decay_window_hours),
    );
    let limit_defaults = ContextLimits::default();
    let limits = ContextLimits {
        top_limit: body.top_limit.unwrap_or(limit_defaults.top_limit),
        per_source_limit: body.per_source_limit.unwrap_or(limit_defaults.per_source_limit),
    };

    let ranked = rank_articles(&body.articles, params);
    let context = build_article_context(&body.articles, &ranked, limits);
    Json(PreviewOut { ranked, context })
}
