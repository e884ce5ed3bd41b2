// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod prompt;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use crate::analyze::{article_key, build_article_context, rank_articles, rank_articles_at};
pub use crate::api::router;
pub use crate::ingest::types::Article;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
/// Safe to call more than once (later calls are no-ops).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_digest=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json().with_current_span(false)).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
