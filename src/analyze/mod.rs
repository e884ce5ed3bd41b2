// src/analyze/mod.rs
//! Analysis core: dedup keys, aggregation + scoring, and the prompt context.
//! Everything here except `ai_adapter` is pure and infallible.

pub mod ai_adapter;
pub mod context;
pub mod dedup;
pub mod rank;
pub mod scoring;

// Re-export convenient types.
pub use crate::analyze::context::{build_article_context, ContextLimits};
pub use crate::analyze::dedup::article_key;
pub use crate::analyze::rank::{
    parse_published_at, rank_articles, rank_articles_at, rank_articles_with, AggregateEntry,
};
pub use crate::analyze::scoring::{RankParams, ScoreWeights};
