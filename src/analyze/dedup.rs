// src/analyze/dedup.rs
//! Identity key used to merge the same story reported by several feeds.

use crate::ingest::types::Article;

/// Link (lower-cased, fragment dropped) when present, else the lower-cased title.
///
/// An empty return value means the article cannot be keyed; callers leave it out of
/// the ranked aggregate.
pub fn article_key(article: &Article) -> String {
    let link = article.link.trim().to_lowercase();
    if !link.is_empty() {
        return match link.split_once('#') {
            Some((base, _fragment)) => base.to_string(),
            None => link,
        };
    }
    article.title.trim().to_lowercase()
}
