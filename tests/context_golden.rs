// tests/context_golden.rs
//
// The context text is consumed verbatim by the prompt; pin the whole thing.

use chrono::{TimeZone, Utc};

use market_digest::analyze::{
    build_article_context, context::NO_ARTICLES_SENTINEL, rank_articles_at, AggregateEntry,
    ContextLimits, RankParams,
};
use market_digest::Article;

fn art(title: &str, desc: &str, link: &str, source: &str, published: &str) -> Article {
    Article {
        title: title.into(),
        description: desc.into(),
        link: link.into(),
        source: source.into(),
        published_at: Some(published.into()),
        category: None,
    }
}

#[test]
fn golden_context_output() {
    let articles = vec![
        art("Fed Raises Rates", "Policy rate up.", "https://x/fed", "Feed A", "2025-06-10T09:00:00Z"),
        art("Fed Raises Rates", "Second take.", "https://x/fed", "Feed B", "2025-06-10T09:00:00Z"),
        art("Local Bakery Opens", "", "https://x/bakery", "Feed C", "2025-06-10T11:00:00Z"),
    ];
    let now = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();
    let ranked = rank_articles_at(&articles, RankParams::default(), now);
    let out = build_article_context(&articles, &ranked, ContextLimits::default());

    let expected = "\
## Top stories (prioritized by recency & cross-feed mentions)
- **Fed Raises Rates** — mentioned in 2 feeds (Feed A, Feed B; published 2025-06-10 09:00 UTC)
  Policy rate up.
  Source: https://x/fed
- **Local Bakery Opens** — mentioned in 1 feed (Feed C; published 2025-06-10 11:00 UTC)
  Source: https://x/bakery

### Feed A (1 articles)
- **Fed Raises Rates**
  Policy rate up.
  Source: https://x/fed

### Feed B (1 articles)
- **Fed Raises Rates**
  Second take.
  Source: https://x/fed

### Feed C (1 articles)
- **Local Bakery Opens**
  Source: https://x/bakery";
    assert_eq!(out, expected);
}

#[test]
fn undated_entry_and_blank_title_in_top_section() {
    let entries = vec![
        AggregateEntry {
            title: "  ".into(),
            link: "https://x/blank".into(),
            summary: String::new(),
            latest: None,
            sources: vec!["Feed A".into()],
            mention_count: 1,
            score: 9.0,
        },
        AggregateEntry {
            title: "Quiet story".into(),
            link: String::new(),
            summary: "Nothing much.".into(),
            latest: None,
            sources: Vec::new(),
            mention_count: 1,
            score: 1.0,
        },
    ];
    let articles = vec![Article {
        title: "Quiet story".into(),
        ..Default::default()
    }];
    let limits = ContextLimits {
        top_limit: 2,
        per_source_limit: 5,
    };
    let out = build_article_context(&articles, &entries, limits);
    assert!(out.starts_with(
        "## Top stories (prioritized by recency & cross-feed mentions)\n\
         - **Quiet story** — mentioned in 1 feed (Unknown source; published Unknown time)\n  Nothing much.\n\n"
    ));
    assert!(!out.contains("https://x/blank"));
    assert!(out.ends_with("### Unknown (1 articles)\n- **Quiet story**"));
}

#[test]
fn top_limit_counts_skipped_entries() {
    let entries = vec![
        AggregateEntry {
            title: String::new(),
            link: String::new(),
            summary: String::new(),
            latest: None,
            sources: Vec::new(),
            mention_count: 1,
            score: 2.0,
        },
        AggregateEntry {
            title: "Second".into(),
            link: String::new(),
            summary: String::new(),
            latest: None,
            sources: Vec::new(),
            mention_count: 1,
            score: 1.0,
        },
    ];
    let articles = vec![Article {
        title: "x".into(),
        source: "S".into(),
        ..Default::default()
    }];
    let limits = ContextLimits {
        top_limit: 1,
        per_source_limit: 5,
    };
    let out = build_article_context(&articles, &entries, limits);
    assert!(!out.contains("**Second**"));
}

#[test]
fn no_articles_yields_sentinel() {
    let out = build_article_context(&[], &[], ContextLimits::default());
    assert_eq!(out, NO_ARTICLES_SENTINEL);
    assert!(!out.is_empty());
}
