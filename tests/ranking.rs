// tests/ranking.rs
//
// Behavioural checks for the aggregation + scoring core, always against a fixed `now`.

use chrono::{DateTime, Duration, TimeZone, Utc};

use market_digest::analyze::{rank_articles, rank_articles_at, RankParams};
use market_digest::Article;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
}

fn art(title: &str, link: &str, source: &str, hours_ago: Option<i64>) -> Article {
    Article {
        title: title.into(),
        description: String::new(),
        link: link.into(),
        source: source.into(),
        published_at: hours_ago.map(|h| (now() - Duration::hours(h)).to_rfc3339()),
        category: None,
    }
}

#[test]
fn corroborated_story_beats_fresher_single_mention() {
    let articles = vec![
        art("Fed Raises Rates", "https://x/fed", "Feed A", Some(3)),
        art("Fed Raises Rates", "https://x/fed", "Feed B", Some(3)),
        art("Local Bakery Opens", "https://x/bakery", "Feed C", Some(1)),
    ];
    let ranked = rank_articles_at(&articles, RankParams::default(), now());

    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].title, "Fed Raises Rates");
    assert_eq!(ranked[0].mention_count, 2);
    assert_eq!(ranked[0].sources, vec!["Feed A", "Feed B"]);
    assert_eq!(ranked[1].title, "Local Bakery Opens");
    assert_eq!(ranked[1].mention_count, 1);

    // 2.5*2 + 0.5*2 + 3*(1 - 3/72) + 2*1
    assert!((ranked[0].score - 10.875).abs() < 1e-9);
}

#[test]
fn ranking_is_idempotent() {
    let articles = vec![
        art("A", "https://x/a", "Feed A", Some(5)),
        art("B", "https://x/b", "Feed B", None),
        art("A again", "https://x/a#frag", "Feed C", Some(2)),
        art("C", "", "Feed A", Some(30)),
    ];
    let first = rank_articles_at(&articles, RankParams::default(), now());
    let second = rank_articles_at(&articles, RankParams::default(), now());
    assert_eq!(first, second);
}

#[test]
fn same_link_modulo_case_and_fragment_collapses() {
    let articles = vec![
        art("One", "https://Example.com/Story", "Feed A", Some(1)),
        art("One", "https://example.com/story#comments", "Feed B", Some(2)),
        art("One", "  https://EXAMPLE.com/story  ", "Feed A", None),
        art("Other", "https://example.com/other", "Feed A", Some(1)),
    ];
    let ranked = rank_articles_at(&articles, RankParams::default(), now());
    assert_eq!(ranked.len(), 2);
    let story = ranked.iter().find(|e| e.title == "One").unwrap();
    assert_eq!(story.mention_count, 3);
    assert_eq!(story.sources, vec!["Feed A", "Feed B"]);
}

#[test]
fn fresher_single_mention_ranks_first() {
    let articles = vec![
        art("Older", "https://x/older", "Feed A", Some(30)),
        art("Newer", "https://x/newer", "Feed A", Some(10)),
    ];
    let ranked = rank_articles_at(&articles, RankParams::default(), now());
    assert_eq!(ranked[0].title, "Newer");
    assert!(ranked[0].score > ranked[1].score);
}

#[test]
fn more_distinct_sources_rank_first_at_equal_age() {
    let articles = vec![
        art("Echo", "https://x/echo", "Feed A", Some(4)),
        art("Echo", "https://x/echo", "Feed A", Some(4)),
        art("Spread", "https://x/spread", "Feed A", Some(4)),
        art("Spread", "https://x/spread", "Feed B", Some(4)),
    ];
    let ranked = rank_articles_at(&articles, RankParams::default(), now());
    assert_eq!(ranked[0].title, "Spread");
    assert_eq!(ranked[0].latest, ranked[1].latest);
    assert_eq!(ranked[1].mention_count, 2);
    assert_eq!(ranked[1].sources, vec!["Feed A"]);
}

#[test]
fn equal_score_and_age_fall_back_to_mention_count() {
    // 2 sources x 2 mentions and 1 source x 7 mentions both give 2.5*s + 0.5*m = 6.0
    let mut articles = vec![
        art("Two", "https://x/two", "Feed A", Some(4)),
        art("Two", "https://x/two", "Feed B", Some(4)),
    ];
    articles.extend((0..7).map(|_| art("Seven", "https://x/seven", "Feed C", Some(4))));

    let ranked = rank_articles_at(&articles, RankParams::default(), now());
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].score, ranked[1].score);
    assert_eq!(ranked[0].latest, ranked[1].latest);
    assert_eq!(ranked[0].title, "Seven");
    assert_eq!(ranked[0].mention_count, 7);
    assert_eq!(ranked[1].title, "Two");
}

#[test]
fn undated_stories_sink_but_are_kept() {
    let articles = vec![
        art("Undated", "https://x/u", "Feed A", None),
        art("Dated", "https://x/d", "Feed A", Some(48)),
    ];
    let ranked = rank_articles_at(&articles, RankParams::default(), now());
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[1].title, "Undated");
    assert!(ranked[1].latest.is_none());
}

#[test]
fn unparsable_timestamp_is_treated_as_missing() {
    let mut a = art("Weird date", "https://x/w", "Feed A", None);
    a.published_at = Some("yesterday-ish".into());
    let ranked = rank_articles_at(&[a], RankParams::default(), now());
    assert_eq!(ranked.len(), 1);
    assert!(ranked[0].latest.is_none());
}

#[test]
fn degenerate_windows_are_clamped() {
    let articles = vec![art("A", "https://x/a", "Feed A", Some(2))];
    let ranked = rank_articles_at(&articles, RankParams::new(0, -10), now());
    assert!(ranked[0].score.is_finite());
}

#[test]
fn empty_input_is_empty_output() {
    assert!(rank_articles(&[], RankParams::default()).is_empty());
}
