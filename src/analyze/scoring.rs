//! Ranking score for one aggregated story.
//!
//! score = w_spread * spread_factor + w_mentions * mention_count
//!       + w_recency * recency_bonus + w_recent * recent_boost
//!
//! - `spread_factor`  : min(distinct sources, mentions); one feed repeating itself
//!                      earns no extra corroboration
//! - `recency_bonus`  : linear decay to 0 over the decay window
//! - `recent_boost`   : 1.0 inside the "recent" horizon, then linear decay

use serde::{Deserialize, Serialize};

pub const DEFAULT_RECENT_HOURS: i64 = 24;
pub const DEFAULT_DECAY_WINDOW_HOURS: i64 = 72;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub w_spread: f64,
    pub w_mentions: f64,
    pub w_recency: f64,
    pub w_recent: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            w_spread: 2.5,
            w_mentions: 0.5,
            w_recency: 3.0,
            w_recent: 2.0,
        }
    }
}

/// Time horizons for the recency terms, in hours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankParams {
    pub recent_hours: i64,
    pub decay_window_hours: i64,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            recent_hours: DEFAULT_RECENT_HOURS,
            decay_window_hours: DEFAULT_DECAY_WINDOW_HOURS,
        }
    }
}

impl RankParams {
    pub fn new(recent_hours: i64, decay_window_hours: i64) -> Self {
        Self {
            recent_hours,
            decay_window_hours,
        }
    }

    /// `recent_hours >= 1` and `decay_window_hours >= recent_hours`.
    pub fn clamped(self) -> Self {
        let recent = self.recent_hours.max(1);
        Self {
            recent_hours: recent,
            decay_window_hours: self.decay_window_hours.max(recent),
        }
    }
}

/// Signals for one aggregate. `age_hours == None` means no timestamp was ever parsed.
#[derive(Clone, Copy, Debug)]
pub struct ScoreInputs {
    pub distinct_sources: usize,
    pub mention_count: usize,
    pub age_hours: Option<f64>,
}

/// Age used by the recency terms; undated stories count as maximally stale.
pub fn effective_age_hours(age_hours: Option<f64>, params: RankParams) -> f64 {
    let p = params.clamped();
    match age_hours {
        Some(h) => h.max(0.0),
        None => 2.0 * p.decay_window_hours as f64,
    }
}

pub fn recency_bonus(age_hours: f64, params: RankParams) -> f64 {
    let p = params.clamped();
    (1.0 - age_hours / p.decay_window_hours as f64).max(0.0)
}

pub fn recent_boost(age_hours: f64, params: RankParams) -> f64 {
    let p = params.clamped();
    let recent = p.recent_hours as f64;
    if age_hours <= recent {
        1.0
    } else {
        (1.0 - (age_hours - recent) / p.decay_window_hours as f64).max(0.0)
    }
}

pub fn spread_factor(distinct_sources: usize, mention_count: usize) -> usize {
    distinct_sources.min(mention_count)
}

pub fn score(inputs: &ScoreInputs, params: RankParams, w: &ScoreWeights) -> f64 {
    let age = effective_age_hours(inputs.age_hours, params);
    let spread = spread_factor(inputs.distinct_sources, inputs.mention_count) as f64;

    w.w_spread * spread
        + w.w_mentions * inputs.mention_count as f64
        + w.w_recency * recency_bonus(age, params)
        + w.w_recent * recent_boost(age, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn windows_are_clamped() {
        let p = RankParams::new(0, -5).clamped();
        assert_eq!(p, RankParams::new(1, 1));
        let p = RankParams::new(48, 24).clamped();
        assert_eq!(p.decay_window_hours, 48);
    }

    #[test]
    fn fresh_single_mention_scores_full_recency() {
        let s = score(
            &ScoreInputs {
                distinct_sources: 1,
                mention_count: 1,
                age_hours: Some(0.0),
            },
            RankParams::default(),
            &ScoreWeights::default(),
        );
        // 2.5 + 0.5 + 3.0 + 2.0
        assert!(close(s, 8.0));
    }

    #[test]
    fn undated_story_is_maximally_stale() {
        let p = RankParams::default();
        let age = effective_age_hours(None, p);
        assert!(close(age, 144.0));
        assert!(close(recency_bonus(age, p), 0.0));
        assert!(close(recent_boost(age, p), 0.0));
    }

    #[test]
    fn recent_boost_decays_after_recent_window() {
        let p = RankParams::default();
        assert!(close(recent_boost(24.0, p), 1.0));
        assert!(close(recent_boost(60.0, p), 0.5));
        assert!(close(recent_boost(200.0, p), 0.0));
    }

    #[test]
    fn repeated_feed_does_not_inflate_spread() {
        assert_eq!(spread_factor(1, 5), 1);
        assert_eq!(spread_factor(3, 3), 3);
    }

    #[test]
    fn future_timestamps_count_as_now() {
        assert!(close(effective_age_hours(Some(-3.0), RankParams::default()), 0.0));
    }
}
