// Feature Encoder
//
// Pure feature extraction: maps user and post records plus aggregated
// interaction statistics into fixed-dimension f32 embeddings. No I/O happens
// here; callers fetch the inputs and the jobs persist the outputs.
//
// Every sub-feature lands in [0, 1] before concatenation. The raw feature
// vectors (`user_features` / `post_features`) are exposed separately from the
// final encodings so the exact defaults and ratios stay observable; the
// encode functions pad/truncate to the space dimension and L2-normalize.

mod post;
mod user;

pub use post::{encode_post, post_features};
pub use user::{derive_genre_weights, encode_user, user_features};

use chrono::{DateTime, Timelike, Utc};

use crate::models::{PostInteraction, TrailerInteraction};

/// Runtime ceiling for preference normalization (minutes).
pub const MAX_RUNTIME_MINUTES: f32 = 240.0;
/// Release-year range for normalization.
pub const MIN_YEAR: f32 = 1900.0;
pub const MAX_YEAR: f32 = 2030.0;
/// Engagement duration ceiling for post viewing (seconds, 30 minutes).
pub const MAX_POST_WATCH_SECS: f32 = 1800.0;
/// Engagement duration ceiling for trailer viewing (seconds, 5 minutes).
pub const MAX_TRAILER_WATCH_SECS: f32 = 300.0;
/// Replay ceiling for the log-scaled trailer replay feature.
pub const MAX_TRAILER_REPLAYS: f32 = 5.0;
/// ln(1 + 22_000) is roughly 10, so dividing squashes realistic vote counts
/// into the unit interval.
pub const VOTE_COUNT_LOG_DIVISOR: f32 = 10.0;
/// Popularity scores are unbounded; scale before the sigmoid squash.
pub const POPULARITY_SIGMOID_SCALE: f32 = 100.0;

/// Documented defaults when a user has no interaction history.
pub const DEFAULT_LIKE_RATIO: f32 = 0.5;
pub const DEFAULT_SAVE_RATIO: f32 = 0.5;
pub const DEFAULT_COMMENT_RATIO: f32 = 0.2;
pub const DEFAULT_DURATION_NORM: f32 = 0.5;
pub const DEFAULT_TIME_BUCKET: f32 = 0.25;

/// Ratio/duration summary over one kind of interaction window. Shared by the
/// encoder and the behavior profiler so both report identical arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionSummary {
    pub count: usize,
    pub like_ratio: f32,
    pub save_ratio: f32,
    pub comment_ratio: f32,
    /// Mean engagement duration, capped against the given ceiling and
    /// normalized into [0, 1].
    pub avg_duration_norm: f32,
}

impl InteractionSummary {
    /// Defaults used when the window is empty.
    pub fn default_summary() -> Self {
        Self {
            count: 0,
            like_ratio: DEFAULT_LIKE_RATIO,
            save_ratio: DEFAULT_SAVE_RATIO,
            comment_ratio: DEFAULT_COMMENT_RATIO,
            avg_duration_norm: DEFAULT_DURATION_NORM,
        }
    }

    pub fn from_posts(interactions: &[PostInteraction]) -> Self {
        if interactions.is_empty() {
            return Self::default_summary();
        }

        let count = interactions.len();
        let total = count as f32;
        let likes = interactions.iter().filter(|i| i.liked).count() as f32;
        let saves = interactions.iter().filter(|i| i.saved).count() as f32;
        let comments = interactions.iter().filter(|i| i.comment_pressed).count() as f32;
        let avg_secs =
            interactions.iter().map(|i| i.duration_seconds()).sum::<f64>() as f32 / total;

        Self {
            count,
            like_ratio: likes / total,
            save_ratio: saves / total,
            comment_ratio: comments / total,
            avg_duration_norm: (avg_secs.min(MAX_POST_WATCH_SECS)) / MAX_POST_WATCH_SECS,
        }
    }

    pub fn from_trailers(interactions: &[TrailerInteraction]) -> Self {
        if interactions.is_empty() {
            return Self::default_summary();
        }

        let count = interactions.len();
        let total = count as f32;
        let likes = interactions.iter().filter(|i| i.liked).count() as f32;
        let saves = interactions.iter().filter(|i| i.saved).count() as f32;
        let comments = interactions.iter().filter(|i| i.comment_pressed).count() as f32;
        let avg_secs =
            interactions.iter().map(|i| i.duration_seconds()).sum::<f64>() as f32 / total;

        Self {
            count,
            like_ratio: likes / total,
            save_ratio: saves / total,
            comment_ratio: comments / total,
            avg_duration_norm: (avg_secs.min(MAX_TRAILER_WATCH_SECS)) / MAX_TRAILER_WATCH_SECS,
        }
    }
}

/// Trailer-only signals layered on top of the base summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailerSignals {
    pub mute_ratio: f32,
    /// ln(1 + avg replays) / ln(1 + ceiling), clamped.
    pub replay_norm: f32,
}

impl TrailerSignals {
    pub fn from_trailers(interactions: &[TrailerInteraction]) -> Self {
        if interactions.is_empty() {
            return Self {
                mute_ratio: 0.0,
                replay_norm: 0.0,
            };
        }

        let total = interactions.len() as f32;
        let muted = interactions.iter().filter(|i| i.muted).count() as f32;
        let avg_replays =
            interactions.iter().map(|i| i.replay_count.max(0) as f32).sum::<f32>() / total;
        let replay_norm =
            ((1.0 + avg_replays).ln() / (1.0 + MAX_TRAILER_REPLAYS).ln()).clamp(0.0, 1.0);

        Self {
            mute_ratio: muted / total,
            replay_norm,
        }
    }
}

/// Four-bucket time-of-day distribution over interaction start times:
/// morning 06-12, afternoon 12-18, evening 18-24, night 00-06. Uniform 0.25
/// when there is no data.
pub fn time_of_day_distribution(starts: &[DateTime<Utc>]) -> [f32; 4] {
    if starts.is_empty() {
        return [DEFAULT_TIME_BUCKET; 4];
    }

    let mut buckets = [0u32; 4];
    for start in starts {
        let bucket = match start.hour() {
            6..=11 => 0,
            12..=17 => 1,
            18..=23 => 2,
            _ => 3,
        };
        buckets[bucket] += 1;
    }

    let total = starts.len() as f32;
    [
        buckets[0] as f32 / total,
        buckets[1] as f32 / total,
        buckets[2] as f32 / total,
        buckets[3] as f32 / total,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post_interaction(liked: bool, saved: bool, commented: bool) -> PostInteraction {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        PostInteraction {
            user_id: 1,
            post_id: 10,
            started_at: start,
            ended_at: Some(start + chrono::Duration::seconds(600)),
            liked,
            saved,
            comment_pressed: commented,
        }
    }

    #[test]
    fn test_empty_window_uses_documented_defaults() {
        let summary = InteractionSummary::from_posts(&[]);
        assert_eq!(summary.like_ratio, 0.5);
        assert_eq!(summary.save_ratio, 0.5);
        assert_eq!(summary.comment_ratio, 0.2);
        assert_eq!(summary.avg_duration_norm, 0.5);
    }

    #[test]
    fn test_like_ratio_exact() {
        // 10 interactions, 6 liked.
        let mut interactions: Vec<PostInteraction> =
            (0..6).map(|_| post_interaction(true, false, false)).collect();
        interactions.extend((0..4).map(|_| post_interaction(false, false, false)));

        let summary = InteractionSummary::from_posts(&interactions);
        assert_eq!(summary.like_ratio, 0.6);
        assert_eq!(summary.save_ratio, 0.0);
        // 600s of 1800s ceiling.
        assert!((summary.avg_duration_norm - 600.0 / 1800.0).abs() < 1e-6);
    }

    #[test]
    fn test_duration_capped_at_ceiling() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let long = PostInteraction {
            user_id: 1,
            post_id: 10,
            started_at: start,
            ended_at: Some(start + chrono::Duration::hours(3)),
            liked: false,
            saved: false,
            comment_pressed: false,
        };
        let summary = InteractionSummary::from_posts(&[long]);
        assert_eq!(summary.avg_duration_norm, 1.0);
    }

    #[test]
    fn test_trailer_signals() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 22, 30, 0).unwrap();
        let make = |muted, replays| TrailerInteraction {
            user_id: 1,
            post_id: 7,
            started_at: start,
            ended_at: Some(start + chrono::Duration::seconds(90)),
            liked: false,
            saved: false,
            comment_pressed: false,
            muted,
            replay_count: replays,
        };

        let signals = TrailerSignals::from_trailers(&[make(true, 5), make(false, 5)]);
        assert_eq!(signals.mute_ratio, 0.5);
        // Average replays at the ceiling saturates the log scale.
        assert!((signals.replay_norm - 1.0).abs() < 1e-6);

        let none = TrailerSignals::from_trailers(&[]);
        assert_eq!(none.mute_ratio, 0.0);
        assert_eq!(none.replay_norm, 0.0);
    }

    #[test]
    fn test_time_of_day_distribution() {
        let at = |hour| Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap();
        let dist = time_of_day_distribution(&[at(8), at(9), at(14), at(23)]);
        assert_eq!(dist, [0.5, 0.25, 0.25, 0.0]);

        assert_eq!(time_of_day_distribution(&[]), [0.25; 4]);
    }
}
