// Post-side feature extraction.
//
// Raw layout (before padding/normalization):
//   [0]        movie/TV flag (1.0 = movie)
//   [1]        normalized release year
//   [2]        normalized runtime
//   [3]        vote average / 10
//   [4]        ln(1 + vote_count) / 10
//   [5]        sigmoid-squashed popularity
//   [6..10]    viewer engagement aggregates (watch, views, like, save)
//   [10..10+G] one-hot genre membership

use super::{
    MAX_POST_WATCH_SECS, MAX_RUNTIME_MINUTES, MAX_YEAR, MIN_YEAR, POPULARITY_SIGMOID_SCALE,
    VOTE_COUNT_LOG_DIVISOR,
};
use crate::models::{Post, PostEngagementStats, POST_VECTOR_DIM};
use crate::services::catalog::GenreSnapshot;
use crate::utils::{clamp01, fit_dimension, l2_normalize, sigmoid};

/// Encode a post into the item embedding space.
pub fn encode_post(
    post: &Post,
    genre_ids: &[i64],
    engagement: &PostEngagementStats,
    genres: &GenreSnapshot,
) -> Vec<f32> {
    let mut features = post_features(post, genre_ids, engagement, genres);
    features = fit_dimension(features, POST_VECTOR_DIM);
    l2_normalize(&mut features);
    features
}

/// Raw post feature vector, each component in [0, 1].
pub fn post_features(
    post: &Post,
    genre_ids: &[i64],
    engagement: &PostEngagementStats,
    genres: &GenreSnapshot,
) -> Vec<f32> {
    let mut features = Vec::with_capacity(10 + genres.len());

    features.push(if post.is_movie() { 1.0 } else { 0.0 });

    features.push(match post.release_year {
        Some(year) => clamp01((year as f32 - MIN_YEAR) / (MAX_YEAR - MIN_YEAR)),
        None => 0.5,
    });

    features.push(match post.runtime_minutes {
        Some(minutes) => clamp01(minutes as f32 / MAX_RUNTIME_MINUTES),
        None => 0.5,
    });

    features.push(clamp01(post.vote_average.unwrap_or(0.0) as f32 / 10.0));

    let votes = post.vote_count.unwrap_or(0).max(0) as f32;
    features.push(clamp01((1.0 + votes).ln() / VOTE_COUNT_LOG_DIVISOR));

    features.push(sigmoid(
        post.popularity.unwrap_or(0.0) as f32 / POPULARITY_SIGMOID_SCALE,
    ));

    // Aggregated viewer engagement for this item.
    features.push(clamp01(
        engagement.avg_watch_seconds as f32 / MAX_POST_WATCH_SECS,
    ));
    let views = engagement.view_count.max(0) as f32;
    features.push(clamp01((1.0 + views).ln() / VOTE_COUNT_LOG_DIVISOR));
    features.push(clamp01(engagement.like_ratio as f32));
    features.push(clamp01(engagement.save_ratio as f32));

    let mut genre_block = vec![0.0f32; genres.len()];
    for genre_id in genre_ids {
        if let Some(pos) = genres.position(*genre_id) {
            genre_block[pos] = 1.0;
        }
    }
    features.extend(genre_block);

    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Genre;
    use chrono::{TimeZone, Utc};

    fn snapshot() -> GenreSnapshot {
        GenreSnapshot::new(
            1,
            vec![
                Genre {
                    id: 28,
                    name: "Action".into(),
                },
                Genre {
                    id: 18,
                    name: "Drama".into(),
                },
            ],
        )
    }

    fn post() -> Post {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        Post {
            id: 42,
            title: "Example".into(),
            media_type: "movie".into(),
            release_year: Some(2030),
            runtime_minutes: Some(120),
            vote_average: Some(7.5),
            vote_count: Some(22_000),
            popularity: Some(250.0),
            video_key: Some("abc123".into()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_encode_post_is_unit_length_and_fixed_width() {
        let genres = snapshot();
        let encoded = encode_post(&post(), &[28], &PostEngagementStats::default(), &genres);

        assert_eq!(encoded.len(), POST_VECTOR_DIM);
        let norm: f32 = encoded.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_scalar_features() {
        let genres = snapshot();
        let raw = post_features(&post(), &[28], &PostEngagementStats::default(), &genres);

        assert_eq!(raw[0], 1.0); // movie
        assert_eq!(raw[1], 1.0); // year 2030 is the ceiling
        assert!((raw[2] - 0.5).abs() < 1e-6); // 120 of 240 minutes
        assert!((raw[3] - 0.75).abs() < 1e-6); // vote average 7.5
        // ln(22_001) / 10 stays just inside the unit interval.
        assert!(raw[4] < 1.0 && raw[4] > 0.99);
        assert!(raw[5] > 0.5 && raw[5] < 1.0); // squashed popularity

        // One-hot genre block: Action set, Drama not.
        assert_eq!(raw[10], 1.0);
        assert_eq!(raw[11], 0.0);
    }

    #[test]
    fn test_missing_attributes_fall_back() {
        let genres = snapshot();
        let mut bare = post();
        bare.media_type = "tv".into();
        bare.release_year = None;
        bare.runtime_minutes = None;
        bare.vote_average = None;
        bare.vote_count = None;
        bare.popularity = None;

        let raw = post_features(&bare, &[], &PostEngagementStats::default(), &genres);
        assert_eq!(raw[0], 0.0);
        assert_eq!(raw[1], 0.5);
        assert_eq!(raw[2], 0.5);
        assert_eq!(raw[3], 0.0);
        assert_eq!(raw[4], 0.0);
        assert_eq!(raw[5], 0.5); // sigmoid(0)
    }

    #[test]
    fn test_engagement_block() {
        let genres = snapshot();
        let engagement = PostEngagementStats {
            post_id: 42,
            avg_watch_seconds: 900.0,
            view_count: 0,
            like_ratio: 0.6,
            save_ratio: 0.25,
        };
        let raw = post_features(&post(), &[], &engagement, &genres);

        assert!((raw[6] - 0.5).abs() < 1e-6); // 900 of 1800 seconds
        assert_eq!(raw[7], 0.0); // ln(1) = 0
        assert!((raw[8] - 0.6).abs() < 1e-6);
        assert!((raw[9] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_encode_post_deterministic() {
        let genres = snapshot();
        let engagement = PostEngagementStats::default();
        let a = encode_post(&post(), &[28, 18], &engagement, &genres);
        let b = encode_post(&post(), &[28, 18], &engagement, &genres);
        assert_eq!(a, b);
    }
}
