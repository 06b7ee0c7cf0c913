// User-side feature extraction.
//
// Raw layout (before padding/normalization):
//   [0]            preferred runtime, midpoint-normalized against 240 min
//   [1]            preferred release-year midpoint, normalized over 1900-2030
//   [2 .. 2+G]     genre weights, one slot per genre in the snapshot
//   [2+G .. 2+G+4] post interaction ratios + capped average duration
//   [.. +6]        trailer ratios + duration + mute ratio + log replays
//   [.. +4]        time-of-day distribution
//
// G follows the genre snapshot, so the raw width varies with the catalog;
// `encode_user` fits the result to USER_VECTOR_DIM and L2-normalizes.

use std::collections::HashMap;

use super::{
    time_of_day_distribution, InteractionSummary, TrailerSignals, DEFAULT_DURATION_NORM,
    MAX_RUNTIME_MINUTES, MAX_YEAR, MIN_YEAR,
};
use crate::models::{GenrePreference, PostInteraction, TrailerInteraction, User, USER_VECTOR_DIM};
use crate::services::catalog::GenreSnapshot;
use crate::utils::{clamp01, fit_dimension, l2_normalize};

/// Encode a user into the user embedding space.
pub fn encode_user(
    user: &User,
    preferences: &[GenrePreference],
    post_interactions: &[PostInteraction],
    trailer_interactions: &[TrailerInteraction],
    post_genres: &HashMap<i64, Vec<i64>>,
    genres: &GenreSnapshot,
) -> Vec<f32> {
    let mut features = user_features(
        user,
        preferences,
        post_interactions,
        trailer_interactions,
        post_genres,
        genres,
    );
    features = fit_dimension(features, USER_VECTOR_DIM);
    l2_normalize(&mut features);
    features
}

/// Raw user feature vector, each component in [0, 1].
pub fn user_features(
    user: &User,
    preferences: &[GenrePreference],
    post_interactions: &[PostInteraction],
    trailer_interactions: &[TrailerInteraction],
    post_genres: &HashMap<i64, Vec<i64>>,
    genres: &GenreSnapshot,
) -> Vec<f32> {
    let mut features = Vec::with_capacity(16 + genres.len());

    features.push(runtime_preference(user));
    features.push(year_preference(user));

    features.extend(genre_block(
        preferences,
        post_interactions,
        post_genres,
        genres,
    ));

    let posts = InteractionSummary::from_posts(post_interactions);
    features.push(posts.like_ratio);
    features.push(posts.save_ratio);
    features.push(posts.comment_ratio);
    features.push(posts.avg_duration_norm);

    let trailers = InteractionSummary::from_trailers(trailer_interactions);
    let signals = TrailerSignals::from_trailers(trailer_interactions);
    features.push(trailers.like_ratio);
    features.push(trailers.save_ratio);
    features.push(trailers.comment_ratio);
    features.push(trailers.avg_duration_norm);
    features.push(signals.mute_ratio);
    features.push(signals.replay_norm);

    let mut starts: Vec<_> = post_interactions.iter().map(|i| i.started_at).collect();
    starts.extend(trailer_interactions.iter().map(|i| i.started_at));
    features.extend(time_of_day_distribution(&starts));

    features
}

fn runtime_preference(user: &User) -> f32 {
    match user.preferred_runtime_minutes {
        Some(minutes) => clamp01(minutes as f32 / MAX_RUNTIME_MINUTES),
        None => DEFAULT_DURATION_NORM,
    }
}

fn year_preference(user: &User) -> f32 {
    match (user.preferred_year_min, user.preferred_year_max) {
        (Some(min), Some(max)) => {
            let midpoint = (min + max) as f32 / 2.0;
            clamp01((midpoint - MIN_YEAR) / (MAX_YEAR - MIN_YEAR))
        }
        (Some(year), None) | (None, Some(year)) => {
            clamp01((year as f32 - MIN_YEAR) / (MAX_YEAR - MIN_YEAR))
        }
        (None, None) => 0.5,
    }
}

/// One weight slot per genre in the snapshot. Explicit preferences win
/// (priority 0-10 mapped to 0-1); a user without any falls back to weights
/// derived from their interaction history.
fn genre_block(
    preferences: &[GenrePreference],
    post_interactions: &[PostInteraction],
    post_genres: &HashMap<i64, Vec<i64>>,
    genres: &GenreSnapshot,
) -> Vec<f32> {
    let mut block = vec![0.0f32; genres.len()];

    if !preferences.is_empty() {
        for pref in preferences {
            if let Some(pos) = genres.position(pref.genre_id) {
                block[pos] = clamp01(pref.priority as f32 / 10.0);
            }
        }
        return block;
    }

    for (genre_id, weight) in derive_genre_weights(post_interactions, post_genres, genres) {
        if let Some(pos) = genres.position(genre_id) {
            block[pos] = weight;
        }
    }
    block
}

/// Interaction-derived genre weighting: for each genre,
/// `weight = share * (1 + like_ratio)` clamped to [0, 1], where `share` is
/// the fraction of the window touching the genre and `like_ratio` is taken
/// over those same interactions. Also persisted as the user's derived
/// preferences by the refresh jobs.
pub fn derive_genre_weights(
    post_interactions: &[PostInteraction],
    post_genres: &HashMap<i64, Vec<i64>>,
    genres: &GenreSnapshot,
) -> HashMap<i64, f32> {
    let mut weights = HashMap::new();
    if post_interactions.is_empty() {
        return weights;
    }

    let total = post_interactions.len() as f32;
    let mut touches: HashMap<i64, (u32, u32)> = HashMap::new(); // genre -> (count, likes)

    for interaction in post_interactions {
        let Some(genre_ids) = post_genres.get(&interaction.post_id) else {
            continue;
        };
        for genre_id in genre_ids {
            let entry = touches.entry(*genre_id).or_insert((0, 0));
            entry.0 += 1;
            if interaction.liked {
                entry.1 += 1;
            }
        }
    }

    for (genre_id, (count, likes)) in touches {
        if genres.position(genre_id).is_none() {
            continue;
        }
        let share = count as f32 / total;
        let like_ratio = likes as f32 / count as f32;
        weights.insert(genre_id, clamp01(share * (1.0 + like_ratio)));
    }

    weights
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
                    id: 35,
                    name: "Comedy".into(),
                },
            ],
        )
    }

    fn user() -> User {
        User {
            id: 1,
            preferred_runtime_minutes: Some(120),
            preferred_year_min: Some(2000),
            preferred_year_max: Some(2020),
            created_at: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn interaction(post_id: i64, liked: bool) -> PostInteraction {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        PostInteraction {
            user_id: 1,
            post_id,
            started_at: start,
            ended_at: Some(start + chrono::Duration::seconds(900)),
            liked,
            saved: false,
            comment_pressed: false,
        }
    }

    #[test]
    fn test_encode_user_is_unit_length_and_fixed_width() {
        let genres = snapshot();
        let encoded = encode_user(&user(), &[], &[], &[], &HashMap::new(), &genres);

        assert_eq!(encoded.len(), USER_VECTOR_DIM);
        let norm: f32 = encoded.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_encode_user_deterministic() {
        let genres = snapshot();
        let prefs = vec![GenrePreference {
            user_id: 1,
            genre_id: 28,
            priority: 8,
        }];
        let interactions = vec![interaction(10, true), interaction(11, false)];
        let post_genres: HashMap<i64, Vec<i64>> =
            [(10, vec![28]), (11, vec![35])].into_iter().collect();

        let a = encode_user(&user(), &prefs, &interactions, &[], &post_genres, &genres);
        let b = encode_user(&user(), &prefs, &interactions, &[], &post_genres, &genres);
        assert_eq!(a, b);
    }

    #[test]
    fn test_defaults_without_interaction_data() {
        let genres = snapshot();
        let raw = user_features(&user(), &[], &[], &[], &HashMap::new(), &genres);

        let g = genres.len();
        // Post block: like, save, comment, duration.
        assert_eq!(raw[2 + g], 0.5);
        assert_eq!(raw[2 + g + 1], 0.5);
        assert_eq!(raw[2 + g + 2], 0.2);
        assert_eq!(raw[2 + g + 3], 0.5);
        // Trailer block defaults.
        assert_eq!(raw[2 + g + 4], 0.5);
        assert_eq!(raw[2 + g + 6], 0.2);
        // Uniform time-of-day buckets at the tail.
        assert_eq!(&raw[raw.len() - 4..], &[0.25, 0.25, 0.25, 0.25]);
    }

    #[test]
    fn test_explicit_preferences_override_derived_weights() {
        let genres = snapshot();
        let prefs = vec![GenrePreference {
            user_id: 1,
            genre_id: 35,
            priority: 10,
        }];
        // Interactions all point at Action, but explicit prefs exist.
        let interactions = vec![interaction(10, true)];
        let post_genres: HashMap<i64, Vec<i64>> = [(10, vec![28])].into_iter().collect();

        let raw = user_features(&user(), &prefs, &interactions, &[], &post_genres, &genres);
        assert_eq!(raw[2], 0.0); // Action slot
        assert_eq!(raw[3], 1.0); // Comedy slot, priority 10/10
    }

    #[test]
    fn test_derive_genre_weights_clamped() {
        let genres = snapshot();
        // Every interaction is an Action like: share = 1.0, like_ratio = 1.0,
        // so the raw product 2.0 must clamp to 1.0.
        let interactions = vec![interaction(10, true), interaction(11, true)];
        let post_genres: HashMap<i64, Vec<i64>> =
            [(10, vec![28]), (11, vec![28])].into_iter().collect();

        let weights = derive_genre_weights(&interactions, &post_genres, &genres);
        assert_eq!(weights.get(&28), Some(&1.0));

        // Half the window, none liked: 0.5 * (1 + 0) = 0.5.
        let mixed = vec![interaction(10, false), interaction(12, false)];
        let mixed_genres: HashMap<i64, Vec<i64>> =
            [(10, vec![28]), (12, vec![35])].into_iter().collect();
        let weights = derive_genre_weights(&mixed, &mixed_genres, &genres);
        assert_eq!(weights.get(&28), Some(&0.5));
        assert_eq!(weights.get(&35), Some(&0.5));
    }

    #[test]
    fn test_unknown_genres_ignored() {
        let genres = snapshot();
        let interactions = vec![interaction(10, true)];
        let post_genres: HashMap<i64, Vec<i64>> = [(10, vec![999])].into_iter().collect();

        let weights = derive_genre_weights(&interactions, &post_genres, &genres);
        assert!(weights.is_empty());
    }
}
