/// Elo-style score updates for a single pairwise comparison.
///
/// Pure functions: no state, no IO. The only source of nondeterminism is the
/// caller-provided RNG used for the noise term.
use rand::Rng;

use crate::constants::ELO_SCALE;
use crate::types::Side;

/// Expected score of an item rated `rating` against one rated `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / ELO_SCALE))
}

/// New rating before noise and flooring. `actual` is 1.0 for a win, 0.0 for a loss.
pub fn raw_rating(rating: f64, opponent: f64, actual: f64, k_factor: f64) -> f64 {
    rating + k_factor * (actual - expected_score(rating, opponent))
}

/// Knobs for [`update_scores`] other than the K-factor.
#[derive(Debug, Clone, Copy)]
pub struct ScoreParams {
    pub k_factor: f64,
    pub noise: f64,
    pub floor: i32,
}

/// Apply one comparison outcome to both scores.
///
/// Each new score is `max(floor, round(raw + u))` with `u` uniform in
/// `[-noise, noise]`, drawn independently per side.
pub fn update_scores(
    score_a: i32,
    score_b: i32,
    winner: Side,
    params: ScoreParams,
    rng: &mut impl Rng,
) -> (i32, i32) {
    let (actual_a, actual_b) = match winner {
        Side::First => (1.0, 0.0),
        Side::Second => (0.0, 1.0),
    };
    let (a, b) = (score_a as f64, score_b as f64);

    let new_a = finalize(raw_rating(a, b, actual_a, params.k_factor), params, rng);
    let new_b = finalize(raw_rating(b, a, actual_b, params.k_factor), params, rng);
    (new_a, new_b)
}

fn finalize(raw: f64, params: ScoreParams, rng: &mut impl Rng) -> i32 {
    // Scale a unit draw so no noise amplitude can make the range itself invalid.
    let jitter = if params.noise > 0.0 {
        params.noise * rng.random_range(-1.0..=1.0_f64)
    } else {
        0.0
    };
    ((raw + jitter).round() as i32).max(params.floor)
}
