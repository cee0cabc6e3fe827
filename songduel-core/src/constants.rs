/// Rating assigned to a freshly imported item that has never been compared.
pub const INITIAL_SCORE: i32 = 1000;

/// No item can ever be rated below this value.
pub const SCORE_FLOOR: i32 = 100;

/// K-factor for an ordinary win.
pub const BASE_K_FACTOR: f64 = 32.0;

/// K-factor for a "boosted" win, where the user explicitly amplifies one result.
pub const BOOSTED_K_FACTOR: f64 = 64.0;

/// Half-width of the uniform noise added to every raw Elo result.
///
/// Small enough to never flip the direction of a typical update (a win
/// between equal items moves the score by 16), large enough to keep two items
/// with an identical history from sitting on the same number forever.
pub const SCORE_NOISE: f64 = 5.0;

/// Divisor in the logistic expected-score term. A 400 point gap means the
/// stronger item is expected to win ten times out of eleven.
pub const ELO_SCALE: f64 = 400.0;

/// Probability that a default-mode selection uses the taste-breaking
/// (low quartile vs high quartile) strategy instead of a uniform pick.
pub const EXPLORATION_RATE: f64 = 0.2;

/// Fraction of the collection that counts as "top" or "bottom" for
/// taste-breaking selections.
pub const QUARTILE_FRACTION: f64 = 0.25;

/// Grace period between a soft removal and the durable delete, in milliseconds.
pub const UNDO_WINDOW_MS: u64 = 3000;
