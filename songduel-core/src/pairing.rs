/// Pair selection for interactive duels.
///
/// All functions work on `usize` indices into the live collection and take
/// the RNG from the caller, so a seeded RNG gives reproducible pairs.
use rand::Rng;

use crate::constants::QUARTILE_FRACTION;
use crate::types::{Pair, Side};

/// How a default-mode selection picks its two items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SelectionMode {
    /// Taste-breaking: one item from the bottom quartile, one from the top.
    Exploration,
    /// Uniform pick of two distinct items, no score bias.
    Exploit,
}

/// Number of items in the top (and in the bottom) quartile of `n` items.
///
/// For `n >= 2` the two quartiles never overlap.
pub fn quartile_size(n: usize) -> usize {
    ((n as f64) * QUARTILE_FRACTION).ceil() as usize
}

/// Flip the exploration coin.
pub fn choose_mode(exploration_rate: f64, rng: &mut impl Rng) -> SelectionMode {
    if rng.random::<f64>() < exploration_rate {
        SelectionMode::Exploration
    } else {
        SelectionMode::Exploit
    }
}

// ---------------------------------------------------------------------------
// Default mode
// ---------------------------------------------------------------------------

/// Pick the next pair to compare. `scores[i]` is the score of item `i`.
///
/// Returns `None` when there are fewer than two items.
pub fn select_pair(scores: &[i32], exploration_rate: f64, rng: &mut impl Rng) -> Option<Pair> {
    if scores.len() < 2 {
        return None;
    }
    let mode = choose_mode(exploration_rate, rng);
    select_in_mode(scores, mode, rng)
}

/// Pick a pair using a specific mode instead of flipping the coin.
pub fn select_in_mode(scores: &[i32], mode: SelectionMode, rng: &mut impl Rng) -> Option<Pair> {
    let n = scores.len();
    if n < 2 {
        return None;
    }
    let pair = match mode {
        SelectionMode::Exploration => exploration_pair(scores, rng),
        SelectionMode::Exploit => exploit_pair(n, rng),
    };
    tracing::trace!(?mode, ?pair, "selected pair");
    Some(pair)
}

fn exploration_pair(scores: &[i32], rng: &mut impl Rng) -> Pair {
    let n = scores.len();

    // Rank a copy of the indices by score descending; the live order stays put.
    // Stable sort keeps ties in collection order.
    let mut by_score: Vec<usize> = (0..n).collect();
    by_score.sort_by(|&a, &b| scores[b].cmp(&scores[a]));

    let q = quartile_size(n);
    let high = by_score[rng.random_range(0..q)];
    let low = by_score[n - q + rng.random_range(0..q)];

    if rng.random::<f64>() < 0.5 {
        (low, high)
    } else {
        (high, low)
    }
}

/// Partial Fisher-Yates: only the last two slots are shuffled.
fn exploit_pair(n: usize, rng: &mut impl Rng) -> Pair {
    let mut indices: Vec<usize> = (0..n).collect();
    for i in (n - 2..n).rev() {
        let j = rng.random_range(0..=i);
        indices.swap(i, j);
    }
    (indices[n - 1], indices[n - 2])
}

// ---------------------------------------------------------------------------
// Fixed mode
// ---------------------------------------------------------------------------

/// Pick a partner for `fixed` among `len` items, keeping `fixed` on `fixed_side`.
///
/// Returns `None` if `fixed` is out of range or is the only item.
pub fn select_with_fixed(len: usize, fixed: usize, fixed_side: Side, rng: &mut impl Rng) -> Option<Pair> {
    if fixed >= len || len < 2 {
        return None;
    }
    // Uniform over the len - 1 indices other than `fixed`.
    let mut other = rng.random_range(0..len - 1);
    if other >= fixed {
        other += 1;
    }
    Some(match fixed_side {
        Side::First => (fixed, other),
        Side::Second => (other, fixed),
    })
}

/// Work out the pair to show after the item at `removed` was taken out.
///
/// `pair` is expressed in indices from before the removal, `new_len` is the
/// collection length after it. If the removed item was on screen its partner
/// stays on its side and gets a fresh opponent; otherwise both indices are
/// shifted so they keep pointing at the same items.
pub fn replace_removed(pair: Pair, removed: usize, new_len: usize, rng: &mut impl Rng) -> Option<Pair> {
    let shift = |i: usize| if i > removed { i - 1 } else { i };
    match Side::find(pair, removed) {
        Some(side) => {
            let survivor = shift(side.other().of(pair));
            select_with_fixed(new_len, survivor, side.other(), rng)
        }
        None => Some((shift(pair.0), shift(pair.1))),
    }
}

/// Shift `pair` so it keeps pointing at the same items after an insert at `at`.
pub fn shift_for_insert(pair: Pair, at: usize) -> Pair {
    let shift = |i: usize| if i >= at { i + 1 } else { i };
    (shift(pair.0), shift(pair.1))
}
