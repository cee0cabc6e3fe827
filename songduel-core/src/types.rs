use std::time::Duration;

use crate::constants::{
    BASE_K_FACTOR, BOOSTED_K_FACTOR, EXPLORATION_RATE, INITIAL_SCORE, SCORE_FLOOR, SCORE_NOISE,
    UNDO_WINDOW_MS,
};
use crate::error::EngineError;

/// Caller-provided identifier of an item. Opaque to the engine.
pub type ItemId = String;

/// Two distinct indices into the live collection, shown side by side.
pub type Pair = (usize, usize);

/// One ranked entity: a stable id, an Elo score and whatever the caller
/// wants to display next to it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Item<M = ()> {
    pub id: ItemId,
    pub score: i32,
    pub metadata: M,
}

impl<M> Item<M> {
    pub fn new(id: impl Into<ItemId>, score: i32, metadata: M) -> Self {
        Item { id: id.into(), score, metadata }
    }

    /// An item that has never been compared.
    pub fn unrated(id: impl Into<ItemId>, metadata: M) -> Self {
        Item::new(id, INITIAL_SCORE, metadata)
    }
}

/// Position within a [`Pair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Side {
    First,
    Second,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }

    /// The index on this side of `pair`.
    pub fn of(self, pair: Pair) -> usize {
        match self {
            Side::First => pair.0,
            Side::Second => pair.1,
        }
    }

    /// Which side of `pair` holds `index`, if any.
    pub fn find(pair: Pair, index: usize) -> Option<Side> {
        if pair.0 == index {
            Some(Side::First)
        } else if pair.1 == index {
            Some(Side::Second)
        } else {
            None
        }
    }
}

/// Tunables for scoring, selection and removal.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Chance that a default selection is a taste-breaking one.
    pub exploration_rate: f64,
    pub k_factor: f64,
    pub boosted_k_factor: f64,
    /// Half-width of the uniform noise added to each new score. 0 disables it.
    pub score_noise: f64,
    pub score_floor: i32,
    /// Grace period before a removal becomes durable.
    pub undo_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            exploration_rate: EXPLORATION_RATE,
            k_factor: BASE_K_FACTOR,
            boosted_k_factor: BOOSTED_K_FACTOR,
            score_noise: SCORE_NOISE,
            score_floor: SCORE_FLOOR,
            undo_window: Duration::from_millis(UNDO_WINDOW_MS),
        }
    }
}

impl EngineConfig {
    pub fn k_for(&self, boosted: bool) -> f64 {
        if boosted { self.boosted_k_factor } else { self.k_factor }
    }

    /// Reject values the score model and the selection policy can't work with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.exploration_rate) {
            return Err(EngineError::InvalidConfig(format!(
                "exploration_rate must be between 0.0 and 1.0, got {}",
                self.exploration_rate
            )));
        }
        for (name, value) in [
            ("k_factor", self.k_factor),
            ("boosted_k_factor", self.boosted_k_factor),
            ("score_noise", self.score_noise),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be a finite, non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}
