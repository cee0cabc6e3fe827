/// Ordered, id-unique sequence of scored items for one user.
///
/// Positions matter: pairs are expressed as indices into this sequence, and an
/// undone removal goes back to the index it was taken from.
use std::collections::HashSet;

use crate::error::EngineError;
use crate::types::{Item, ItemId};

#[derive(Debug, Clone)]
pub struct Collection<M = ()> {
    items: Vec<Item<M>>,
}

impl<M> Default for Collection<M> {
    fn default() -> Self {
        Collection { items: Vec::new() }
    }
}

impl<M> Collection<M> {
    /// Build a collection, rejecting duplicate ids and scores below `floor`.
    pub fn from_items(items: Vec<Item<M>>, floor: i32) -> Result<Self, EngineError> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(item.id.as_str()) {
                return Err(EngineError::DuplicateId(item.id.clone()));
            }
            if item.score < floor {
                return Err(EngineError::ScoreBelowFloor {
                    id: item.id.clone(),
                    score: item.score,
                    floor,
                });
            }
        }
        Ok(Collection { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Item<M>] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&Item<M>> {
        self.items.get(index)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn scores(&self) -> Vec<i32> {
        self.items.iter().map(|item| item.score).collect()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    pub(crate) fn set_score(&mut self, index: usize, score: i32) {
        self.items[index].score = score;
    }

    pub(crate) fn remove(&mut self, index: usize) -> Item<M> {
        self.items.remove(index)
    }

    /// Insert at `index`, or at the end if the collection has shrunk since.
    /// Returns the index actually used.
    pub(crate) fn insert(&mut self, index: usize, item: Item<M>) -> usize {
        let at = index.min(self.items.len());
        self.items.insert(at, item);
        at
    }

    /// Items sorted by score descending. Ties keep collection order.
    pub fn ranked(&self) -> Vec<&Item<M>> {
        let mut ranked: Vec<&Item<M>> = self.items.iter().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }
}
