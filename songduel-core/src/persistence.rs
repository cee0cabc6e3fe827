//! Durable-store port.
//!
//! The engine never waits on these calls for correctness: they run as
//! background tasks, and a failure is reported rather than rolled back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::PersistenceError;

/// Where scores and deletions end up.
///
/// Both operations must be idempotent from the engine's point of view: the
/// engine never retries, so any retry policy belongs in the implementation.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn update_score(&self, id: &str, score: i32) -> Result<(), PersistenceError>;
    async fn delete_item(&self, id: &str) -> Result<(), PersistenceError>;
}

/// In-memory store that records every call it receives.
///
/// Failures can be switched on per operation, which makes it the test double
/// for background-write behaviour as well as the store used by simulations.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
}

#[derive(Debug, Default)]
struct MemoryState {
    scores: HashMap<String, i32>,
    update_calls: Vec<(String, i32)>,
    delete_calls: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Make every following `update_score` call fail (or succeed again).
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Make every following `delete_item` call fail (or succeed again).
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Last successfully stored score for `id`.
    pub fn score(&self, id: &str) -> Option<i32> {
        self.lock().scores.get(id).copied()
    }

    /// Every `update_score` call received, in arrival order, failed or not.
    pub fn update_calls(&self) -> Vec<(String, i32)> {
        self.lock().update_calls.clone()
    }

    /// Every `delete_item` call received, in arrival order, failed or not.
    pub fn delete_calls(&self) -> Vec<String> {
        self.lock().delete_calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn update_score(&self, id: &str, score: i32) -> Result<(), PersistenceError> {
        let mut state = self.lock();
        state.update_calls.push((id.to_string(), score));
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(PersistenceError::new(format!("update of {id} rejected")));
        }
        state.scores.insert(id.to_string(), score);
        Ok(())
    }

    async fn delete_item(&self, id: &str) -> Result<(), PersistenceError> {
        let mut state = self.lock();
        state.delete_calls.push(id.to_string());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(PersistenceError::new(format!("delete of {id} rejected")));
        }
        state.scores.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_records_calls() {
        let store = MemoryStore::new();
        store.update_score("a", 1016).await.unwrap();
        store.update_score("b", 984).await.unwrap();
        store.delete_item("b").await.unwrap();

        assert_eq!(store.score("a"), Some(1016));
        assert_eq!(store.score("b"), None);
        assert_eq!(store.update_calls().len(), 2);
        assert_eq!(store.delete_calls(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_store_injected_failures() {
        let store = MemoryStore::new();
        store.fail_updates(true);
        assert!(store.update_score("a", 1000).await.is_err());
        assert_eq!(store.score("a"), None);
        store.fail_updates(false);
        assert!(store.update_score("a", 1000).await.is_ok());

        store.fail_deletes(true);
        assert!(store.delete_item("a").await.is_err());
        assert_eq!(store.delete_calls().len(), 1);
    }
}
