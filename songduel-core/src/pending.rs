/// Soft-deleted items waiting out their grace period.
///
/// Every entry owns a timer task. When the timer expires the task claims the
/// entry (removes it from the map) and only then runs the durable commit.
/// `cancel` claims the entry the same way, so exactly one of the two ever
/// gets it: an undo that arrives after the commit has started finds nothing.
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::PersistenceError;
use crate::types::{Item, ItemId};

/// How a scheduled removal ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    /// The grace period elapsed and the commit succeeded.
    Committed,
    /// The grace period elapsed and the commit failed. The entry is gone either way.
    Failed(PersistenceError),
    /// The removal was undone before the timer claimed it.
    Cancelled,
}

/// Returned by [`PendingRemovalStore::add`] when the id already has an armed
/// timer. Hands the item back untouched.
#[derive(Debug)]
pub struct AlreadyPending<M>(pub Item<M>);

struct Entry<M> {
    item: Item<M>,
    index: usize,
    /// Distinguishes this entry from a later one for the same id, so a stale
    /// timer can never claim it.
    generation: u64,
    cancel: CancellationToken,
}

type Entries<M> = Arc<Mutex<HashMap<ItemId, Entry<M>>>>;

fn lock<M>(entries: &Entries<M>) -> MutexGuard<'_, HashMap<ItemId, Entry<M>>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct PendingRemovalStore<M = ()> {
    entries: Entries<M>,
    next_generation: u64,
    /// Cancelled by `flush` to expire every armed timer at once.
    flush: CancellationToken,
    tasks: TaskTracker,
}

impl<M> Default for PendingRemovalStore<M> {
    fn default() -> Self {
        PendingRemovalStore {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_generation: 0,
            flush: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }
}

impl<M: Send + 'static> PendingRemovalStore<M> {
    pub fn new() -> Self {
        PendingRemovalStore::default()
    }

    /// Record `item` (taken from `index`) and arm a timer that hands it to
    /// `commit` after `delay`.
    ///
    /// The returned handle resolves once the entry is settled: committed,
    /// failed or cancelled. Must be called from within a tokio runtime.
    pub fn add<F, Fut>(
        &mut self,
        item: Item<M>,
        index: usize,
        delay: Duration,
        commit: F,
    ) -> Result<JoinHandle<CommitStatus>, AlreadyPending<M>>
    where
        F: FnOnce(Item<M>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), PersistenceError>> + Send + 'static,
    {
        let id = item.id.clone();
        let generation = self.next_generation;
        let cancel = CancellationToken::new();
        {
            let mut entries = lock(&self.entries);
            if entries.contains_key(&id) {
                return Err(AlreadyPending(item));
            }
            entries.insert(id.clone(), Entry { item, index, generation, cancel: cancel.clone() });
        }
        self.next_generation += 1;

        let entries = Arc::clone(&self.entries);
        let flush = self.flush.clone();
        let handle = self.tasks.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return CommitStatus::Cancelled,
                _ = flush.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }

            let claimed = {
                let mut entries = lock(&entries);
                match entries.get(&id) {
                    Some(entry) if entry.generation == generation => entries.remove(&id),
                    _ => None,
                }
            };
            let Some(entry) = claimed else {
                return CommitStatus::Cancelled;
            };

            match commit(entry.item).await {
                Ok(()) => CommitStatus::Committed,
                Err(e) => CommitStatus::Failed(e),
            }
        });
        Ok(handle)
    }

    /// Disarm the timer for `id` and return the item with its original index.
    ///
    /// `None` if nothing is pending for `id`: never removed, already undone,
    /// or the timer already claimed it. Callers treat that as a no-op.
    pub fn cancel(&mut self, id: &str) -> Option<(Item<M>, usize)> {
        let entry = lock(&self.entries).remove(id)?;
        entry.cancel.cancel();
        Some((entry.item, entry.index))
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.entries).contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids currently waiting out their grace period, in no particular order.
    pub fn ids(&self) -> Vec<ItemId> {
        lock(&self.entries).keys().cloned().collect()
    }

    /// Expire every armed timer now instead of at the end of its grace period.
    pub fn flush(&mut self) {
        self.flush.cancel();
        self.flush = CancellationToken::new();
    }

    /// Wait until every timer task spawned so far has settled.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}
