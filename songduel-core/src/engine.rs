/// Ranking engine orchestrator.
///
/// Owns one user's collection, the pair on screen and the pending removals.
/// Every operation mutates in-memory state synchronously and returns at once;
/// durable writes go out as background tasks whose handles are returned so a
/// caller (or a test) can await them. Background tasks never touch the
/// collection, so a late or failed write can't roll local state back.
///
/// Operations that spawn work must be called from within a tokio runtime.
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::collection::Collection;
use crate::elo::{update_scores, ScoreParams};
use crate::error::{EngineError, PersistenceError};
use crate::events::{EngineEvent, EventSink, WriteKind};
use crate::pairing::{replace_removed, select_pair, shift_for_insert};
use crate::pending::{AlreadyPending, CommitStatus, PendingRemovalStore};
use crate::persistence::Persistence;
use crate::types::{EngineConfig, Item, ItemId, Pair, Side};

/// A background score write that did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub id: ItemId,
    pub error: PersistenceError,
}

/// Result of [`RankingEngine::record_outcome`].
#[derive(Debug)]
pub struct OutcomeReport {
    /// New scores for the first and second item of the compared pair.
    pub scores: (i32, i32),
    /// The pair selected for the next round.
    pub next_pair: Option<Pair>,
    /// Resolves once both score writes have settled.
    pub writes: JoinHandle<Vec<WriteFailure>>,
}

/// What the caller needs to offer an undo for a removal.
#[derive(Debug)]
pub struct RemovalHandle {
    pub id: ItemId,
    /// Index the item was taken from.
    pub index: usize,
    pub undo_window: Duration,
    /// Resolves when the removal is committed, fails, or is undone.
    pub commit: JoinHandle<CommitStatus>,
}

/// Result of [`RankingEngine::merge`].
#[derive(Debug)]
pub struct MergeReport {
    pub kept: ItemId,
    pub removal: RemovalHandle,
    pub next_pair: Option<Pair>,
}

pub struct RankingEngine<M = ()> {
    collection: Collection<M>,
    /// Indices into `collection` shown right now. Distinct and in range while `Some`.
    pair: Option<Pair>,
    pending: PendingRemovalStore<M>,
    persistence: Arc<dyn Persistence>,
    events: EventSink,
    rng: StdRng,
    config: EngineConfig,
    /// Score writes in flight.
    writes: TaskTracker,
    comparisons: usize,
}

impl<M: Send + 'static> RankingEngine<M> {
    /// Build an engine over an ingested collection. No pair is selected yet.
    pub fn new(
        items: Vec<Item<M>>,
        persistence: Arc<dyn Persistence>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let collection = Collection::from_items(items, config.score_floor)?;
        Ok(RankingEngine {
            collection,
            pair: None,
            pending: PendingRemovalStore::new(),
            persistence,
            events: EventSink::disabled(),
            rng: StdRng::from_os_rng(),
            config,
            writes: TaskTracker::new(),
            comparisons: 0,
        })
    }

    /// Replace the entropy source with a seeded one.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Send notifications to `events` from now on.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Pick a new pair from the live collection. Leaves the collection untouched.
    pub fn select(&mut self) -> Option<Pair> {
        let pair = self.draw_pair();
        self.set_pair(pair);
        pair
    }

    /// "I can't decide": draw a fresh pair without recording anything.
    pub fn reshuffle(&mut self) -> Option<Pair> {
        self.select()
    }

    // -----------------------------------------------------------------------
    // Comparisons
    // -----------------------------------------------------------------------

    /// Record that `winner` won the duel shown as `pair`, then select the next pair.
    ///
    /// `boosted` uses the larger K-factor. Both score writes are dispatched
    /// concurrently; failures come back through the returned handle and as
    /// [`EngineEvent::WriteFailed`].
    pub fn record_outcome(
        &mut self,
        pair: Pair,
        winner: Side,
        boosted: bool,
    ) -> Result<OutcomeReport, EngineError> {
        let (first, second) = self.check_pair(pair)?;

        let params = ScoreParams {
            k_factor: self.config.k_for(boosted),
            noise: self.config.score_noise,
            floor: self.config.score_floor,
        };
        let items = self.collection.items();
        let (a, b) = (&items[first], &items[second]);
        let (score_a, score_b) = update_scores(a.score, b.score, winner, params, &mut self.rng);
        debug!(
            winner = ?winner, boosted,
            first = %a.id, first_before = a.score, first_after = score_a,
            second = %b.id, second_before = b.score, second_after = score_b,
            "recorded outcome"
        );
        let (id_a, id_b) = (a.id.clone(), b.id.clone());

        self.collection.set_score(first, score_a);
        self.collection.set_score(second, score_b);
        self.comparisons += 1;

        let writes = self.spawn_score_writes((id_a, score_a), (id_b, score_b));
        let next_pair = self.select();
        Ok(OutcomeReport { scores: (score_a, score_b), next_pair, writes })
    }

    fn spawn_score_writes(
        &self,
        first: (ItemId, i32),
        second: (ItemId, i32),
    ) -> JoinHandle<Vec<WriteFailure>> {
        let persistence = Arc::clone(&self.persistence);
        let events = self.events.clone();
        self.writes.spawn(async move {
            let (first_result, second_result) = tokio::join!(
                persistence.update_score(&first.0, first.1),
                persistence.update_score(&second.0, second.1),
            );

            let mut failures = Vec::new();
            for ((id, score), result) in [(first, first_result), (second, second_result)] {
                if let Err(error) = result {
                    warn!(%id, score, %error, "score write failed");
                    events.emit(EngineEvent::WriteFailed {
                        id: id.clone(),
                        kind: WriteKind::Score,
                        error: error.clone(),
                    });
                    failures.push(WriteFailure { id, error });
                }
            }
            failures
        })
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Take `id` out of the collection now and delete it durably once the
    /// undo window has passed.
    ///
    /// If `id` was on screen its partner keeps its side and gets a new
    /// opponent. Removing an id that is already pending is declined with
    /// [`EngineError::AlreadyPending`].
    pub fn remove(&mut self, id: &str) -> Result<RemovalHandle, EngineError> {
        let handle = self.detach(id)?;
        let new_len = self.collection.len();
        let next_pair = self.pair.and_then(|p| replace_removed(p, handle.index, new_len, &mut self.rng));
        self.set_pair(next_pair);
        Ok(handle)
    }

    /// Take `id` out of the collection and schedule its durable delete.
    /// The pair is left for the caller to fix up.
    fn detach(&mut self, id: &str) -> Result<RemovalHandle, EngineError> {
        if self.pending.contains(id) {
            return Err(EngineError::AlreadyPending(id.to_string()));
        }
        let index = self
            .collection
            .position(id)
            .ok_or_else(|| EngineError::UnknownItem(id.to_string()))?;

        let item = self.collection.remove(index);
        let commit = match self.schedule_delete(item, index) {
            Ok(commit) => commit,
            Err(AlreadyPending(item)) => {
                self.collection.insert(index, item);
                return Err(EngineError::AlreadyPending(id.to_string()));
            }
        };

        let undo_window = self.config.undo_window;
        info!(%id, index, ?undo_window, "removed, pending commit");
        self.events.emit(EngineEvent::Removed { id: id.to_string(), undo_window });
        Ok(RemovalHandle { id: id.to_string(), index, undo_window, commit })
    }

    fn schedule_delete(
        &mut self,
        item: Item<M>,
        index: usize,
    ) -> Result<JoinHandle<CommitStatus>, AlreadyPending<M>> {
        let persistence = Arc::clone(&self.persistence);
        let events = self.events.clone();
        self.pending.add(item, index, self.config.undo_window, move |item| async move {
            let id = item.id;
            match persistence.delete_item(&id).await {
                Ok(()) => {
                    info!(%id, "removal committed");
                    events.emit(EngineEvent::RemovalCommitted { id });
                    Ok(())
                }
                Err(error) => {
                    warn!(%id, %error, "delete failed");
                    events.emit(EngineEvent::WriteFailed {
                        id,
                        kind: WriteKind::Delete,
                        error: error.clone(),
                    });
                    Err(error)
                }
            }
        })
    }

    /// Undo a removal whose grace period is still running.
    ///
    /// The item goes back to the index it was removed from (or the end, if
    /// the collection has shrunk below it). Returns that index, or `None` if
    /// there was nothing to undo. The pair on screen keeps showing the same
    /// items; the previous pair is not restored.
    pub fn undo_remove(&mut self, id: &str) -> Option<usize> {
        let Some((item, index)) = self.pending.cancel(id) else {
            debug!(%id, "nothing to undo");
            return None;
        };
        let at = self.collection.insert(index, item);
        if let Some(pair) = self.pair {
            self.set_pair(Some(shift_for_insert(pair, at)));
        }
        info!(%id, index = at, "removal undone");
        self.events.emit(EngineEvent::Restored { id: id.to_string(), index: at });
        Some(at)
    }

    /// Resolve a duplicate: keep the higher-scored item of `pair`, remove the
    /// other one through the normal undoable path, and draw a new pair.
    ///
    /// On a tie the first item is kept.
    pub fn merge(&mut self, pair: Pair) -> Result<MergeReport, EngineError> {
        let (first, second) = self.check_pair(pair)?;
        let items = self.collection.items();
        let (keep, drop) = if items[first].score < items[second].score {
            (second, first)
        } else {
            (first, second)
        };
        let kept = items[keep].id.clone();
        let dropped = items[drop].id.clone();

        let removal = self.detach(&dropped)?;
        // The old indices no longer name the same items, so announce the new pair unconditionally.
        let next_pair = self.draw_pair();
        self.pair = next_pair;
        self.events.emit(EngineEvent::PairChanged(next_pair));
        info!(%kept, %dropped, "merged duplicates");
        Ok(MergeReport { kept, removal, next_pair })
    }

    // -----------------------------------------------------------------------
    // Collection lifecycle
    // -----------------------------------------------------------------------

    /// Swap in a freshly ingested collection.
    ///
    /// Items whose removal is still pending are left out, so a refresh can't
    /// resurrect them. The pair is cleared; call [`select`](Self::select) next.
    pub fn refresh(&mut self, items: Vec<Item<M>>) -> Result<(), EngineError> {
        let items: Vec<Item<M>> = items.into_iter().filter(|item| !self.pending.contains(&item.id)).collect();
        self.collection = Collection::from_items(items, self.config.score_floor)?;
        info!(items = self.collection.len(), "collection refreshed");
        self.set_pair(None);
        Ok(())
    }

    /// Commit every pending removal now and wait for all background writes.
    pub async fn shutdown(&mut self) {
        let pending = self.pending.len();
        if pending > 0 {
            info!(pending, "committing pending removals");
        }
        self.pending.flush();
        self.pending.wait_idle().await;

        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn items(&self) -> &[Item<M>] {
        self.collection.items()
    }

    pub fn collection(&self) -> &Collection<M> {
        &self.collection
    }

    pub fn pair(&self) -> Option<Pair> {
        self.pair
    }

    /// The two items currently on screen.
    pub fn pair_items(&self) -> Option<(&Item<M>, &Item<M>)> {
        let (a, b) = self.pair?;
        Some((self.collection.get(a)?, self.collection.get(b)?))
    }

    /// Items by score, best first.
    pub fn leaderboard(&self) -> Vec<&Item<M>> {
        self.collection.ranked()
    }

    /// Outcomes recorded since this engine was built.
    pub fn comparisons_made(&self) -> usize {
        self.comparisons
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    pub fn pending_removals(&self) -> usize {
        self.pending.len()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn draw_pair(&mut self) -> Option<Pair> {
        let scores = self.collection.scores();
        let pair = select_pair(&scores, self.config.exploration_rate, &mut self.rng);
        debug!(?pair, items = scores.len(), "select");
        pair
    }

    fn check_pair(&self, given: Pair) -> Result<Pair, EngineError> {
        let active = self.pair.ok_or(EngineError::NoActivePair)?;
        if given != active {
            warn!(?given, ?active, "stale pair");
            return Err(EngineError::StalePair { given, active });
        }
        Ok(active)
    }

    fn set_pair(&mut self, pair: Option<Pair>) {
        if self.pair != pair {
            self.pair = pair;
            self.events.emit(EngineEvent::PairChanged(pair));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::Notify;

    /// Deletes wait for `release` after announcing themselves on `delete_started`.
    #[derive(Default)]
    struct SlowDeleteStore {
        inner: MemoryStore,
        delete_started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Persistence for SlowDeleteStore {
        async fn update_score(&self, id: &str, score: i32) -> Result<(), PersistenceError> {
            self.inner.update_score(id, score).await
        }

        async fn delete_item(&self, id: &str) -> Result<(), PersistenceError> {
            self.delete_started.notify_one();
            self.release.notified().await;
            self.inner.delete_item(id).await
        }
    }

    fn exact_config() -> EngineConfig {
        EngineConfig { score_noise: 0.0, ..EngineConfig::default() }
    }

    fn items(scores: &[i32]) -> Vec<Item> {
        scores.iter().enumerate().map(|(i, &s)| Item::new(format!("song-{i}"), s, ())).collect()
    }

    fn engine_with(scores: &[i32], config: EngineConfig) -> (RankingEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = RankingEngine::new(items(scores), store.clone(), config).unwrap().with_seed(17);
        (engine, store)
    }

    fn drain(rx: &mut UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn assert_pair_valid(engine: &RankingEngine) {
        if let Some((a, b)) = engine.pair() {
            assert_ne!(a, b);
            assert!(a < engine.items().len() && b < engine.items().len());
        }
    }

    #[tokio::test]
    async fn test_select_needs_two_items() {
        let (mut engine, _) = engine_with(&[1000], exact_config());
        assert_eq!(engine.select(), None);
        assert_eq!(engine.pair(), None);

        let (mut engine, _) = engine_with(&[1000, 1000], exact_config());
        let (a, b) = engine.select().unwrap();
        assert_eq!(a + b, 1);
    }

    #[tokio::test]
    async fn test_repeated_select_is_always_valid() {
        let (mut engine, _) = engine_with(&[1000, 1100, 900, 1500, 700, 1000, 1200], EngineConfig::default());
        let before = engine.collection().ids();
        for _ in 0..500 {
            engine.select().unwrap();
            assert_pair_valid(&engine);
        }
        assert_eq!(engine.collection().ids(), before, "selection must not reorder items");
    }

    #[tokio::test]
    async fn test_new_rejects_bad_collections() {
        let store = Arc::new(MemoryStore::new());
        let dup = vec![Item::new("a", 1000, ()), Item::new("a", 1000, ())];
        assert!(matches!(
            RankingEngine::new(dup, store.clone(), EngineConfig::default()),
            Err(EngineError::DuplicateId(_))
        ));
        let low = vec![Item::new("a", 50, ())];
        assert!(matches!(
            RankingEngine::new(low, store, EngineConfig::default()),
            Err(EngineError::ScoreBelowFloor { .. })
        ));
    }

    #[tokio::test]
    async fn test_new_rejects_unusable_config() {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig { score_noise: f64::INFINITY, ..EngineConfig::default() };
        assert!(matches!(
            RankingEngine::new(items(&[1000, 1000]), store.clone(), config),
            Err(EngineError::InvalidConfig(_))
        ));
        let config = EngineConfig { k_factor: -32.0, ..EngineConfig::default() };
        assert!(matches!(
            RankingEngine::new(items(&[1000, 1000]), store, config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_record_outcome_updates_scores_and_persists() {
        let (mut engine, store) = engine_with(&[1000, 1000, 1000], exact_config());
        let pair = engine.select().unwrap();
        let first_id = engine.items()[pair.0].id.clone();
        let second_id = engine.items()[pair.1].id.clone();

        let report = engine.record_outcome(pair, Side::First, false).unwrap();
        assert_eq!(report.scores, (1016, 984));
        assert_eq!(engine.items()[pair.0].score, 1016);
        assert_eq!(engine.items()[pair.1].score, 984);
        assert_eq!(engine.comparisons_made(), 1);
        assert_eq!(report.next_pair, engine.pair());
        assert_pair_valid(&engine);

        assert!(report.writes.await.unwrap().is_empty());
        assert_eq!(store.score(&first_id), Some(1016));
        assert_eq!(store.score(&second_id), Some(984));
    }

    #[tokio::test]
    async fn test_boosted_outcome_doubles_k() {
        let (mut engine, _) = engine_with(&[1000, 1000], exact_config());
        let pair = engine.select().unwrap();
        let report = engine.record_outcome(pair, Side::Second, true).unwrap();
        assert_eq!(report.scores, (968, 1032));
    }

    #[tokio::test]
    async fn test_record_outcome_rejects_stale_or_missing_pair() {
        let (mut engine, store) = engine_with(&[1000, 1000, 1000], exact_config());
        assert_eq!(
            engine.record_outcome((0, 1), Side::First, false).unwrap_err(),
            EngineError::NoActivePair
        );

        let active = engine.select().unwrap();
        let stale = (active.1, active.0);
        assert!(matches!(
            engine.record_outcome(stale, Side::First, false),
            Err(EngineError::StalePair { .. })
        ));
        assert!(engine.items().iter().all(|item| item.score == 1000));
        assert_eq!(engine.pair(), Some(active));
        assert_eq!(engine.comparisons_made(), 0);
        assert!(store.update_calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_score_write_keeps_local_state() {
        let (sink, mut rx) = EventSink::channel();
        let (engine, store) = engine_with(&[1000, 1000], exact_config());
        let mut engine = engine.with_events(sink);
        store.fail_updates(true);

        let pair = engine.select().unwrap();
        let report = engine.record_outcome(pair, Side::First, false).unwrap();
        let failures = report.writes.await.unwrap();

        assert_eq!(failures.len(), 2);
        assert_eq!(engine.items()[pair.0].score, 1016);
        let failed: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::WriteFailed { kind: WriteKind::Score, .. }))
            .collect();
        assert_eq!(failed.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_then_undo_restores_order_and_skips_delete() {
        let (mut engine, store) = engine_with(&[1000, 1100, 1200, 1300], exact_config());
        let before = engine.collection().ids();

        let handle = engine.remove("song-1").unwrap();
        assert_eq!(handle.index, 1);
        assert_eq!(engine.items().len(), 3);
        assert!(engine.is_pending("song-1"));

        assert_eq!(engine.undo_remove("song-1"), Some(1));
        assert_eq!(engine.collection().ids(), before);
        assert_eq!(engine.items()[1].score, 1100);
        assert_eq!(handle.commit.await.unwrap(), CommitStatus::Cancelled);

        tokio::time::sleep(engine.config().undo_window * 2).await;
        assert!(store.delete_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_commits_once_after_grace_period() {
        let (sink, mut rx) = EventSink::channel();
        let (engine, store) = engine_with(&[1000, 1100, 1200], exact_config());
        let mut engine = engine.with_events(sink);

        let handle = engine.remove("song-2").unwrap();
        assert_eq!(handle.undo_window, Duration::from_millis(3000));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(store.delete_calls().is_empty(), "deleted before the grace period ended");

        assert_eq!(handle.commit.await.unwrap(), CommitStatus::Committed);
        assert_eq!(store.delete_calls(), vec!["song-2".to_string()]);

        // Too late to undo: no-op, nothing comes back.
        assert_eq!(engine.undo_remove("song-2"), None);
        assert_eq!(engine.items().len(), 2);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.delete_calls().len(), 1);

        let events = drain(&mut rx);
        assert!(events.contains(&EngineEvent::Removed {
            id: "song-2".to_string(),
            undo_window: Duration::from_millis(3000),
        }));
        assert!(events.contains(&EngineEvent::RemovalCommitted { id: "song-2".to_string() }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_undo_during_slow_delete_is_a_no_op() {
        let store = Arc::new(SlowDeleteStore::default());
        let mut engine = RankingEngine::new(items(&[1000, 1100, 1200]), store.clone(), exact_config())
            .unwrap()
            .with_seed(17);

        let handle = engine.remove("song-1").unwrap();
        store.delete_started.notified().await;

        assert!(!engine.is_pending("song-1"));
        assert_eq!(engine.undo_remove("song-1"), None);
        assert_eq!(engine.items().len(), 2);
        assert!(!engine.collection().contains("song-1"));

        store.release.notify_one();
        assert_eq!(handle.commit.await.unwrap(), CommitStatus::Committed);
        assert_eq!(store.inner.delete_calls(), vec!["song-1".to_string()]);
        assert_eq!(engine.items().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delete_is_reported_not_reverted() {
        let (sink, mut rx) = EventSink::channel();
        let (engine, store) = engine_with(&[1000, 1100, 1200], exact_config());
        let mut engine = engine.with_events(sink);
        store.fail_deletes(true);

        let handle = engine.remove("song-0").unwrap();
        assert!(matches!(handle.commit.await.unwrap(), CommitStatus::Failed(_)));
        assert!(!engine.collection().contains("song-0"));
        assert!(!engine.is_pending("song-0"));
        assert_eq!(engine.undo_remove("song-0"), None);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, EngineEvent::WriteFailed { kind: WriteKind::Delete, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_rejects_unknown_and_pending_ids() {
        let (mut engine, _) = engine_with(&[1000, 1100, 1200], exact_config());
        assert_eq!(
            engine.remove("nope").unwrap_err(),
            EngineError::UnknownItem("nope".to_string())
        );

        engine.remove("song-0").unwrap();
        let ids = engine.collection().ids();
        assert_eq!(
            engine.remove("song-0").unwrap_err(),
            EngineError::AlreadyPending("song-0".to_string())
        );
        assert_eq!(engine.collection().ids(), ids);
        assert_eq!(engine.pending_removals(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removing_pair_member_keeps_partner_side() {
        let (mut engine, _) = engine_with(&[1000, 1100, 1200, 1300, 1400], exact_config());
        for _ in 0..50 {
            let (a, b) = engine.select().unwrap();
            let removed = engine.items()[a].id.clone();
            let partner = engine.items()[b].id.clone();

            engine.remove(&removed).unwrap();
            let (_, new_b) = engine.pair().unwrap();
            assert_eq!(engine.items()[new_b].id, partner);
            assert_pair_valid(&engine);

            engine.undo_remove(&removed).unwrap();
            assert_pair_valid(&engine);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_removing_other_item_keeps_same_items_on_screen() {
        let (mut engine, _) = engine_with(&[1000, 1100, 1200, 1300, 1400], exact_config());
        let pair = engine.select().unwrap();
        let shown = (engine.items()[pair.0].id.clone(), engine.items()[pair.1].id.clone());
        let bystander = engine
            .items()
            .iter()
            .enumerate()
            .find(|(i, _)| *i != pair.0 && *i != pair.1)
            .map(|(_, item)| item.id.clone())
            .unwrap();

        engine.remove(&bystander).unwrap();
        let (a, b) = engine.pair_items().unwrap();
        assert_eq!((a.id.clone(), b.id.clone()), shown);

        engine.undo_remove(&bystander).unwrap();
        let (a, b) = engine.pair_items().unwrap();
        assert_eq!((a.id.clone(), b.id.clone()), shown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pair_empties_when_collection_drops_below_two() {
        let (sink, mut rx) = EventSink::channel();
        let (engine, _) = engine_with(&[1000, 1100], exact_config());
        let mut engine = engine.with_events(sink);
        engine.select().unwrap();

        engine.remove("song-0").unwrap();
        assert_eq!(engine.pair(), None);
        assert!(drain(&mut rx).contains(&EngineEvent::PairChanged(None)));
        assert!(matches!(
            engine.record_outcome((0, 1), Side::First, false),
            Err(EngineError::NoActivePair)
        ));

        // Undo brings the item back but does not re-select on its own.
        engine.undo_remove("song-0").unwrap();
        assert_eq!(engine.pair(), None);
        assert!(engine.select().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_keeps_higher_score() {
        let store = Arc::new(MemoryStore::new());
        let collection = vec![
            Item::new("dup-high", 120, ()),
            Item::new("dup-low", 90, ()),
            Item::new("other-1", 1000, ()),
            Item::new("other-2", 1000, ()),
        ];
        let config = EngineConfig { score_floor: 50, ..exact_config() };
        let mut engine = RankingEngine::new(collection, store.clone(), config).unwrap().with_seed(3);
        engine.set_pair(Some((1, 0)));
        let pair = engine.pair().unwrap();

        let report = engine.merge(pair).unwrap();
        assert_eq!(report.kept, "dup-high");
        assert_eq!(report.removal.id, "dup-low");
        assert!(engine.collection().contains("dup-high"));
        assert!(!engine.collection().contains("dup-low"));
        assert_eq!(report.next_pair, engine.pair());

        for _ in 0..200 {
            engine.select();
            let (a, b) = engine.pair_items().unwrap();
            assert_ne!(a.id, "dup-low");
            assert_ne!(b.id, "dup-low");
        }

        assert!(engine.undo_remove("dup-low").is_some());
        assert_eq!(report.removal.commit.await.unwrap(), CommitStatus::Cancelled);
        assert!(store.delete_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_announces_only_the_drawn_pair() {
        let (sink, mut rx) = EventSink::channel();
        let (engine, _) = engine_with(&[1000, 1010, 1020, 1030, 1040, 1050, 1060, 1070, 1080, 1090], exact_config());
        let mut engine = engine.with_events(sink);
        engine.select().unwrap();

        while engine.items().len() > 2 {
            let pair = engine.pair().unwrap();
            drain(&mut rx);
            let report = engine.merge(pair).unwrap();
            let changes: Vec<_> = drain(&mut rx)
                .into_iter()
                .filter(|e| matches!(e, EngineEvent::PairChanged(_)))
                .collect();
            assert_eq!(changes, vec![EngineEvent::PairChanged(report.next_pair)]);
            assert_eq!(engine.pair(), report.next_pair);
            assert_pair_valid(&engine);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_on_tie_keeps_first() {
        let (mut engine, _) = engine_with(&[1000, 1000], exact_config());
        let pair = engine.select().unwrap();
        let first = engine.items()[pair.0].id.clone();
        let report = engine.merge(pair).unwrap();
        assert_eq!(report.kept, first);
        assert_eq!(report.next_pair, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_requires_active_pair() {
        let (mut engine, _) = engine_with(&[1000, 1000, 1000], exact_config());
        assert_eq!(engine.merge((0, 1)).unwrap_err(), EngineError::NoActivePair);
        assert_eq!(engine.items().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_skips_pending_items() {
        let (mut engine, _) = engine_with(&[1000, 1100, 1200], exact_config());
        engine.select();
        engine.remove("song-1").unwrap();

        engine.refresh(items(&[1000, 1100, 1200, 1300])).unwrap();
        assert_eq!(engine.collection().ids(), vec!["song-0", "song-2", "song-3"]);
        assert_eq!(engine.pair(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_commits_pending_removals_early() {
        let (mut engine, store) = engine_with(&[1000, 1100, 1200, 1300], exact_config());
        let start = tokio::time::Instant::now();
        engine.remove("song-0").unwrap();
        engine.remove("song-3").unwrap();

        engine.shutdown().await;

        let mut deleted = store.delete_calls();
        deleted.sort();
        assert_eq!(deleted, vec!["song-0".to_string(), "song-3".to_string()]);
        assert!(start.elapsed() < engine.config().undo_window);
        assert_eq!(engine.pending_removals(), 0);
    }

    #[tokio::test]
    async fn test_leaderboard_orders_by_score() {
        let (engine, _) = engine_with(&[900, 1500, 1200], exact_config());
        let ids: Vec<&str> = engine.leaderboard().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["song-1", "song-2", "song-0"]);
    }
}
