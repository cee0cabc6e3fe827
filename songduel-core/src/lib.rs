/// songduel-core: Pairwise-comparison ranking engine.
///
/// Two items on screen → user picks a winner → Elo update → next pair.
/// Removals are soft and undoable for a grace period before they reach the
/// durable store. Bring your own store: anything implementing [`Persistence`].
///
/// Items are identified by caller-provided string IDs and carry an opaque
/// metadata payload the engine never looks at.
///
/// # Quick start
///
/// ```rust
/// use std::sync::Arc;
/// use songduel_core::{EngineConfig, Item, MemoryStore, RankingEngine, Side};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let items = vec![
///     Item::unrated("intro", "Intro"),
///     Item::unrated("outro", "Outro"),
///     Item::unrated("hidden-track", "Hidden Track"),
/// ];
/// let store = Arc::new(MemoryStore::new());
/// let mut engine = RankingEngine::new(items, store, EngineConfig::default()).unwrap();
///
/// let pair = engine.select().unwrap();
/// let report = engine.record_outcome(pair, Side::First, false).unwrap();
/// report.writes.await.unwrap();
///
/// for item in engine.leaderboard() {
///     println!("{}: {}", item.metadata, item.score);
/// }
/// # }
/// ```

pub mod collection;
pub mod constants;
pub mod elo;
pub mod engine;
pub mod error;
pub mod events;
pub mod pairing;
pub mod pending;
pub mod persistence;
pub mod types;

// Re-export primary public API at crate root.
pub use collection::Collection;
pub use engine::{MergeReport, OutcomeReport, RankingEngine, RemovalHandle, WriteFailure};
pub use error::{EngineError, PersistenceError};
pub use events::{EngineEvent, EventSink, WriteKind};
pub use pairing::{select_in_mode, select_pair, select_with_fixed, SelectionMode};
pub use pending::{CommitStatus, PendingRemovalStore};
pub use persistence::{MemoryStore, Persistence};
pub use types::{EngineConfig, Item, ItemId, Pair, Side};
