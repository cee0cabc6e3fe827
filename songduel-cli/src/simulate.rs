/// Simulate command: how well does the engine recover a known order?
///
/// A synthetic listener with hidden true ratings answers every duel, picking
/// the first song with the Elo win probability of the hidden ratings. Two
/// engines run in lockstep on the same listener: one with the configured
/// exploration rate and one that never explores. At each checkpoint the
/// Spearman rank correlation between each engine's leaderboard and the hidden
/// order is printed.
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use songduel_core::constants::INITIAL_SCORE;
use songduel_core::elo::expected_score;
use songduel_core::{EngineConfig, Item, MemoryStore, RankingEngine, Side};

use crate::bail;

pub struct SimulateOptions {
    pub items: usize,
    pub duels: usize,
    pub seed: u64,
    pub checkpoints: usize,
}

/// Hidden ratings are drawn uniformly from this far around the initial score.
const TRUE_RATING_SPREAD: f64 = 600.0;

/// Spearman rank correlation of two equally long samples. Ties get the
/// average of the ranks they span. Returns 0.0 when either side is constant.
pub fn spearman(xs: &[f64], ys: &[f64]) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    let (rx, ry) = (ranks(xs), ranks(ys));
    let n = rx.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean = (n + 1.0) / 2.0;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in rx.iter().zip(&ry) {
        cov += (a - mean) * (b - mean);
        var_x += (a - mean).powi(2);
        var_y += (b - mean).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    cov / (var_x * var_y).sqrt()
}

/// 1-based ranks, ascending, ties averaged.
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // Positions start..end share the average of ranks start+1..=end.
        let rank = (start + end + 1) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

/// Correlation between an engine's current scores and the hidden ratings.
fn engine_correlation(engine: &RankingEngine<f64>) -> f64 {
    let (scores, truth): (Vec<f64>, Vec<f64>) = engine
        .items()
        .iter()
        .map(|item| (item.score as f64, item.metadata))
        .unzip();
    spearman(&scores, &truth)
}

fn build_engine(items: Vec<Item<f64>>, config: EngineConfig, seed: u64) -> RankingEngine<f64> {
    RankingEngine::new(items, Arc::new(MemoryStore::new()), config)
        .unwrap_or_else(|e| bail(format!("Failed to build engine: {e}")))
        .with_seed(seed)
}

/// One duel: the listener answers and the engine records it.
fn play_duel(engine: &mut RankingEngine<f64>, listener: &mut StdRng) {
    let Some(pair) = engine.pair() else { return };
    let items = engine.items();
    let p_first = expected_score(items[pair.0].metadata, items[pair.1].metadata);
    let winner = if listener.random::<f64>() < p_first { Side::First } else { Side::Second };
    if let Err(e) = engine.record_outcome(pair, winner, false) {
        bail(format!("Simulated duel failed: {e}"));
    }
}

/// Run the simulation and print a correlation table.
pub async fn run_simulate(options: SimulateOptions, config: EngineConfig) {
    if options.items < 2 {
        bail(format!("Need at least 2 songs to simulate, got {}", options.items));
    }
    let checkpoints = options.checkpoints.clamp(1, options.duels.max(1));

    let mut rng = StdRng::seed_from_u64(options.seed);
    let items: Vec<Item<f64>> = (0..options.items)
        .map(|i| {
            let truth = INITIAL_SCORE as f64 + rng.random_range(-TRUE_RATING_SPREAD..=TRUE_RATING_SPREAD);
            Item::unrated(format!("song-{i:04}"), truth)
        })
        .collect();

    let exploit_config = EngineConfig { exploration_rate: 0.0, ..config.clone() };
    let explore_rate = config.exploration_rate;
    let mut exploring = build_engine(items.clone(), config, options.seed.wrapping_add(1));
    let mut exploiting = build_engine(items, exploit_config, options.seed.wrapping_add(2));
    exploring.select();
    exploiting.select();

    // Separate listener streams keep the two runs independent of each other's draws.
    let mut listener_a = StdRng::seed_from_u64(options.seed.wrapping_add(3));
    let mut listener_b = StdRng::seed_from_u64(options.seed.wrapping_add(4));

    eprintln!(
        "Simulating {} duels over {} songs (seed {})",
        options.duels, options.items, options.seed
    );
    println!("{:>8} | {:>16} | {:>16}", "duels", format!("rate {explore_rate:.2}"), "rate 0.00");
    println!("---------|------------------|-----------------");

    let started = Instant::now();
    let mut next_checkpoint = 1;
    for duel in 1..=options.duels {
        play_duel(&mut exploring, &mut listener_a);
        play_duel(&mut exploiting, &mut listener_b);

        if duel * checkpoints >= next_checkpoint * options.duels {
            println!(
                "{:>8} | {:>16.3} | {:>16.3}",
                duel,
                engine_correlation(&exploring),
                engine_correlation(&exploiting),
            );
            next_checkpoint += 1;
        }
    }

    exploring.shutdown().await;
    exploiting.shutdown().await;
    eprintln!("done ({:.1}s)", started.elapsed().as_secs_f64());
}
