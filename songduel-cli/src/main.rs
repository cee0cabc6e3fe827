mod config;
mod library;
mod output;
mod play;
mod simulate;

use clap::Parser;
use songduel_core::{EngineConfig, EventSink, RankingEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::{EngineOverrides, SongduelConfig};
use crate::library::JsonFileStore;
use crate::simulate::SimulateOptions;

pub fn bail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

#[derive(Parser)]
#[command(name = "songduel", version, about = "Rank your music by picking the better of two songs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Duel songs from a library interactively
    Play(PlayArgs),
    /// Print the current ranking of a library
    Leaderboard(LeaderboardArgs),
    /// Add songs to a library from a JSON export or a text list
    Import(ImportArgs),
    /// Measure how quickly the engine recovers a hidden ranking
    Simulate(SimulateArgs),
    /// Create a default config file at ~/.config/songduel/config.toml
    Init,
}

#[derive(clap::Args)]
struct LibraryArg {
    /// Library file (JSON array of songs). Falls back to `library` in the config file
    #[arg(long)]
    library: Option<PathBuf>,

    /// Path to config file (default: ~/.config/songduel/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser)]
struct PlayArgs {
    #[command(flatten)]
    source: LibraryArg,

    /// Chance of a bottom-quartile vs top-quartile duel (0.0 to 1.0). Default: 0.2
    #[arg(long)]
    exploration_rate: Option<f64>,

    /// How long a removed song can still be restored, in milliseconds. Default: 3000
    #[arg(long)]
    undo_window_ms: Option<u64>,

    /// Seed for pair selection and score noise (for reproducible sessions)
    #[arg(long)]
    seed: Option<u64>,

    /// Log engine activity to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser)]
struct LeaderboardArgs {
    #[command(flatten)]
    source: LibraryArg,

    /// Output JSON instead of table
    #[arg(long)]
    json: bool,

    /// Only show the best N songs
    #[arg(long)]
    top: Option<usize>,
}

#[derive(Parser)]
struct ImportArgs {
    /// File to import: a JSON array of songs, or one "Artists - Name" per line
    #[arg(long)]
    from: PathBuf,

    #[command(flatten)]
    source: LibraryArg,

    /// Provider recorded on songs imported from a text list
    #[arg(long, default_value = "text")]
    provider: String,
}

#[derive(Parser)]
struct SimulateArgs {
    /// Number of synthetic songs
    #[arg(long, default_value_t = 100)]
    items: usize,

    /// Number of duels each engine plays
    #[arg(long, default_value_t = 2000)]
    duels: usize,

    /// Seed for the hidden ratings, the listener and both engines
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Exploration rate of the engine compared against a non-exploring one
    #[arg(long)]
    exploration_rate: Option<f64>,

    /// How many times to report the correlation
    #[arg(long, default_value_t = 10)]
    checkpoints: usize,

    /// Path to config file (default: ~/.config/songduel/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log engine activity to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Log to stderr, filtered by RUST_LOG when set.
fn init_tracing(verbose: bool) {
    let default = if verbose { "songduel_core=debug,songduel=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => run_play(args).await,
        Commands::Leaderboard(args) => run_leaderboard(args),
        Commands::Import(args) => run_import(args),
        Commands::Simulate(args) => run_simulate(args).await,
        Commands::Init => {
            let path = config::create_default_config();
            println!("Created config at {}", path.display());
            println!("Edit it to set your default library, exploration rate, etc.");
        }
    }
}

/// Config file plus the library path resolved from CLI arg, then config.
fn resolve_library(source: &LibraryArg) -> (SongduelConfig, PathBuf) {
    let config_path = source.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = config::load_config(&config_path);
    let library = source.library.clone().or_else(|| cfg.library.take()).unwrap_or_else(|| {
        bail(format!("No library specified. Pass --library or set it in {}", config_path.display()))
    });
    (cfg, library)
}

fn load_records(path: &Path) -> Vec<library::SongRecord> {
    library::load_library(path).unwrap_or_else(|e| bail(e))
}

async fn run_play(args: PlayArgs) {
    init_tracing(args.verbose);
    let (cfg, library_path) = resolve_library(&args.source);
    let engine_config = cfg
        .engine_config(&EngineOverrides {
            exploration_rate: args.exploration_rate,
            undo_window_ms: args.undo_window_ms,
        })
        .unwrap_or_else(|e| bail(e));

    let records = load_records(&library_path);
    if records.len() < 2 {
        bail(format!(
            "Need at least 2 songs to duel, {} has {}. Add some with `songduel import`.",
            library_path.display(),
            records.len()
        ));
    }
    let items = library::to_items(&records);
    let store = Arc::new(JsonFileStore::new(library_path.clone(), records));

    let (sink, events) = EventSink::channel();
    let mut engine = RankingEngine::new(items, store, engine_config)
        .unwrap_or_else(|e| bail(format!("Invalid library {}: {e}", library_path.display())))
        .with_events(sink);
    if let Some(seed) = args.seed {
        engine = engine.with_seed(seed);
    }

    tracing::info!(library = %library_path.display(), songs = engine.items().len(), "starting session");
    play::run_play(engine, events).await;
}

fn run_leaderboard(args: LeaderboardArgs) {
    let (_, library_path) = resolve_library(&args.source);
    let records = load_records(&library_path);
    let items = library::to_items(&records);
    let collection = songduel_core::Collection::from_items(items, i32::MIN)
        .unwrap_or_else(|e| bail(format!("Invalid library {}: {e}", library_path.display())));

    let mut ranked = collection.ranked();
    if let Some(top) = args.top {
        ranked.truncate(top);
    }

    if args.json {
        output::print_json(&ranked);
    } else {
        output::print_table(&ranked);
    }
}

fn run_import(args: ImportArgs) {
    let (_, library_path) = resolve_library(&args.source);
    let content = std::fs::read_to_string(&args.from)
        .unwrap_or_else(|e| bail(format!("Failed to read {}: {e}", args.from.display())));
    let incoming = library::parse_import(&content, &args.provider)
        .unwrap_or_else(|e| bail(format!("File looks like JSON but failed to parse: {e}")));

    let mut records = load_records(&library_path);
    let offered = incoming.len();
    let added = library::merge_import(&mut records, incoming);
    library::save_library(&library_path, &records).unwrap_or_else(|e| bail(e));

    println!(
        "Imported {added} of {offered} songs into {} ({} total)",
        library_path.display(),
        records.len()
    );
    if added < offered {
        println!("{} already in the library, skipped", offered - added);
    }
}

async fn run_simulate(args: SimulateArgs) {
    init_tracing(args.verbose);
    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    let cfg = config::load_config(&config_path);
    let engine_config: EngineConfig = cfg
        .engine_config(&EngineOverrides { exploration_rate: args.exploration_rate, undo_window_ms: None })
        .unwrap_or_else(|e| bail(e));

    let options = SimulateOptions {
        items: args.items,
        duels: args.duels,
        seed: args.seed,
        checkpoints: args.checkpoints,
    };
    simulate::run_simulate(options, engine_config).await;
}
