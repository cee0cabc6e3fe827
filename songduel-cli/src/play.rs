/// Interactive duel loop on the terminal.
///
/// Reads one command per line from stdin while rendering engine notifications
/// (removals, undo windows, failed writes) as they arrive.
use std::collections::HashMap;

use songduel_core::{EngineEvent, ItemId, RankingEngine, Side, WriteKind};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::library::SongInfo;
use crate::output;

const HELP: &str = "\
Commands:
  1 / 2     the first / second song wins
  1! / 2!   boosted win (counts double)
  r1 / r2   remove the first / second song
  u         undo the last removal
  m         these two are the same song: merge them
  s         can't decide, pick two new songs
  l         show the leaderboard
  q         quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pick { side: Side, boosted: bool },
    Remove(Side),
    Undo,
    Merge,
    Skip,
    Leaderboard,
    Help,
    Quit,
}

pub fn parse_command(input: &str) -> Option<Command> {
    let side = |c: &str| match c {
        "1" => Some(Side::First),
        "2" => Some(Side::Second),
        _ => None,
    };
    let input = input.trim().to_lowercase();
    let command = match input.as_str() {
        "u" | "undo" => Command::Undo,
        "m" | "merge" => Command::Merge,
        "s" | "skip" => Command::Skip,
        "l" | "leaderboard" => Command::Leaderboard,
        "h" | "?" | "help" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        other => {
            if let Some(rest) = other.strip_prefix('r') {
                Command::Remove(side(rest)?)
            } else if let Some(rest) = other.strip_suffix('!') {
                Command::Pick { side: side(rest)?, boosted: true }
            } else {
                Command::Pick { side: side(other)?, boosted: false }
            }
        }
    };
    Some(command)
}

/// State the loop keeps next to the engine.
struct Session {
    engine: RankingEngine<SongInfo>,
    /// Labels by id, including songs no longer in the collection.
    labels: HashMap<ItemId, String>,
    /// Removed ids, most recent last.
    removed: Vec<ItemId>,
}

impl Session {
    fn label(&self, id: &str) -> String {
        self.labels.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    fn print_pair(&self) {
        match self.engine.pair_items() {
            Some((a, b)) => {
                println!();
                println!("  [1] {} ({})", a.metadata.label(), a.score);
                println!("  [2] {} ({})", b.metadata.label(), b.score);
                print!("duel #{} > ", self.engine.comparisons_made() + 1);
            }
            None => print!("Not enough songs to compare. (u to undo, q to quit) > "),
        }
        flush_stdout();
    }

    /// Returns false when the user wants to quit.
    fn handle(&mut self, command: Command) -> bool {
        let result = match command {
            Command::Quit => return false,
            Command::Help => {
                println!("{HELP}");
                Ok(())
            }
            Command::Leaderboard => {
                output::print_table(&self.engine.leaderboard());
                Ok(())
            }
            Command::Skip => {
                self.engine.reshuffle();
                Ok(())
            }
            Command::Pick { side, boosted } => match self.engine.pair() {
                Some(pair) => self.engine.record_outcome(pair, side, boosted).map(|_| ()),
                None => Err(songduel_core::EngineError::NoActivePair),
            },
            Command::Remove(side) => match self.engine.pair_items() {
                Some((a, b)) => {
                    let id = match side {
                        Side::First => a.id.clone(),
                        Side::Second => b.id.clone(),
                    };
                    self.engine.remove(&id).map(|handle| self.removed.push(handle.id))
                }
                None => Err(songduel_core::EngineError::NoActivePair),
            },
            Command::Merge => match self.engine.pair() {
                Some(pair) => match self.engine.merge(pair) {
                    Ok(report) => {
                        println!("Merged: kept \"{}\".", self.label(&report.kept));
                        self.removed.push(report.removal.id);
                        Ok(())
                    }
                    Err(e) => Err(e),
                },
                None => Err(songduel_core::EngineError::NoActivePair),
            },
            Command::Undo => {
                self.undo_latest();
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("Can't do that: {e}");
        }
        true
    }

    fn undo_latest(&mut self) {
        // Skip removals that have already been committed.
        while let Some(id) = self.removed.pop() {
            if self.engine.undo_remove(&id).is_some() {
                if self.engine.pair().is_none() {
                    self.engine.select();
                }
                return;
            }
        }
        println!("Nothing to undo.");
    }

    fn render(&self, event: EngineEvent) {
        match event {
            EngineEvent::Removed { id, undo_window } => println!(
                "\nRemoved \"{}\". Type u within {:.0}s to undo.",
                self.label(&id),
                undo_window.as_secs_f64()
            ),
            EngineEvent::Restored { id, .. } => {
                println!("\nUndo successful: \"{}\" has been restored.", self.label(&id))
            }
            EngineEvent::WriteFailed { id, kind: WriteKind::Score, error } => {
                println!("\nError: failed to save the score of \"{}\": {error}", self.label(&id))
            }
            EngineEvent::WriteFailed { id, kind: WriteKind::Delete, error } => {
                println!("\nError: failed to delete \"{}\": {error}", self.label(&id))
            }
            EngineEvent::RemovalCommitted { .. } | EngineEvent::PairChanged(_) => {}
        }
    }
}

fn flush_stdout() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
}

/// Run duels until the user quits or stdin closes, then commit pending removals.
pub async fn run_play(mut engine: RankingEngine<SongInfo>, mut events: UnboundedReceiver<EngineEvent>) {
    let labels = engine
        .items()
        .iter()
        .map(|item| (item.id.clone(), item.metadata.label()))
        .collect();
    engine.select();
    let mut session = Session { engine, labels, removed: Vec::new() };

    println!("{HELP}");
    session.print_pair();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read stdin");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    session.print_pair();
                    continue;
                }
                match parse_command(&line) {
                    Some(command) => {
                        if !session.handle(command) {
                            break;
                        }
                    }
                    None => println!("Unknown command \"{}\". Type h for help.", line.trim()),
                }
                while let Ok(event) = events.try_recv() {
                    session.render(event);
                }
                session.print_pair();
            }
            Some(event) = events.recv() => {
                let visible = !matches!(event, EngineEvent::RemovalCommitted { .. } | EngineEvent::PairChanged(_));
                session.render(event);
                if visible {
                    session.print_pair();
                }
            }
        }
    }

    println!();
    session.engine.shutdown().await;
    while let Ok(event) = events.try_recv() {
        session.render(event);
    }
    println!("{} duels this session.", session.engine.comparisons_made());
}
