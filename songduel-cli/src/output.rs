/// Output formatting: terminal table and JSON.
use serde::Serialize;
use songduel_core::Item;

use crate::library::SongInfo;

const BAR_WIDTH: usize = 20;

#[derive(Serialize)]
struct JsonRankedSong<'a> {
    rank: usize,
    id: &'a str,
    name: &'a str,
    artists: &'a str,
    score: i32,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    songs: Vec<JsonRankedSong<'a>>,
    total_songs: usize,
}

/// Bar length for `score`, scaled between the lowest and highest score shown.
fn bar_len(score: i32, min: i32, max: i32) -> usize {
    if max <= min {
        return BAR_WIDTH;
    }
    let frac = (score - min) as f64 / (max - min) as f64;
    1 + (frac * (BAR_WIDTH - 1) as f64).round() as usize
}

/// Print a ranked list (best first) as a terminal table.
pub fn print_table(ranked: &[&Item<SongInfo>]) {
    if ranked.is_empty() {
        println!("No songs in the library yet.");
        return;
    }

    let labels: Vec<String> = ranked.iter().map(|item| item.metadata.label()).collect();
    let name_width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(4).max(4);
    let max = ranked.first().map(|item| item.score).unwrap_or_default();
    let min = ranked.last().map(|item| item.score).unwrap_or_default();

    println!("  # | {:<name_width$} | Score |", "Song");
    println!("----|-{}-|-------|-{}", "-".repeat(name_width), "-".repeat(BAR_WIDTH));

    for (i, (item, label)) in ranked.iter().zip(&labels).enumerate() {
        println!(
            "{:>3} | {:<name_width$} | {:>5} | {}",
            i + 1,
            label,
            item.score,
            "█".repeat(bar_len(item.score, min, max)),
        );
    }

    println!("\n{} songs ranked", ranked.len());
}

/// Print a ranked list as JSON.
pub fn print_json(ranked: &[&Item<SongInfo>]) {
    let songs = ranked
        .iter()
        .enumerate()
        .map(|(i, item)| JsonRankedSong {
            rank: i + 1,
            id: &item.id,
            name: &item.metadata.name,
            artists: &item.metadata.artists,
            score: item.score,
        })
        .collect();

    let output = JsonOutput { songs, total_songs: ranked.len() };
    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{json}"),
        Err(e) => crate::bail(format!("Failed to encode leaderboard: {e}")),
    }
}
