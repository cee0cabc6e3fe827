/// Config file loading and creation for the songduel CLI.
///
/// Config lives at ~/.config/songduel/config.toml.
/// All fields are optional. CLI args override config values.
use serde::Deserialize;
use songduel_core::{EngineConfig, EngineError};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bail;

#[derive(Deserialize, Default, Debug, PartialEq)]
pub struct SongduelConfig {
    pub library: Option<PathBuf>,
    pub exploration_rate: Option<f64>,
    pub k_factor: Option<f64>,
    pub boosted_k_factor: Option<f64>,
    pub score_noise: Option<f64>,
    pub undo_window_ms: Option<u64>,
}

/// Engine tunables given on the command line. `None` falls back to the config file.
#[derive(Debug, Default, Clone)]
pub struct EngineOverrides {
    pub exploration_rate: Option<f64>,
    pub undo_window_ms: Option<u64>,
}

impl SongduelConfig {
    /// Merge CLI overrides, config values and built-in defaults (in that order),
    /// then check the result is usable.
    pub fn engine_config(&self, overrides: &EngineOverrides) -> Result<EngineConfig, EngineError> {
        let defaults = EngineConfig::default();
        let undo_window = overrides
            .undo_window_ms
            .or(self.undo_window_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.undo_window);

        let config = EngineConfig {
            exploration_rate: overrides
                .exploration_rate
                .or(self.exploration_rate)
                .unwrap_or(defaults.exploration_rate),
            k_factor: self.k_factor.unwrap_or(defaults.k_factor),
            boosted_k_factor: self.boosted_k_factor.unwrap_or(defaults.boosted_k_factor),
            score_noise: self.score_noise.unwrap_or(defaults.score_noise),
            score_floor: defaults.score_floor,
            undo_window,
        };
        config.validate()?;
        Ok(config)
    }
}

const DEFAULT_CONFIG_TEMPLATE: &str = "\
# songduel configuration
# All values here can be overridden by CLI flags.

# Library file used when --library is not given
# library = \"/home/me/music/library.json\"

# Chance that a duel pits a bottom-quartile song against a top-quartile one
# exploration_rate = 0.2

# Elo K-factor for a normal win and for a boosted win
# k_factor = 32
# boosted_k_factor = 64

# Half-width of the random noise added to every new score (0 disables it)
# score_noise = 5

# How long a removed song can be restored before it is deleted for good
# undo_window_ms = 3000
";

/// Returns the default config path: ~/.config/songduel/config.toml
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| bail("HOME environment variable not set"));
    PathBuf::from(home).join(".config").join("songduel").join("config.toml")
}

/// Load config from a file path. Returns default (all None) if file doesn't exist.
pub fn load_config(path: &Path) -> SongduelConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content)
            .unwrap_or_else(|e| bail(format!("Failed to parse config at {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => SongduelConfig::default(),
        Err(e) => bail(format!("Failed to read config at {}: {e}", path.display())),
    }
}

fn parse_config(content: &str) -> Result<SongduelConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Create the default config file. Errors if it already exists.
pub fn create_default_config() -> PathBuf {
    let path = config_path();

    if path.exists() {
        bail(format!("Config file already exists at {}", path.display()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| bail(format!("Failed to create directory {}: {e}", parent.display())));
    }

    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .unwrap_or_else(|e| bail(format!("Failed to write config to {}: {e}", path.display())));

    path
}
