use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::ConfigError;
use crate::types::GameConfig;
use crate::words::{DEFAULT_WORDS, WordPool};

/// Resolves a path relative to the config directory.
pub fn config_path(sub: &str) -> PathBuf {
    let base = std::env::var("CONFIG_PATH")
        .unwrap_or_else(|_| "config".to_string());
    Path::new(&base).join(sub)
}

/// Initialize the config directory with defaults if missing.
pub fn init() -> Result<(), ConfigError> {
    init_at(&config_path(""))
}

pub fn init_at(base: &Path) -> Result<(), ConfigError> {
    create_dir(base)?;

    let game_path = base.join("game.json");
    if !game_path.exists() {
        write_json(&game_path, &GameConfig::default())?;
    }

    let words_path = base.join("words.json");
    if !words_path.exists() {
        write_json(&words_path, &DEFAULT_WORDS)?;
    }

    create_dir(&store_dir_at(base))
}

/// Directory holding the persisted stats.
pub fn store_dir() -> PathBuf {
    store_dir_at(&config_path(""))
}

pub fn store_dir_at(base: &Path) -> PathBuf {
    base.join("store")
}

/// Load and validate the game configuration.
pub fn load_game_config() -> Result<GameConfig, ConfigError> {
    load_game_config_at(&config_path(""))
}

pub fn load_game_config_at(base: &Path) -> Result<GameConfig, ConfigError> {
    let config: GameConfig = read_json(&base.join("game.json"))?;
    validate(&config)?;
    Ok(config)
}

/// Load the word pool and check it can fill both teams' lists.
pub fn load_word_pool(words_per_team: usize) -> Result<WordPool, ConfigError> {
    load_word_pool_at(&config_path(""), words_per_team)
}

pub fn load_word_pool_at(base: &Path, words_per_team: usize) -> Result<WordPool, ConfigError> {
    let words: Vec<String> = read_json(&base.join("words.json"))?;
    let pool = WordPool::new(words);
    pool.ensure_fits(words_per_team)?;
    Ok(pool)
}

pub fn validate(config: &GameConfig) -> Result<(), ConfigError> {
    let positive = [
        ("roundTime", u64::from(config.round_time)),
        ("totalRounds", u64::from(config.total_rounds)),
        ("wordsPerTeam", config.words_per_team as u64),
        ("historyLimit", config.history_limit as u64),
        ("tickMillis", config.tick_millis),
    ];
    for (name, value) in positive {
        if value == 0 {
            return Err(ConfigError::Invalid {
                name,
                reason: "must be greater than zero".to_string(),
            });
        }
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let data = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Encode {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, data).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
