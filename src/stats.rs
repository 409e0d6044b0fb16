//! Persistent win statistics.
//!
//! The whole [`Stats`] value lives under a single key of a [`KeyValueStore`]
//! and is replaced wholesale on every mutation.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const STATS_KEY: &str = "decode-game-stats";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRecord {
    pub name: String,
    pub final_score: u32,
    pub players: Vec<String>,
    pub round_scores: Vec<u32>,
}

/// A finished match, before it gets an id and a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub teams: Vec<TeamRecord>,
    /// Display name of the winning team; also the key of the win counter.
    pub winner: String,
    pub rounds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: String,
    pub date: String,
    pub teams: Vec<TeamRecord>,
    pub winner: String,
    pub rounds: u32,
}

impl MatchRecord {
    fn stamp(result: MatchResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date: chrono::Utc::now().to_rfc3339(),
            teams: result.teams,
            winner: result.winner,
            rounds: result.rounds,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub total_matches: u32,
    pub team_wins: BTreeMap<String, u32>,
    /// Newest first.
    pub match_history: Vec<MatchRecord>,
}

impl Stats {
    /// Team names with the most wins, best first.
    pub fn ranking(&self, limit: usize) -> Vec<(String, u32)> {
        let mut ranking: Vec<(String, u32)> = self
            .team_wins
            .iter()
            .map(|(name, wins)| (name.clone(), *wins))
            .collect();
        ranking.sort_by(|a, b| b.1.cmp(&a.1));
        ranking.truncate(limit);
        ranking
    }

    pub fn distinct_teams(&self) -> usize {
        self.team_wins.len()
    }
}

/// String key-value storage the stats are persisted into.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Keeps each key in `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Owns the aggregate stats and writes them back after each change.
pub struct StatsRecorder {
    store: Arc<dyn KeyValueStore>,
    key: String,
    history_limit: usize,
    stats: Stats,
}

impl StatsRecorder {
    pub fn load(store: Arc<dyn KeyValueStore>, history_limit: usize) -> Self {
        Self::load_key(store, STATS_KEY, history_limit)
    }

    /// Reads `key` from the store. Missing or unreadable data starts empty.
    pub fn load_key(store: Arc<dyn KeyValueStore>, key: &str, history_limit: usize) -> Self {
        let stats = match store.get(key) {
            Ok(Some(data)) => match serde_json::from_str::<Stats>(&data) {
                Ok(mut stats) => {
                    stats.match_history.truncate(history_limit);
                    stats
                }
                Err(e) => {
                    tracing::warn!("Ignoring malformed stats under {}: {}", key, e);
                    Stats::default()
                }
            },
            Ok(None) => Stats::default(),
            Err(e) => {
                tracing::warn!("Failed to read stats under {}: {}", key, e);
                Stats::default()
            }
        };

        Self {
            store,
            key: key.to_string(),
            history_limit,
            stats,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn wins(&self, team_name: &str) -> u32 {
        self.stats.team_wins.get(team_name).copied().unwrap_or(0)
    }

    /// Stamps and stores a finished match. If the write fails nothing changes.
    pub fn record(&mut self, result: MatchResult) -> Result<MatchRecord, StoreError> {
        let record = MatchRecord::stamp(result);

        let mut next = self.stats.clone();
        next.total_matches += 1;
        *next.team_wins.entry(record.winner.clone()).or_insert(0) += 1;
        next.match_history.insert(0, record.clone());
        next.match_history.truncate(self.history_limit);

        self.replace(next)?;
        tracing::info!(
            "Recorded match {}: {} won ({} total)",
            record.id,
            record.winner,
            self.stats.total_matches
        );
        Ok(record)
    }

    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.replace(Stats::default())
    }

    fn replace(&mut self, next: Stats) -> Result<(), StoreError> {
        let data = serde_json::to_string(&next)?;
        self.store.set(&self.key, &data)?;
        self.stats = next;
        Ok(())
    }
}
