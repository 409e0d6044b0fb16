use thiserror::Error;

use crate::types::MatchStatus;

/// Rejections produced by the match state machine. None of them change state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("word already used: {word}")]
    WordAlreadyUsed { word: String },
    #[error("word is not on the active team's list: {word}")]
    UnknownWord { word: String },
    #[error("no team at index {0}")]
    InvalidTeam(usize),
    #[error("no player at index {0}")]
    InvalidPlayer(usize),
    #[error("cannot {action} while {status}")]
    NotAllowed {
        action: &'static str,
        status: MatchStatus,
    },
}

impl MatchError {
    /// Rejections that are part of normal play and shown as a warning.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::WordAlreadyUsed { .. })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode stats: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("word pool has {available} distinct words, need at least {required}")]
    PoolTooSmall { available: usize, required: usize },
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
