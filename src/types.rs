use serde::{Deserialize, Serialize};

use crate::stats::{MatchRecord, Stats};

/// Game configuration loaded from game.json.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    /// Countdown budget of a turn, in ticks.
    pub round_time: u32,
    pub total_rounds: u32,
    pub words_per_team: usize,
    /// How many match records the stats history keeps.
    pub history_limit: usize,
    pub tick_millis: u64,
    /// Start the second team's turn as soon as the first one ends.
    pub auto_advance_turns: bool,
    /// Grace period before an abandoned session is dropped.
    pub session_idle_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            round_time: 120,
            total_rounds: 3,
            words_per_team: 10,
            history_limit: 10,
            tick_millis: 1000,
            auto_advance_turns: false,
            session_idle_secs: 600,
        }
    }
}

/// Coarse match state, without the per-state data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Setup,
    Idle,
    Active,
    MatchComplete,
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup => write!(f, "SETUP"),
            Self::Idle => write!(f, "IDLE"),
            Self::Active => write!(f, "ACTIVE"),
            Self::MatchComplete => write!(f, "MATCH_COMPLETE"),
        }
    }
}

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnEndReason {
    TimeUp,
    /// The team guessed every word on its list.
    Cleared,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
}

/// One word of the active team's list as shown on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordView {
    pub word: String,
    pub guessed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamView {
    pub name: String,
    pub display_name: String,
    pub players: [String; 2],
    pub score: u32,
    pub match_score: u32,
    pub round_scores: Vec<u32>,
    pub wins: u32,
}

/// Everything the page needs to render the current match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchView {
    pub status: MatchStatus,
    pub round: u32,
    pub total_rounds: u32,
    pub active_team: usize,
    pub time_left: u32,
    pub teams: Vec<TeamView>,
    /// Only filled while a turn is running.
    pub words: Vec<WordView>,
    pub winner: Option<usize>,
}

/// Messages sent from server to clients via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    SessionJoined {
        session_id: String,
    },
    MatchState {
        view: MatchView,
    },
    Notice {
        level: NoticeLevel,
        message: String,
    },
    TurnEnded {
        team: usize,
        team_name: String,
        score: u32,
        reason: TurnEndReason,
    },
    RoundComplete {
        round: u32,
        next_round: Option<u32>,
    },
    MatchComplete {
        record: MatchRecord,
    },
    Stats {
        stats: Stats,
        ranking: Vec<(String, u32)>,
    },
    ErrorMessage {
        message: String,
    },
    Reset {
        message: String,
    },
}

/// Messages sent from clients to server via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    JoinSession { session_id: String },
    SetTeamName { team: usize, name: String },
    SetPlayerName { team: usize, player: usize, name: String },
    ConfirmSetup,
    StartTurn,
    Guess { word: String },
    EndTurn,
    ResetMatch,
    GetStats,
    ResetStats,
}
