#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use decode::machine::{Effect, Match, MatchEvent};
use decode::session::{SessionEvent, SharedStats};
use decode::stats::{MemoryStore, StatsRecorder};
use decode::types::{GameConfig, ServerMsg};
use decode::words::WordPool;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{Mutex, broadcast};

/// Default settings with a custom number of rounds.
pub fn test_config(total_rounds: u32) -> GameConfig {
    GameConfig {
        total_rounds,
        ..GameConfig::default()
    }
}

pub fn seeded_rng() -> StdRng {
    StdRng::seed_from_u64(2024)
}

/// A match with named teams, already past setup.
pub fn named_match(total_rounds: u32, rng: &mut StdRng) -> Match {
    let mut game = Match::new(&test_config(total_rounds), WordPool::default()).unwrap();
    for (team, name) in ["Team A", "Team B"].into_iter().enumerate() {
        game.handle(MatchEvent::SetTeamName { team, name: name.to_string() }, rng)
            .unwrap();
    }
    game.handle(MatchEvent::ConfirmSetup, rng).unwrap();
    game
}

/// Starts the active team's turn, guesses `hits` of its words and ends the
/// turn by hand unless the guesses already cleared the list.
pub fn play_turn(game: &mut Match, rng: &mut StdRng, hits: usize) -> Vec<Effect> {
    game.handle(MatchEvent::StartTurn, rng).unwrap();
    let team = game.active_team();
    let words: Vec<String> = game.teams()[team].assigned.iter().take(hits).cloned().collect();

    let mut effects = Vec::new();
    for word in words {
        effects = game.handle(MatchEvent::Guess { word }, rng).unwrap();
    }
    if hits < game.teams()[team].assigned.len() {
        effects = game.handle(MatchEvent::EndTurn, rng).unwrap();
    }
    effects
}

pub fn memory_recorder(history_limit: usize) -> (Arc<MemoryStore>, StatsRecorder) {
    let store = Arc::new(MemoryStore::new());
    let recorder = StatsRecorder::load(store.clone(), history_limit);
    (store, recorder)
}

pub fn shared_stats() -> SharedStats {
    let (_, recorder) = memory_recorder(10);
    Arc::new(Mutex::new(recorder))
}

/// Waits for the next message addressed to `socket_id` that satisfies `pred`.
pub async fn next_msg<F>(
    rx: &mut broadcast::Receiver<SessionEvent>,
    socket_id: &str,
    mut pred: F,
) -> ServerMsg
where
    F: FnMut(&ServerMsg) -> bool,
{
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(msg) = event.message_for(socket_id) {
                        if pred(msg) {
                            return msg.clone();
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("session closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for message")
}
