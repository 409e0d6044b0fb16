use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc, watch};
use uuid::Uuid;

use crate::error::{ConfigError, MatchError};
use crate::machine::{Effect, Match, MatchEvent};
use crate::stats::StatsRecorder;
use crate::types::*;
use crate::words::WordPool;

/// Stats shared by every session of the process.
pub type SharedStats = Arc<Mutex<StatsRecorder>>;

/// How many names the stats ranking shows.
const RANKING_SIZE: usize = 3;

/// Commands the WebSocket handler and the countdown send to a session task.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Connect {
        socket_id: String,
    },
    Disconnect {
        socket_id: String,
    },
    Action {
        socket_id: String,
        event: MatchEvent,
    },
    Tick {
        epoch: u64,
    },
    GetStats {
        socket_id: String,
    },
    ResetStats {
        socket_id: String,
    },
    /// Drops the session if nobody is attached and no page connected since
    /// the check was scheduled.
    IdleCheck {
        generation: u64,
    },
}

/// Events broadcast from the session to WebSocket connections.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Send a message to a specific socket.
    SendTo { socket_id: String, msg: ServerMsg },
    /// Broadcast a message to all sockets in the session.
    Broadcast { msg: ServerMsg },
}

impl SessionEvent {
    /// The message, if it is meant for `socket_id`.
    pub fn message_for(&self, socket_id: &str) -> Option<&ServerMsg> {
        match self {
            Self::SendTo { socket_id: target, msg } if target == socket_id => Some(msg),
            Self::SendTo { .. } => None,
            Self::Broadcast { msg } => Some(msg),
        }
    }
}

/// Registry holds all live sessions.
pub struct Registry {
    /// session_id -> handle
    pub sessions: dashmap::DashMap<String, SessionHandle>,
}

#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: String,
    pub cmd_tx: mpsc::Sender<SessionCommand>,
    pub event_tx: broadcast::Sender<SessionEvent>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: dashmap::DashMap::new(),
        })
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|h| h.clone())
    }

    pub fn remove_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

struct SessionState {
    session_id: String,
    game: Match,
    sockets: HashSet<String>,
    tick: Duration,
    idle_grace: Duration,
    /// Bumped on every connect; idle checks from an older generation are stale.
    idle_generation: u64,
    timer_cancel: Option<watch::Sender<bool>>,
    cmd_tx: mpsc::Sender<SessionCommand>,
    stats: SharedStats,
}

impl SessionState {
    fn broadcast(&self, tx: &broadcast::Sender<SessionEvent>, msg: ServerMsg) {
        let _ = tx.send(SessionEvent::Broadcast { msg });
    }

    fn send_to(&self, tx: &broadcast::Sender<SessionEvent>, socket_id: &str, msg: ServerMsg) {
        let _ = tx.send(SessionEvent::SendTo {
            socket_id: socket_id.to_string(),
            msg,
        });
    }

    async fn match_state(&self) -> ServerMsg {
        let stats = self.stats.lock().await;
        ServerMsg::MatchState {
            view: self.game.view(|name| stats.wins(name)),
        }
    }

    async fn stats_msg(&self) -> ServerMsg {
        let stats = self.stats.lock().await;
        ServerMsg::Stats {
            stats: stats.stats().clone(),
            ranking: stats.stats().ranking(RANKING_SIZE),
        }
    }

    fn team_name(&self, team: usize) -> String {
        self.game.teams()[team].display_name(team)
    }

    fn arm_timer(&mut self, epoch: u64) {
        self.cancel_timer();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.timer_cancel = Some(cancel_tx);
        tokio::spawn(run_countdown(epoch, self.tick, self.cmd_tx.clone(), cancel_rx));
    }

    fn cancel_timer(&mut self) {
        if let Some(cancel) = self.timer_cancel.take() {
            let _ = cancel.send(true);
        }
    }
}

/// Create a new session and spawn its task. Returns the session handle.
pub fn create_session(
    registry: Arc<Registry>,
    config: &GameConfig,
    pool: WordPool,
    stats: SharedStats,
) -> Result<SessionHandle, ConfigError> {
    let game = Match::new(config, pool)?;
    let session_id = Uuid::new_v4().to_string();

    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (event_tx, _) = broadcast::channel(256);

    let handle = SessionHandle {
        session_id: session_id.clone(),
        cmd_tx: cmd_tx.clone(),
        event_tx: event_tx.clone(),
    };

    registry.sessions.insert(session_id.clone(), handle.clone());

    let state = SessionState {
        session_id: session_id.clone(),
        game,
        sockets: HashSet::new(),
        tick: Duration::from_millis(config.tick_millis),
        idle_grace: Duration::from_secs(config.session_idle_secs),
        idle_generation: 0,
        timer_cancel: None,
        cmd_tx,
        stats,
    };

    tokio::spawn(session_task(state, cmd_rx, event_tx, registry));
    // Drop the session if no page ever connects to it.
    schedule_idle_check(handle.cmd_tx.clone(), Duration::from_secs(config.session_idle_secs), 0);

    tracing::info!("Session created: {}", session_id);

    Ok(handle)
}

/// Sends one tick per period until cancelled or the session is gone.
async fn run_countdown(
    epoch: u64,
    period: Duration,
    cmd_tx: mpsc::Sender<SessionCommand>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {
                if cmd_tx.send(SessionCommand::Tick { epoch }).await.is_err() {
                    return;
                }
            }
            _ = cancel_rx.changed() => {
                return;
            }
        }
    }
}

async fn session_task(
    mut state: SessionState,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
    registry: Arc<Registry>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            SessionCommand::Connect { socket_id } => {
                handle_connect(&mut state, &event_tx, socket_id).await;
            }
            SessionCommand::Disconnect { socket_id } => {
                handle_disconnect(&mut state, socket_id);
            }
            SessionCommand::Action { socket_id, event } => {
                handle_event(&mut state, &event_tx, Some(socket_id.as_str()), event).await;
            }
            SessionCommand::Tick { epoch } => {
                // Ticks from a superseded countdown change nothing.
                if epoch != state.game.epoch() {
                    continue;
                }
                handle_event(&mut state, &event_tx, None, MatchEvent::Tick { epoch }).await;
            }
            SessionCommand::GetStats { socket_id } => {
                let msg = state.stats_msg().await;
                state.send_to(&event_tx, &socket_id, msg);
            }
            SessionCommand::ResetStats { socket_id } => {
                handle_reset_stats(&mut state, &event_tx, socket_id).await;
            }
            SessionCommand::IdleCheck { generation } => {
                if generation == state.idle_generation && state.sockets.is_empty() {
                    state.cancel_timer();
                    break;
                }
            }
        }
    }

    state.cancel_timer();
    registry.remove_session(&state.session_id);
    tracing::info!("Session {} task ended", state.session_id);
}

async fn handle_connect(
    state: &mut SessionState,
    tx: &broadcast::Sender<SessionEvent>,
    socket_id: String,
) {
    state.sockets.insert(socket_id.clone());
    state.idle_generation += 1;
    state.send_to(tx, &socket_id, ServerMsg::SessionJoined {
        session_id: state.session_id.clone(),
    });
    let msg = state.match_state().await;
    state.send_to(tx, &socket_id, msg);
}

fn handle_disconnect(state: &mut SessionState, socket_id: String) {
    state.sockets.remove(&socket_id);
    if !state.sockets.is_empty() {
        return;
    }

    // Give the page time to reload before dropping the match.
    schedule_idle_check(state.cmd_tx.clone(), state.idle_grace, state.idle_generation);
}

fn schedule_idle_check(cmd_tx: mpsc::Sender<SessionCommand>, grace: Duration, generation: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let _ = cmd_tx.send(SessionCommand::IdleCheck { generation }).await;
    });
}

async fn handle_event(
    state: &mut SessionState,
    tx: &broadcast::Sender<SessionEvent>,
    sender: Option<&str>,
    event: MatchEvent,
) {
    let result = {
        let mut rng = rand::rng();
        state.game.handle(event, &mut rng)
    };

    match result {
        Ok(effects) => {
            for effect in effects {
                apply_effect(state, tx, effect).await;
            }
            let msg = state.match_state().await;
            state.broadcast(tx, msg);
        }
        Err(err) => reject(state, tx, sender, err),
    }
}

fn reject(
    state: &SessionState,
    tx: &broadcast::Sender<SessionEvent>,
    sender: Option<&str>,
    err: MatchError,
) {
    let Some(socket_id) = sender else {
        tracing::warn!("Session {}: {}", state.session_id, err);
        return;
    };

    let msg = if err.is_warning() {
        ServerMsg::Notice {
            level: NoticeLevel::Warning,
            message: err.to_string(),
        }
    } else {
        ServerMsg::ErrorMessage {
            message: err.to_string(),
        }
    };
    state.send_to(tx, socket_id, msg);
}

async fn apply_effect(
    state: &mut SessionState,
    tx: &broadcast::Sender<SessionEvent>,
    effect: Effect,
) {
    match effect {
        Effect::ArmTimer { epoch } => state.arm_timer(epoch),
        Effect::CancelTimer => state.cancel_timer(),
        Effect::TurnEnded { team, reason, score } => {
            let team_name = state.team_name(team);
            if reason == TurnEndReason::Cleared {
                state.broadcast(tx, ServerMsg::Notice {
                    level: NoticeLevel::Success,
                    message: format!("{} guessed every word!", team_name),
                });
            }
            state.broadcast(tx, ServerMsg::TurnEnded {
                team,
                team_name,
                score,
                reason,
            });
        }
        Effect::RoundCommitted { round, next_round } => {
            tracing::info!("Session {} finished round {}", state.session_id, round);
            state.broadcast(tx, ServerMsg::RoundComplete { round, next_round });
        }
        Effect::MatchFinished(result) => {
            let recorded = state.stats.lock().await.record(result);
            match recorded {
                Ok(record) => {
                    state.broadcast(tx, ServerMsg::MatchComplete { record });
                    let msg = state.stats_msg().await;
                    state.broadcast(tx, msg);
                }
                Err(e) => {
                    tracing::error!("Session {}: failed to save match: {}", state.session_id, e);
                    state.broadcast(tx, ServerMsg::ErrorMessage {
                        message: "Failed to save the match result".to_string(),
                    });
                }
            }
        }
    }
}

async fn handle_reset_stats(
    state: &mut SessionState,
    tx: &broadcast::Sender<SessionEvent>,
    socket_id: String,
) {
    let reset = state.stats.lock().await.reset();
    if let Err(e) = reset {
        tracing::error!("Failed to reset stats: {}", e);
        state.send_to(tx, &socket_id, ServerMsg::ErrorMessage {
            message: "Failed to reset statistics".to_string(),
        });
        return;
    }

    tracing::info!("Stats reset from session {}", state.session_id);
    let msg = state.stats_msg().await;
    state.broadcast(tx, msg);
    let msg = state.match_state().await;
    state.broadcast(tx, msg);
}
