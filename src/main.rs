use std::sync::Arc;

use askama::Template;
use axum::Json;
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect};
use axum::routing::get;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;

use decode::config;
use decode::machine::MatchEvent;
use decode::session::{self, Registry, SessionCommand, SessionEvent, SessionHandle, SharedStats};
use decode::stats::{FileStore, Stats, StatsRecorder};
use decode::types::*;
use decode::words::WordPool;

type SocketSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
    game_config: GameConfig,
    pool: WordPool,
    stats: SharedStats,
}

// ─── Templates ────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    round_time: u32,
    total_matches: u32,
    distinct_teams: usize,
    ranking: Vec<(String, u32)>,
}

#[derive(Template)]
#[template(path = "play.html")]
struct PlayTemplate {
    session_id: String,
    total_rounds: u32,
    round_time: u32,
}

// ─── Routes ───────────────────────────────────────────────────────

async fn index_page(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.stats.lock().await;
    let page = IndexTemplate {
        round_time: state.game_config.round_time,
        total_matches: stats.stats().total_matches,
        distinct_teams: stats.stats().distinct_teams(),
        ranking: stats.stats().ranking(3),
    };
    Html(page.to_string())
}

async fn new_session(State(state): State<AppState>) -> impl IntoResponse {
    match session::create_session(
        state.registry.clone(),
        &state.game_config,
        state.pool.clone(),
        state.stats.clone(),
    ) {
        Ok(handle) => Redirect::to(&format!("/play/{}", handle.session_id)).into_response(),
        Err(e) => {
            tracing::error!("Failed to create session: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn play_page(Path(session_id): Path<String>, State(state): State<AppState>) -> impl IntoResponse {
    if state.registry.get(&session_id).is_none() {
        return Redirect::to("/").into_response();
    }
    let page = PlayTemplate {
        session_id,
        total_rounds: state.game_config.total_rounds,
        round_time: state.game_config.round_time,
    };
    Html(page.to_string()).into_response()
}

async fn stats_json(State(state): State<AppState>) -> Json<Stats> {
    Json(state.stats.lock().await.stats().clone())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let sender: SocketSink = Arc::new(Mutex::new(sender));

    let socket_id = uuid::Uuid::new_v4().to_string();
    tracing::info!("WebSocket connected: {}", socket_id);

    let mut current: Option<SessionHandle> = None;
    let mut event_task: Option<JoinHandle<()>> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };

        let client_msg: ClientMsg = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid message: {}", e);
                continue;
            }
        };

        if let ClientMsg::JoinSession { session_id } = client_msg {
            let Some(handle) = state.registry.get(&session_id) else {
                send_msg(&sender, &ServerMsg::Reset {
                    message: "Session not found".to_string(),
                }).await;
                continue;
            };

            if let Some(previous) = current.take() {
                let _ = previous.cmd_tx.send(SessionCommand::Disconnect {
                    socket_id: socket_id.clone(),
                }).await;
            }
            if let Some(task) = event_task.take() {
                task.abort();
            }

            // Subscribe before connecting so the greeting is not missed.
            let rx = handle.event_tx.subscribe();
            event_task = Some(tokio::spawn(forward_events(rx, sender.clone(), socket_id.clone())));
            let _ = handle.cmd_tx.send(SessionCommand::Connect {
                socket_id: socket_id.clone(),
            }).await;
            current = Some(handle);
            continue;
        }

        let Some(handle) = current.as_ref() else {
            send_msg(&sender, &ServerMsg::ErrorMessage {
                message: "Join a session first".to_string(),
            }).await;
            continue;
        };

        let Some(cmd) = to_command(client_msg, &socket_id) else { continue };
        if handle.cmd_tx.send(cmd).await.is_err() {
            send_msg(&sender, &ServerMsg::Reset {
                message: "Session expired".to_string(),
            }).await;
            current = None;
        }
    }

    // Socket disconnected
    tracing::info!("WebSocket disconnected: {}", socket_id);
    if let Some(task) = event_task {
        task.abort();
    }
    if let Some(handle) = current {
        let _ = handle.cmd_tx.send(SessionCommand::Disconnect { socket_id }).await;
    }
}

fn to_command(msg: ClientMsg, socket_id: &str) -> Option<SessionCommand> {
    let socket_id = socket_id.to_string();
    let event = match msg {
        ClientMsg::JoinSession { .. } => return None,
        ClientMsg::GetStats => return Some(SessionCommand::GetStats { socket_id }),
        ClientMsg::ResetStats => return Some(SessionCommand::ResetStats { socket_id }),
        ClientMsg::SetTeamName { team, name } => MatchEvent::SetTeamName { team, name },
        ClientMsg::SetPlayerName { team, player, name } => {
            MatchEvent::SetPlayerName { team, player, name }
        }
        ClientMsg::ConfirmSetup => MatchEvent::ConfirmSetup,
        ClientMsg::StartTurn => MatchEvent::StartTurn,
        ClientMsg::Guess { word } => MatchEvent::Guess { word },
        ClientMsg::EndTurn => MatchEvent::EndTurn,
        ClientMsg::ResetMatch => MatchEvent::Reset,
    };
    Some(SessionCommand::Action { socket_id, event })
}

async fn forward_events(
    mut event_rx: broadcast::Receiver<SessionEvent>,
    sender: SocketSink,
    socket_id: String,
) {
    loop {
        match event_rx.recv().await {
            Ok(event) => {
                let Some(msg) = event.message_for(&socket_id) else { continue };
                if let Ok(json) = serde_json::to_string(msg) {
                    let mut s = sender.lock().await;
                    if s.send(Message::Text(json.into())).await.is_err() {
                        return;
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn send_msg(sender: &SocketSink, msg: &ServerMsg) {
    if let Ok(json) = serde_json::to_string(msg) {
        let mut s = sender.lock().await;
        let _ = s.send(Message::Text(json.into())).await;
    }
}

// ─── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    config::init().expect("Failed to initialize config directory");

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .expect("Invalid PORT");

    let game_config = config::load_game_config().expect("Failed to load game.json");
    let pool = config::load_word_pool(game_config.words_per_team).expect("Failed to load words.json");

    let store = FileStore::open(config::store_dir()).expect("Failed to open stats store");
    let recorder = StatsRecorder::load(Arc::new(store), game_config.history_limit);
    tracing::info!(
        "Loaded {} words, {} recorded matches",
        pool.len(),
        recorder.stats().total_matches
    );

    let state = AppState {
        registry: Registry::new(),
        game_config,
        pool,
        stats: Arc::new(Mutex::new(recorder)),
    };

    let app = Router::new()
        .route("/", get(index_page))
        .route("/new", get(new_session))
        .route("/play/{session_id}", get(play_page))
        .route("/ws", get(ws_handler))
        .route("/api/stats", get(stats_json))
        .nest_service("/static", ServeDir::new("static"))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .expect("Failed to bind");

    tracing::info!("Decode server running on port {}", port);

    axum::serve(listener, app).await.expect("Server error");
}
