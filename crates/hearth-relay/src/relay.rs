//! Core relay logic: connection management and effect execution.
//!
//! All chat state lives in one [`Hub`] behind a single async mutex together
//! with the history log. Every inbound event locks it, runs one hub
//! operation and carries out the returned effects before unlocking, so the
//! hub only ever sees one writer at a time.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::MissedTickBehavior;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, info, warn};

use hearth_core::{ChatEvent, ConnectionId, ContentFilter, Effect, Hub, Identity, Task};

use crate::error::RelayError;
use crate::protocol::{Audience, ClientMessage, Envelope, ServerMessage};
use crate::storage::{CredentialStore, HistoryLog};

/// Maximum broadcast channel capacity.
const BROADCAST_CAPACITY: usize = 256;

/// State guarded by the relay lock.
pub struct Shared {
    pub hub: Hub,
    pub history: HistoryLog,
}

/// Shared relay state.
pub struct RelayState {
    shared: Mutex<Shared>,
    /// Outbound fan-out; every connection subscribes and filters by audience.
    pub broadcast_tx: broadcast::Sender<Envelope>,
    credentials: CredentialStore,
    shutdown_tx: watch::Sender<bool>,
    idle_sweep: Duration,
}

impl RelayState {
    pub fn new(hub: Hub, history: HistoryLog, credentials: CredentialStore, idle_sweep: Duration) -> Arc<Self> {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            shared: Mutex::new(Shared { hub, history }),
            broadcast_tx,
            credentials,
            shutdown_tx,
            idle_sweep,
        })
    }

    /// Run one hub operation and apply its effects under the lock.
    pub async fn dispatch<F>(self: &Arc<Self>, op: F)
    where
        F: FnOnce(&mut Hub) -> Vec<Effect>,
    {
        let mut shared = self.shared.lock().await;
        let effects = op(&mut shared.hub);
        self.apply(&mut shared, effects).await;
    }

    /// Read-only access to the locked state.
    pub async fn with_shared<R>(&self, f: impl FnOnce(&Shared) -> R) -> R {
        let shared = self.shared.lock().await;
        f(&shared)
    }

    pub async fn set_filter(&self, filter: ContentFilter) {
        self.shared.lock().await.hub.set_filter(filter);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    fn send(&self, audience: Audience, message: ServerMessage) {
        // No subscribers just means nobody is connected.
        let _ = self.broadcast_tx.send(Envelope { audience, message });
    }

    async fn apply(self: &Arc<Self>, shared: &mut Shared, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Notice { to, text } => {
                    let event = ChatEvent::system(text);
                    self.send(Audience::Only(to), ServerMessage::ChatEvent { event });
                }
                Effect::Publish(event) => {
                    if let Err(e) = shared.history.append(event.clone()).await {
                        error!("Failed to persist message: {e}");
                    }
                    self.send(Audience::All, ServerMessage::ChatEvent { event });
                }
                Effect::Whisper { to, from, text } => {
                    self.send(Audience::Only(to), ServerMessage::PrivateChatEvent { from, text });
                }
                Effect::Typing { from, user, is_typing } => {
                    self.send(
                        Audience::AllExcept(from),
                        ServerMessage::TypingIndicator { user, is_typing },
                    );
                }
                Effect::Presence(users) => {
                    self.send(Audience::All, ServerMessage::PresenceUpdate { users });
                }
                Effect::Signal(signal) => self.send(Audience::All, signal.into()),
                Effect::ClearHistory => {
                    if let Err(e) = shared.history.clear().await {
                        error!("Failed to persist cleared history: {e}");
                    }
                }
                Effect::StoreCredential(credential) => {
                    if let Err(e) = self.credentials.save(&credential).await {
                        error!("Failed to store admin credential: {e}");
                    }
                }
                Effect::Schedule { task, after } => self.schedule(task, after),
                Effect::Shutdown => {
                    info!("Shutdown initiated");
                    self.request_shutdown();
                }
            }
        }
    }

    fn schedule(self: &Arc<Self>, task: Task, after: Duration) {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            state.dispatch(|hub| hub.run_task(task)).await;
        });
    }
}

/// Resolves once shutdown has been requested.
async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|&stop| stop).await;
}

type WsSink = SplitSink<WebSocket, Message>;

async fn send_json(ws_tx: &mut WsSink, msg: &ServerMessage) -> Result<(), RelayError> {
    let json = serde_json::to_string(msg)?;
    ws_tx
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| RelayError::Io(std::io::Error::other(e)))
}

/// Handle a single WebSocket connection.
pub async fn handle_connection(socket: WebSocket, state: Arc<RelayState>) {
    let id = ConnectionId::random();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Subscribe under the lock so the snapshot and the live stream neither
    // overlap nor leave a gap.
    let (mut broadcast_rx, greeting) = {
        let shared = state.shared.lock().await;
        let rx = state.broadcast_tx.subscribe();
        let greeting = [
            ServerMessage::HistorySnapshot {
                events: shared.history.events().to_vec(),
            },
            ServerMessage::DisableState {
                active: shared.hub.is_disabled(),
            },
        ];
        (rx, greeting)
    };
    info!("Connection opened: {id}");
    for msg in &greeting {
        if let Err(e) = send_json(&mut ws_tx, msg).await {
            debug!("Connection {id} closed during greeting: {e}");
            return;
        }
    }

    let mut shutdown_rx = state.shutdown_signal();
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                received = broadcast_rx.recv() => match received {
                    Ok(envelope) => {
                        if !envelope.audience.includes(id) {
                            continue;
                        }
                        if send_json(&mut ws_tx, &envelope.message).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Connection {id} lagged, {skipped} messages dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = stopped(&mut shutdown_rx) => break,
            }
        }
        let _ = ws_tx.close().await;
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => handle_client_message(&recv_state, id, client_msg).await,
                    Err(e) => debug!("Ignoring malformed message from {id}: {e}"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.dispatch(|hub| hub.disconnect(id)).await;
    info!("Connection closed: {id}");
}

async fn handle_client_message(state: &Arc<RelayState>, id: ConnectionId, msg: ClientMessage) {
    match msg {
        ClientMessage::RegisterIdentity { name, color, avatar } => {
            let identity = Identity { name, color, avatar };
            state
                .dispatch(|hub| hub.register(id, identity, Instant::now()))
                .await;
        }
        ClientMessage::ChatMessage { text } => {
            state
                .dispatch(|hub| hub.handle_chat(id, &text, Instant::now()))
                .await;
        }
        ClientMessage::PrivateMessage { recipient, text } => {
            state
                .dispatch(|hub| hub.private_message(id, &recipient, &text, Instant::now()))
                .await;
        }
        ClientMessage::Typing { is_typing } => {
            state.dispatch(|hub| hub.typing(id, is_typing)).await;
        }
        ClientMessage::Rename { name } => {
            state
                .dispatch(|hub| hub.rename(id, &name, Instant::now()))
                .await;
        }
    }
}

/// Periodic idle classification until shutdown.
pub async fn run_idle_sweep(state: Arc<RelayState>) {
    let mut ticker = tokio::time::interval(state.idle_sweep);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown_rx = state.shutdown_signal();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                state.dispatch(|hub| hub.sweep_idle(Instant::now())).await;
            }
            _ = stopped(&mut shutdown_rx) => break,
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// HTTP routes: the WebSocket endpoint, a health probe and the static client.
pub fn router(state: Arc<RelayState>, static_dir: &Path) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .fallback_service(
            ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html"))),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until a shutdown is requested.
pub async fn serve(listener: TcpListener, state: Arc<RelayState>, static_dir: &Path) -> Result<(), RelayError> {
    tokio::spawn(run_idle_sweep(state.clone()));
    let mut shutdown_rx = state.shutdown_signal();
    let app = router(state, static_dir);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { stopped(&mut shutdown_rx).await })
        .await?;
    info!("Relay stopped");
    Ok(())
}
