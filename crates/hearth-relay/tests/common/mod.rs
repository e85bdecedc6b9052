#![allow(dead_code)]

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use hearth_core::HubConfig;
use hearth_relay::config::RelayConfig;
use hearth_relay::relay::RelayState;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub const PASSWORD: &str = "correct horse";

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<RelayState>,
    pub dir: TempDir,
}

pub fn test_config(dir: &TempDir) -> RelayConfig {
    RelayConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        static_dir: dir.path().to_path_buf(),
        history_path: dir.path().join("chat-history.json"),
        credential_path: dir.path().join("admin.credential"),
        admin_password: Some(PASSWORD.to_string()),
        idle_sweep: Duration::from_secs(5),
        blocklist_urls: Vec::new(),
        hub: HubConfig::default(),
    }
}

pub async fn start_server() -> TestServer {
    start_server_with(|_| {}).await
}

pub async fn start_server_with(tweak: impl FnOnce(&mut RelayConfig)) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    tweak(&mut config);

    let state = hearth_relay::build_state(&config).await.unwrap();
    let listener = TcpListener::bind(config.listen).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let run_state = state.clone();
    tokio::spawn(async move {
        hearth_relay::run(listener, run_state, &config).await.unwrap();
    });

    TestServer { addr, state, dir }
}

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestClient {
    pub ws_tx: SplitSink<Ws, Message>,
    pub ws_rx: SplitStream<Ws>,
    /// Events from the history snapshot received on connect.
    pub history: Vec<Value>,
    /// Temp-disable flag received on connect.
    pub disabled: bool,
}

impl TestClient {
    pub async fn connect(addr: &SocketAddr) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        let (ws_tx, ws_rx) = ws.split();
        let mut client = Self {
            ws_tx,
            ws_rx,
            history: Vec::new(),
            disabled: false,
        };

        let snapshot = client.recv().await;
        assert_eq!(snapshot["type"], "history_snapshot");
        client.history = snapshot["events"].as_array().cloned().unwrap_or_default();
        let state = client.recv().await;
        assert_eq!(state["type"], "disable_state");
        client.disabled = state["active"].as_bool().unwrap();
        client
    }

    /// Connect and register, waiting for our own join announcement.
    pub async fn join(addr: &SocketAddr, name: &str) -> (Self, String) {
        let mut client = Self::connect(addr).await;
        client
            .send(json!({"type": "register_identity", "name": name, "color": "#123456", "avatar": "X"}))
            .await;
        let joined = client
            .recv_until(|m| {
                m["type"] == "chat_event"
                    && m["event"]["text"].as_str().is_some_and(|t| t.ends_with(" has joined the chat."))
            })
            .await;
        let text = joined["event"]["text"].as_str().unwrap();
        let assigned = text.trim_end_matches(" has joined the chat.").to_string();
        (client, assigned)
    }

    /// Connect as the reserved identity.
    pub async fn join_reserved(addr: &SocketAddr) -> Self {
        let mut client = Self::connect(addr).await;
        client
            .send(json!({"type": "register_identity", "name": "Admin", "color": "#000000", "avatar": "A"}))
            .await;
        client.recv_system("🔑 Enter the password for Admin.").await;
        client.chat(PASSWORD).await;
        client.recv_system("Admin has joined the chat.").await;
        client
    }

    pub async fn send(&mut self, value: Value) {
        self.ws_tx
            .send(Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn chat(&mut self, text: &str) {
        self.send(json!({"type": "chat_message", "text": text})).await;
    }

    pub async fn recv(&mut self) -> Value {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, self.ws_rx.next())
                .await
                .expect("timed out waiting for a message")
                .expect("connection closed")
                .unwrap();
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Skip messages until one matches.
    pub async fn recv_until(&mut self, pred: impl Fn(&Value) -> bool) -> Value {
        loop {
            let msg = self.recv().await;
            if pred(&msg) {
                return msg;
            }
        }
    }

    /// Wait for a server-authored chat event with exactly this text.
    pub async fn recv_system(&mut self, text: &str) -> Value {
        self.recv_until(|m| {
            m["type"] == "chat_event" && m["event"]["author"] == "Server" && m["event"]["text"] == text
        })
        .await
    }

    /// Assert nothing arrives for a short while.
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Ok(Some(Ok(Message::Text(text)))) = tokio::time::timeout(wait, self.ws_rx.next()).await {
            panic!("unexpected message: {text}");
        }
    }
}
