#![allow(dead_code)]

//! In-process mock of the SG timer server: the HTTP endpoints the console
//! consumes plus a `/ws` hub that broadcasts whatever a test pushes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// Mutable server-side fixture state.
#[derive(Debug, Default)]
pub struct MockState {
    pub connected: bool,
    pub devices: Vec<Value>,
    pub title: String,
    pub sessions: Vec<Value>,
    pub downloads: HashMap<u64, String>,
}

type Shared = (Arc<Mutex<MockState>>, broadcast::Sender<String>);

/// Handle to a spawned mock server.
pub struct MockTimer {
    pub addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
    events: broadcast::Sender<String>,
}

impl MockTimer {
    pub async fn spawn() -> Self {
        let state = Arc::new(Mutex::new(MockState {
            title: "SG Timer".into(),
            ..Default::default()
        }));
        let (events, _) = broadcast::channel(256);

        let shared: Shared = (state.clone(), events.clone());
        let app = Router::new()
            .route("/devices", get(devices))
            .route("/status", get(status))
            .route("/connect", post(connect))
            .route("/disconnect", post(disconnect))
            .route("/sessions", get(sessions))
            .route("/download/{sess_id}", get(download))
            .route("/get_title", get(get_title))
            .route("/set_title", post(set_title))
            .route("/clear_sessions", post(clear_sessions))
            .route("/ws", get(ws_upgrade))
            .with_state(shared);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            events,
        }
    }

    /// `host:port` form accepted by `ServerClient::new`.
    pub fn server_addr(&self) -> String {
        format!("127.0.0.1:{}", self.addr.port())
    }

    /// Broadcast one event frame to every connected WebSocket client.
    pub fn push(&self, event: Value) {
        let _ = self.events.send(event.to_string());
    }

    /// Broadcast a raw (possibly malformed) text frame.
    pub fn push_raw(&self, frame: &str) {
        let _ = self.events.send(frame.to_string());
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    pub fn set_devices(&self, devices: Vec<Value>) {
        self.state.lock().devices = devices;
    }

    /// Wait until at least one WebSocket client is subscribed to the hub, so
    /// a test's pushes cannot race the client's connect.
    pub async fn wait_for_client(&self) {
        for _ in 0..100 {
            if self.events.receiver_count() > 0 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("no websocket client connected within 2s");
    }

    pub fn set_sessions(&self, sessions: Vec<Value>) {
        self.state.lock().sessions = sessions;
    }

    pub fn set_download(&self, sess_id: u64, text: &str) {
        self.state.lock().downloads.insert(sess_id, text.into());
    }

    pub fn set_title(&self, title: &str) {
        self.state.lock().title = title.into();
    }

    pub fn title(&self) -> String {
        self.state.lock().title.clone()
    }
}

/// `count` session summaries with ids `base`, `base+1`, ...
pub fn summaries(base: u64, count: usize) -> Vec<Value> {
    (0..count as u64)
        .map(|i| {
            json!({
                "sess_id": base + i,
                "total_shots": 5,
                "total_time": 11.2,
                "best_split": 0.9,
                "duration": 9.2,
            })
        })
        .collect()
}

async fn devices(State((state, _)): State<Shared>) -> Json<Value> {
    Json(json!({ "devices": state.lock().devices }))
}

async fn status(State((state, _)): State<Shared>) -> Json<Value> {
    let state = state.lock();
    Json(json!({ "connected": state.connected, "devices": state.devices }))
}

async fn connect(State((state, _)): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    state.lock().connected = true;
    Json(json!({
        "status": "connected",
        "address": body["address"],
        "name": body.get("name").cloned().unwrap_or(body["address"].clone()),
        "model": "SG Timer Sport",
        "api_version": "1.2",
    }))
}

async fn disconnect(State((state, _)): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    state.lock().connected = false;
    Json(json!({ "status": "disconnected", "address": body["address"] }))
}

async fn sessions(
    State((state, _)): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let offset: usize = params
        .get("offset")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let limit: usize = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);
    let all = &state.lock().sessions;
    let page: Vec<Value> = all.iter().skip(offset).take(limit).cloned().collect();
    Json(json!({ "sessions": page, "offset": offset, "limit": limit }))
}

async fn download(
    State((state, _)): State<Shared>,
    Path(sess_id): Path<u64>,
) -> Result<String, StatusCode> {
    state
        .lock()
        .downloads
        .get(&sess_id)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_title(State((state, _)): State<Shared>) -> Json<Value> {
    Json(json!({ "title": state.lock().title }))
}

async fn set_title(
    State((state, events)): State<Shared>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let title = body["title"].as_str().unwrap_or("").trim().to_string();
    if title.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    state.lock().title = title.clone();
    let _ = events.send(json!({ "type": "TITLE_UPDATE", "title": title }).to_string());
    Ok(Json(json!({ "status": "ok", "title": title })))
}

async fn clear_sessions(State((state, _)): State<Shared>) -> Json<Value> {
    let mut state = state.lock();
    let archived = state.sessions.len();
    state.sessions.clear();
    Json(json!({
        "status": "ok",
        "archived": archived,
        "archive_dir": "data/archive/2026-08-07_12-00",
    }))
}

async fn ws_upgrade(
    State((_, events)): State<Shared>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let rx = events.subscribe();
    ws.on_upgrade(move |socket| handle_ws(socket, rx))
}

async fn handle_ws(mut socket: WebSocket, mut rx: broadcast::Receiver<String>) {
    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Ok(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}
