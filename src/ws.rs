//! Persistent consumer of the timer server's `/ws` event feed.
//!
//! Spawns a tokio task that connects to the server's WebSocket endpoint,
//! forwards each parsed [`ServerEvent`] over an mpsc channel, and on
//! disconnect retries with exponential backoff (1s doubling to 60s),
//! resetting after a successful connect. The consumer never originates
//! frames beyond pong/close.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;

use crate::protocol::ServerEvent;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Handle to the background event-stream task.
pub struct EventStream {
    shutdown_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl EventStream {
    /// Spawn the persistent consumer for `ws_url`, delivering events into
    /// `events_tx`. The task also ends on its own when every receiver of the
    /// channel is gone.
    pub fn spawn(ws_url: String, events_tx: mpsc::Sender<ServerEvent>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(stream_loop(ws_url, events_tx, shutdown_rx));
        Self { shutdown_tx, task }
    }

    /// Signal the consumer task to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for the consumer task to complete. Consumes the handle.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

async fn stream_loop(
    ws_url: String,
    events_tx: mpsc::Sender<ServerEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = Duration::from_secs(1);
    let max_backoff = Duration::from_secs(60);

    loop {
        if *shutdown_rx.borrow() || events_tx.is_closed() {
            return;
        }

        match tokio_tungstenite::connect_async(ws_url.as_str()).await {
            Ok((ws_stream, _)) => {
                backoff = Duration::from_secs(1);
                tracing::info!(server = %ws_url, "event stream connected");

                run_stream(ws_stream, &events_tx, &mut shutdown_rx).await;

                if *shutdown_rx.borrow() || events_tx.is_closed() {
                    return;
                }
                tracing::warn!(server = %ws_url, "event stream disconnected");
            }
            Err(e) => {
                tracing::debug!(server = %ws_url, error = %e, "connection failed");
            }
        }

        // Wait before retry with exponential backoff.
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown_rx.changed() => { return; }
        }
        backoff = (backoff * 2).min(max_backoff);
    }
}

async fn run_stream(
    ws_stream: WsStream,
    events_tx: &mpsc::Sender<ServerEvent>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let (mut sink, mut stream) = ws_stream.split();
    let mut ping_interval = tokio::time::interval(Duration::from_secs(30));
    ping_interval.tick().await; // Skip the first immediate tick.

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Some(event) = ServerEvent::parse(text.as_str()) else {
                            continue;
                        };
                        if events_tx.send(event).await.is_err() {
                            // Consumer is gone; nothing left to do.
                            return;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Binary frames are not part of the protocol.
                    Some(Err(_)) => break,
                }
            }
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            _ = events_tx.closed() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            _ = shutdown_rx.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}
