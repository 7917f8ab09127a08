//! Mock KIS WebSocket server for integration tests.
//!
//! Provides a WebSocket server that can:
//! - Accept connections and count them
//! - Record subscribe frames and acknowledge them the way KIS does
//! - Push data frames to every connected client
//! - Drop every connection to force a reconnect

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Debug, Clone)]
enum Command {
    Push(String),
    Drop,
}

/// A recorded subscribe frame.
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub tr_id: String,
    pub tr_key: String,
    pub authorization: String,
}

/// A mock KIS WebSocket server.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    commands: broadcast::Sender<Command>,
    frames: Arc<Mutex<Vec<ReceivedFrame>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockWsServer {
    /// Start a new mock server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let frames: Arc<Mutex<Vec<ReceivedFrame>>> = Arc::new(Mutex::new(Vec::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (commands, _) = broadcast::channel::<Command>(64);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let frames_clone = frames.clone();
        let connections_clone = connections.clone();
        let commands_clone = commands.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            frames_clone.clone(),
                            connections_clone.clone(),
                            commands_clone.subscribe(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            commands,
            frames,
            connections,
        }
    }

    /// The server's WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of completed handshakes.
    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// Subscribe frames received so far, across all connections.
    pub async fn received_frames(&self) -> Vec<ReceivedFrame> {
        self.frames.lock().await.clone()
    }

    /// Send a text frame to every connected client.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.commands.send(Command::Push(frame.into()));
    }

    /// Close every open connection.
    pub fn drop_connections(&self) {
        let _ = self.commands.send(Command::Drop);
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    frames: Arc<Mutex<Vec<ReceivedFrame>>>,
    connections: Arc<Mutex<u32>>,
    mut commands: broadcast::Receiver<Command>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    {
        let mut count = connections.lock().await;
        *count += 1;
    }

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(parsed) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        let field = |pointer: &str| {
                            parsed.pointer(pointer).and_then(Value::as_str).unwrap_or("").to_string()
                        };
                        let frame = ReceivedFrame {
                            tr_id: field("/body/input/tr_id"),
                            tr_key: field("/body/input/tr_key"),
                            authorization: field("/header/authorization"),
                        };

                        let ack = json!({
                            "header": {"tr_id": frame.tr_id, "tr_key": frame.tr_key, "encrypt": "N"},
                            "body": {"rt_cd": "0", "msg_cd": "OPSP0000", "msg1": "SUBSCRIBE SUCCESS"}
                        });
                        frames.lock().await.push(frame);
                        let _ = write.send(Message::Text(ack.to_string())).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            command = commands.recv() => {
                match command {
                    Ok(Command::Push(frame)) => {
                        let _ = write.send(Message::Text(frame)).await;
                    }
                    Ok(Command::Drop) | Err(broadcast::error::RecvError::Closed) => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
