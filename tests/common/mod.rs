//! Shared helpers for integration tests: a local tag server and polling.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tagengine::SessionConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;

static INIT: Once = Once::new();

/// Route `log` output through the test harness once per binary.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Session timings short enough for tests.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        heartbeat_interval: Duration::from_millis(50),
        pong_timeout: Duration::from_millis(200),
        reconnect_delay: Duration::from_millis(20),
        max_retries: 3,
        probe_timeout: Duration::from_secs(2),
    }
}

/// How the test server treats incoming connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Complete the handshake, record text frames, answer pings, relay pushes.
    Normal,
    /// Complete the handshake, then never read again (no pongs).
    Silent,
    /// Accept TCP and drop it before the handshake.
    DropTcp,
}

#[derive(Debug, Clone)]
enum ServerCommand {
    Push(String),
    Ping,
    Close,
}

/// Local WebSocket server standing in for the tag server.
pub struct TestServer {
    url: String,
    accepts: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    pongs: Arc<AtomicUsize>,
    received: mpsc::UnboundedReceiver<String>,
    commands: broadcast::Sender<ServerCommand>,
}

impl TestServer {
    pub async fn spawn(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/", listener.local_addr().unwrap());
        let accepts = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let pongs = Arc::new(AtomicUsize::new(0));
        let (received_tx, received) = mpsc::unbounded_channel();
        let (commands, _) = broadcast::channel(64);

        tokio::spawn({
            let accepts = Arc::clone(&accepts);
            let closed = Arc::clone(&closed);
            let pongs = Arc::clone(&pongs);
            let commands = commands.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepts.fetch_add(1, Ordering::SeqCst);
                    match mode {
                        Mode::DropTcp => drop(stream),
                        Mode::Silent => {
                            tokio::spawn(hold_silently(stream));
                        }
                        Mode::Normal => {
                            tokio::spawn(serve(
                                stream,
                                received_tx.clone(),
                                commands.subscribe(),
                                Counters {
                                    closed: Arc::clone(&closed),
                                    pongs: Arc::clone(&pongs),
                                },
                            ));
                        }
                    }
                }
            }
        });

        Self {
            url,
            accepts,
            closed,
            pongs,
            received,
            commands,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// TCP connections accepted so far.
    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    /// Normal-mode connections that have ended.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Pongs received in answer to [`TestServer::ping`].
    pub fn pongs(&self) -> usize {
        self.pongs.load(Ordering::SeqCst)
    }

    /// Ping every live connection.
    pub fn ping(&self) {
        let _ = self.commands.send(ServerCommand::Ping);
    }

    /// Send a text frame to every live connection.
    pub fn push(&self, text: &str) {
        let _ = self.commands.send(ServerCommand::Push(text.to_string()));
    }

    /// Push a `tag-values` frame with one entry.
    pub fn push_tag(&self, path: &str, name: &str, value: serde_json::Value) {
        let frame = serde_json::json!({
            "event": "tag-values",
            "data": [{"path": path, "name": name, "value": value}],
        });
        self.push(&frame.to_string());
    }

    /// Close every live connection with a close frame.
    pub fn close_all(&self) {
        let _ = self.commands.send(ServerCommand::Close);
    }

    /// Next text frame the connector sent, as JSON.
    pub async fn next_frame(&mut self) -> serde_json::Value {
        let text = tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("frame received in time")
            .expect("server alive");
        serde_json::from_str(&text).expect("connector sends JSON")
    }
}

struct Counters {
    closed: Arc<AtomicUsize>,
    pongs: Arc<AtomicUsize>,
}

enum ConnEvent {
    Incoming(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    Command(Result<ServerCommand, broadcast::error::RecvError>),
}

async fn serve(
    stream: TcpStream,
    received: mpsc::UnboundedSender<String>,
    mut commands: broadcast::Receiver<ServerCommand>,
    counters: Counters,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    loop {
        let event = tokio::select! {
            msg = ws.next() => ConnEvent::Incoming(msg),
            cmd = commands.recv() => ConnEvent::Command(cmd),
        };

        match event {
            ConnEvent::Incoming(Some(Ok(Message::Text(text)))) => {
                let _ = received.send(text.to_string());
            }
            ConnEvent::Incoming(Some(Ok(Message::Close(_)) | Err(_)) | None) => break,
            ConnEvent::Incoming(Some(Ok(Message::Pong(_)))) => {
                counters.pongs.fetch_add(1, Ordering::SeqCst);
            }
            // Pings are answered by tungstenite on the next read.
            ConnEvent::Incoming(Some(Ok(_))) => {}
            ConnEvent::Command(Ok(ServerCommand::Push(text))) => {
                if ws.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            ConnEvent::Command(Ok(ServerCommand::Ping)) => {
                if ws.send(Message::Ping(b"server".to_vec())).await.is_err() {
                    break;
                }
            }
            ConnEvent::Command(Ok(ServerCommand::Close)) => {
                let _ = ws.close(None).await;
                break;
            }
            ConnEvent::Command(Err(broadcast::error::RecvError::Lagged(_))) => {}
            ConnEvent::Command(Err(broadcast::error::RecvError::Closed)) => break,
        }
    }

    counters.closed.fetch_add(1, Ordering::SeqCst);
}

async fn hold_silently(stream: TcpStream) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    tokio::time::sleep(Duration::from_secs(30)).await;
    drop(ws);
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
