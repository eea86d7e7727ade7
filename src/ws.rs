//! WebSocket transport to the tag server.
//!
//! Wraps `tokio-tungstenite` in a writer half and a reader half so the rest
//! of the crate never names tungstenite types. The session task and the
//! connection probe both go through [`connect`].
//!
//! The returned ([`WsWriter`], [`WsReader`]) pair is meant to be driven from
//! a `tokio::select!` loop: the reader surfaces pongs so the caller can run
//! its own heartbeat, and dropping both halves terminates the TCP stream
//! without a closing handshake.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

/// Client stream, plain or TLS depending on the URL scheme.
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Inbound frame, with tungstenite's raw `Frame` variant filtered out.
#[derive(Debug)]
pub enum WsMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Server ping; tungstenite queues the matching pong itself.
    Ping(Vec<u8>),
    /// Answer to one of our heartbeat pings.
    Pong(Vec<u8>),
    /// Server-initiated close.
    Close {
        /// Close code; 1005 when the frame carried none.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// Outbound half: JSON text frames plus heartbeat control frames.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send one JSON text frame.
    ///
    /// # Errors
    ///
    /// Fails once the connection is closed or the socket write errors.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .context("Failed to send text frame")
    }

    /// Send an empty ping frame for the heartbeat.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn send_ping(&mut self) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Ping(Vec::new()))
            .await
            .context("Failed to send ping")
    }

    /// Start the closing handshake and flush it.
    ///
    /// # Errors
    ///
    /// Fails if the peer is already gone; callers usually ignore this.
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await.context("Failed to close connection")
    }
}

/// Inbound half, polled from the session's `select!` loop.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Next inbound frame, or `None` once the stream has ended.
    ///
    /// Read errors keep the tungstenite error as their source.
    pub async fn recv(&mut self) -> Option<Result<WsMessage>> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Some(Ok(WsMessage::Text(text.to_string())));
                }
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    return Some(Ok(WsMessage::Binary(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Ping(data))) => {
                    return Some(Ok(WsMessage::Ping(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Pong(data))) => {
                    return Some(Ok(WsMessage::Pong(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Close(close_frame))) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(WsMessage::Close { code, reason }));
                }
                Some(Ok(tungstenite::Message::Frame(_))) => {}
                Some(Err(e)) => {
                    return Some(Err(anyhow::Error::new(e).context("Failed to read frame")));
                }
                None => return None,
            }
        }
    }
}

/// Connect to a WebSocket URL.
///
/// Performs the handshake and returns split (writer, reader) halves for
/// independent use in `tokio::select!` loops. Any credentials must already
/// be encoded in `url`.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the WebSocket handshake fails.
/// The underlying [`tungstenite::Error`] stays reachable through
/// `downcast_ref` so callers can tell a refused handshake from a dropped one.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    use tungstenite::client::IntoClientRequest;

    let request = url
        .into_client_request()
        .with_context(|| format!("invalid WebSocket URL: {url}"))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .context("WebSocket connect failed")?;

    let (sink, stream) = ws_stream.split();

    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Whether a connect error means the peer dropped the stream mid-handshake.
///
/// Distinguishes "closed before open" from other failures (refused, DNS,
/// TLS, HTTP rejection).
pub fn is_closed_before_open(err: &anyhow::Error) -> bool {
    use std::io::ErrorKind;

    match err.downcast_ref::<tungstenite::Error>() {
        Some(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => true,
        Some(tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::HandshakeIncomplete,
        )) => true,
        Some(tungstenite::Error::Io(io)) => matches!(
            io.kind(),
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
        ),
        _ => false,
    }
}
