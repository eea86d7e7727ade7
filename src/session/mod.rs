//! Upstream session: one WebSocket connection and its lifecycle.
//!
//! Each [`Session`] owns a background task that runs the connection state
//! machine for a single URL:
//!
//! ```text
//!              connect ok                 close / error / pong overdue
//!  Connecting ───────────► Open ───────────────────────────────┐
//!      ▲   │                 │ ping every interval,            │
//!      │   │ connect failed  │ pong deadline armed             ▼
//!      │   └──────────────────────────────────────────────► Closed
//!      │                                                       │
//!      │        delay elapsed                  budget left     │
//!      └───────────────────── Reconnecting ◄───────────────────┤
//!                                                              │ budget spent
//!                                   Reconnect command          ▼
//!  Connecting ◄──────────────────────────────────────── Disconnected
//! ```
//!
//! The task owns the transport halves, the heartbeat interval, the pong
//! deadline and the retry budget. Shutting the task down (or dropping the
//! [`Session`], which closes its command channel) cancels all of them, so a
//! superseded session can never act on its successor's connection.
//!
//! Inbound `tag-values` pushes are written to the shared [`TagCache`] in
//! receipt order. Everything else the server sends is ignored.

// Rust guideline compliant 2026-02

mod heartbeat;
mod retry;

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::cache::TagCache;
use crate::config::SessionConfig;
use crate::protocol::ServerFrame;
use crate::ws::{self, WsMessage, WsReader, WsWriter};

use heartbeat::{Heartbeat, HeartbeatTick};
use retry::RetryBudget;

/// Longest slice of an inbound frame quoted in log lines.
const LOG_PREVIEW_LEN: usize = 120;

/// Observable connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake in progress.
    Connecting,
    /// Transport open; frames flow and the heartbeat runs.
    Open,
    /// Waiting out the reconnect delay before attempt `attempt`.
    Reconnecting {
        /// 1-based attempt number since the last successful open.
        attempt: u32,
    },
    /// Retry budget spent, or the session was shut down.
    Disconnected,
}

/// Message from a [`Session`] handle to its task.
#[derive(Debug)]
enum SessionCommand {
    /// Send a text frame if the transport is open.
    Send(String),
    /// Leave `Disconnected` with a fresh retry budget.
    Reconnect,
    /// Close the transport and stop.
    Shutdown,
}

/// Handle to a running session task.
#[derive(Debug)]
pub struct Session {
    url: String,
    generation: u64,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    state_rx: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl Session {
    /// Spawn the session task for `url`.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(url: &str, generation: u64, config: &SessionConfig, cache: TagCache) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        let task = SessionTask {
            url: url.to_string(),
            generation,
            heartbeat_interval: config.heartbeat_interval,
            pong_timeout: config.pong_timeout,
            reconnect_delay: config.reconnect_delay,
            budget: RetryBudget::new(config.max_retries),
            cache,
            commands: command_rx,
            state_tx,
        };

        Self {
            url: url.to_string(),
            generation,
            command_tx,
            state_rx,
            task: tokio::spawn(task.run()),
        }
    }

    /// URL this session is bound to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Monotonic id distinguishing this session from the ones it replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Whether the task has exited (shut down, or its runtime went away).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Queue a text frame. Frames that reach the task while it is not open
    /// are dropped.
    ///
    /// Returns `false` if the task is gone.
    pub(crate) fn send(&self, text: String) -> bool {
        self.command_tx.send(SessionCommand::Send(text)).is_ok()
    }

    /// Ask a `Disconnected` session to start over with a fresh retry budget.
    ///
    /// Returns `false` if the task is gone.
    pub(crate) fn reconnect(&self) -> bool {
        self.command_tx.send(SessionCommand::Reconnect).is_ok()
    }

    /// Ask the task to close its transport and exit.
    pub(crate) fn shutdown(&self) {
        let _ = self.command_tx.send(SessionCommand::Shutdown);
    }
}

/// Result of the control-only wait used outside the open state.
enum Control {
    Reconnect,
    Shutdown,
}

/// How the open state ended.
enum OpenExit {
    /// Abnormal or remote close; feeds the reconnect path.
    Closed,
    /// Local shutdown requested.
    Shutdown,
}

/// One wake-up of the open-state loop.
enum OpenEvent {
    Frame(Option<anyhow::Result<WsMessage>>),
    Command(Option<SessionCommand>),
    HeartbeatTick,
    PongOverdue,
}

/// State owned by the background task.
struct SessionTask {
    url: String,
    generation: u64,
    heartbeat_interval: Duration,
    pong_timeout: Duration,
    reconnect_delay: Duration,
    budget: RetryBudget,
    cache: TagCache,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionTask {
    async fn run(mut self) {
        loop {
            self.set_state(SessionState::Connecting);
            log::info!("[Session #{}] Connecting to {}", self.generation, self.url);

            let connected = {
                let url = self.url.clone();
                tokio::select! {
                    result = ws::connect(&url) => Some(result),
                    () = wait_for_shutdown(&mut self.commands, self.generation) => None,
                }
            };
            let Some(connected) = connected else {
                break;
            };

            match connected {
                Ok((writer, reader)) => {
                    log::info!("[Session #{}] WebSocket is connected", self.generation);
                    self.budget.reset();
                    self.set_state(SessionState::Open);
                    if let OpenExit::Shutdown = self.run_open(writer, reader).await {
                        break;
                    }
                    log::info!("[Session #{}] WebSocket is closed", self.generation);
                }
                Err(e) => {
                    log::warn!("[Session #{}] Connection failed: {:#}", self.generation, e);
                }
            }

            if let Control::Shutdown = self.after_close().await {
                break;
            }
        }

        self.set_state(SessionState::Disconnected);
        log::info!("[Session #{}] Stopped", self.generation);
    }

    /// Closed state: wait out the reconnect delay, or park as `Disconnected`
    /// once the budget is spent. Returns when the next connect should start.
    async fn after_close(&mut self) -> Control {
        let Some(attempt) = self.budget.try_acquire() else {
            log::error!(
                "[Session #{}] Max retries ({}) reached. Unable to reconnect to {}",
                self.generation,
                self.budget.max(),
                self.url
            );
            self.set_state(SessionState::Disconnected);

            let control = next_control(&mut self.commands, self.generation).await;
            if let Control::Reconnect = control {
                log::info!("[Session #{}] Reconnect requested, retry budget reset", self.generation);
                self.budget.reset();
            }
            return control;
        };

        log::info!(
            "[Session #{}] Reconnecting in {}ms (attempt {}/{})",
            self.generation,
            self.reconnect_delay.as_millis(),
            attempt,
            self.budget.max()
        );
        self.set_state(SessionState::Reconnecting { attempt });

        tokio::select! {
            () = tokio::time::sleep(self.reconnect_delay) => Control::Reconnect,
            control = next_control(&mut self.commands, self.generation) => control,
        }
    }

    /// Open state: route frames, run the heartbeat, forward outbound frames.
    async fn run_open(&mut self, mut writer: WsWriter, mut reader: WsReader) -> OpenExit {
        let mut heartbeat = Heartbeat::new(self.pong_timeout);
        // tokio intervals reject a zero period.
        let period = self.heartbeat_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                frame = reader.recv() => OpenEvent::Frame(frame),
                command = self.commands.recv() => OpenEvent::Command(command),
                _ = ticker.tick() => OpenEvent::HeartbeatTick,
                () = sleep_until(heartbeat.deadline()) => OpenEvent::PongOverdue,
            };

            match event {
                OpenEvent::Frame(Some(Ok(WsMessage::Text(text)))) => self.handle_text(&text),
                // tungstenite queues the pong itself and flushes it on the next read.
                OpenEvent::Frame(Some(Ok(WsMessage::Ping(_)))) => {
                    log::trace!("[Session #{}] Ping received", self.generation);
                }
                OpenEvent::Frame(Some(Ok(WsMessage::Pong(_)))) => {
                    log::trace!("[Session #{}] Pong received", self.generation);
                    heartbeat.on_pong();
                }
                OpenEvent::Frame(Some(Ok(WsMessage::Binary(data)))) => {
                    log::trace!(
                        "[Session #{}] Ignoring {}-byte binary frame",
                        self.generation,
                        data.len()
                    );
                }
                OpenEvent::Frame(Some(Ok(WsMessage::Close { code, reason }))) => {
                    log::info!(
                        "[Session #{}] Connection closed by server (code={}, reason={:?})",
                        self.generation,
                        code,
                        reason
                    );
                    return OpenExit::Closed;
                }
                OpenEvent::Frame(Some(Err(e))) => {
                    return self.close_on_error(&mut writer, &e).await;
                }
                OpenEvent::Frame(None) => {
                    log::info!("[Session #{}] WebSocket stream ended", self.generation);
                    return OpenExit::Closed;
                }
                OpenEvent::Command(Some(SessionCommand::Send(text))) => {
                    let sent = bounded_write(self.pong_timeout, writer.send_text(&text)).await;
                    if let Err(e) = sent {
                        return self.close_on_error(&mut writer, &e).await;
                    }
                    log::debug!("[Session #{}] Sent {}", self.generation, preview(&text));
                }
                OpenEvent::Command(Some(SessionCommand::Reconnect)) => {}
                OpenEvent::Command(Some(SessionCommand::Shutdown) | None) => {
                    log::info!("[Session #{}] Shutdown requested, closing connection", self.generation);
                    let _ = bounded_write(self.pong_timeout, writer.close()).await;
                    return OpenExit::Shutdown;
                }
                OpenEvent::HeartbeatTick => {
                    if heartbeat.on_tick(Instant::now()) == HeartbeatTick::SendPing {
                        let sent = bounded_write(self.pong_timeout, writer.send_ping()).await;
                        if let Err(e) = sent {
                            return self.close_on_error(&mut writer, &e).await;
                        }
                        log::trace!("[Session #{}] Ping sent", self.generation);
                    }
                }
                OpenEvent::PongOverdue => {
                    if heartbeat.is_expired(Instant::now()) {
                        log::warn!(
                            "[Session #{}] No pong within {}ms, terminating connection",
                            self.generation,
                            self.pong_timeout.as_millis()
                        );
                        // Dropping both halves tears the socket down without a
                        // closing handshake the dead peer would never answer.
                        drop(writer);
                        drop(reader);
                        return OpenExit::Closed;
                    }
                }
            }
        }
    }

    /// Error state: log, close the transport if still possible, then report
    /// an abnormal close.
    async fn close_on_error(&self, writer: &mut WsWriter, err: &anyhow::Error) -> OpenExit {
        log::warn!("[Session #{}] WebSocket error: {:#}", self.generation, err);
        let _ = bounded_write(self.pong_timeout, writer.close()).await;
        OpenExit::Closed
    }

    fn handle_text(&self, text: &str) {
        match ServerFrame::parse(text) {
            Ok(ServerFrame::TagValues(updates)) => {
                log::debug!(
                    "[Session #{}] Received {} tag value(s)",
                    self.generation,
                    updates.len()
                );
                self.cache.upsert_all(updates);
            }
            Ok(ServerFrame::Other(event)) => {
                log::trace!("[Session #{}] Ignoring event {:?}", self.generation, event);
            }
            Err(e) => {
                log::warn!(
                    "[Session #{}] Failed to parse message: {} ({})",
                    self.generation,
                    e,
                    preview(text)
                );
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            log::debug!("[Session #{}] {:?} -> {:?}", self.generation, current, state);
            *current = state;
            true
        });
    }
}

/// Wait for the next control command, dropping frames queued while not open.
async fn next_control(
    commands: &mut mpsc::UnboundedReceiver<SessionCommand>,
    generation: u64,
) -> Control {
    loop {
        match commands.recv().await {
            Some(SessionCommand::Send(text)) => {
                log::debug!(
                    "[Session #{}] Dropping frame, not connected: {}",
                    generation,
                    preview(&text)
                );
            }
            Some(SessionCommand::Reconnect) => return Control::Reconnect,
            Some(SessionCommand::Shutdown) | None => return Control::Shutdown,
        }
    }
}

/// Like [`next_control`], but a reconnect request is moot while connecting.
async fn wait_for_shutdown(commands: &mut mpsc::UnboundedReceiver<SessionCommand>, generation: u64) {
    while let Control::Reconnect = next_control(commands, generation).await {}
}

/// Run a socket write, failing it once `limit` passes.
///
/// A peer that stops reading fills the TCP window and would otherwise park
/// the open-state loop where the pong deadline cannot fire.
async fn bounded_write(
    limit: Duration,
    write: impl Future<Output = anyhow::Result<()>>,
) -> anyhow::Result<()> {
    tokio::time::timeout(limit, write).await.map_err(|elapsed| {
        anyhow::Error::new(elapsed).context(format!("Write stalled for {}ms", limit.as_millis()))
    })?
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn preview(text: &str) -> &str {
    text.get(..LOG_PREVIEW_LEN).unwrap_or(text)
}
