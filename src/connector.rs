//! Connector context: the tag cache plus the one upstream session.
//!
//! [`TagEngine`] replaces process-wide connection state with an explicit
//! object that callers (the query service, the CLI, tests) share through an
//! `Arc`. It holds at most one [`Session`] at a time, keyed by URL:
//!
//! - same URL, session alive: nothing to do
//! - same URL, session parked after spending its retry budget: reconnect
//!   with a fresh budget
//! - different URL: shut the old session down and spawn a new generation
//!
//! Outbound frames only leave while the session is open; the caller learns
//! synchronously whether a frame was handed to an open session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::watch;

use crate::cache::TagCache;
use crate::config::SessionConfig;
use crate::protocol::{ClientFrame, TagValue, TagWrite};
use crate::session::{Session, SessionState};

/// Owner of the tag cache and the current upstream session.
#[derive(Debug)]
pub struct TagEngine {
    config: SessionConfig,
    cache: TagCache,
    session: Mutex<Option<Session>>,
    generations: AtomicU64,
}

impl TagEngine {
    /// Create a connector with no session yet.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            cache: TagCache::new(),
            session: Mutex::new(None),
            generations: AtomicU64::new(0),
        }
    }

    /// Configuration applied to every session.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Shared tag cache.
    pub fn cache(&self) -> &TagCache {
        &self.cache
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make sure a session for `url` is open or on its way.
    ///
    /// Never blocks on the network. Must be called from within a tokio
    /// runtime.
    pub fn ensure_connected(&self, url: &str) {
        let mut current = self.session();

        if let Some(session) = current.as_ref() {
            if session.url() == url && !session.is_finished() {
                match session.state() {
                    SessionState::Disconnected => {
                        log::info!(
                            "[Connector] Session #{} for {} is disconnected, reconnecting",
                            session.generation(),
                            url
                        );
                        if session.reconnect() {
                            return;
                        }
                    }
                    SessionState::Connecting
                    | SessionState::Open
                    | SessionState::Reconnecting { .. } => return,
                }
            }
        }

        if let Some(old) = current.take() {
            if old.url() == url {
                log::debug!("[Connector] Replacing stopped session #{}", old.generation());
            } else {
                log::info!(
                    "[Connector] Switching upstream from {} to {}",
                    old.url(),
                    url
                );
            }
            old.shutdown();
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        *current = Some(Session::spawn(url, generation, &self.config, self.cache.clone()));
    }

    /// State of the current session, if any.
    pub fn state(&self) -> Option<SessionState> {
        self.session().as_ref().map(Session::state)
    }

    /// URL of the current session, if any.
    pub fn url(&self) -> Option<String> {
        self.session().as_ref().map(|s| s.url().to_string())
    }

    /// Generation number of the current session, if any.
    pub fn generation(&self) -> Option<u64> {
        self.session().as_ref().map(Session::generation)
    }

    /// Observe state changes of the current session.
    ///
    /// The receiver stays bound to that session even if it is later replaced.
    pub fn watch_state(&self) -> Option<watch::Receiver<SessionState>> {
        self.session().as_ref().map(Session::watch_state)
    }

    /// Wait until the current session is open, up to `timeout`.
    ///
    /// Returns `false` on timeout, or when there is no session.
    pub async fn wait_until_open(&self, timeout: Duration) -> bool {
        let Some(mut rx) = self.watch_state() else {
            return false;
        };
        // The borrowed `Ref` must drop before `rx` does.
        let opened = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|s| *s == SessionState::Open)).await,
            Ok(Ok(_))
        );
        opened
    }

    /// Hand a frame to the session if it is open.
    fn send_if_open(&self, frame: &ClientFrame) -> Result<bool> {
        let text = frame.to_text()?;
        let current = self.session();
        let Some(session) = current.as_ref() else {
            return Ok(false);
        };
        if session.state() != SessionState::Open {
            return Ok(false);
        }
        Ok(session.send(text))
    }

    /// Ask the server to push values for `tag_ids`.
    ///
    /// Silently does nothing unless the session is open. Returns whether the
    /// frame was sent.
    pub fn subscribe(&self, tag_ids: Vec<String>) -> Result<bool> {
        let sent = self.send_if_open(&ClientFrame::Sub { tag_ids })?;
        if !sent {
            log::debug!("[Connector] Subscribe skipped, WebSocket is not connected");
        }
        Ok(sent)
    }

    /// Write one tag value upstream.
    ///
    /// # Errors
    ///
    /// Fails when the session is not open. The result of the write arrives
    /// later, if at all, as an ordinary tag-value push.
    pub fn set_value(&self, key: &str, value: TagValue) -> Result<()> {
        let frame = ClientFrame::Set {
            tags: vec![TagWrite {
                key: key.to_string(),
                value,
            }],
        };
        if !self.send_if_open(&frame)? {
            bail!("WebSocket is not connected");
        }
        Ok(())
    }

    /// Shut the current session down and forget it.
    pub fn shutdown(&self) {
        if let Some(session) = self.session().take() {
            log::info!("[Connector] Shutting down session #{}", session.generation());
            session.shutdown();
        }
    }
}

impl Default for TagEngine {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Drop for TagEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
