//! One-shot connection test.
//!
//! Opens a throwaway WebSocket to a candidate URL and reports whether the
//! handshake completed. Unlike the long-lived session there is no retry, no
//! heartbeat and no cache involvement, and the whole attempt is bounded by
//! a timeout so a silent peer cannot hang the caller.

use std::time::Duration;

use crate::ws;

/// How a probe ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Handshake completed; the test connection was closed again.
    Connected,
    /// The peer dropped the stream before the handshake completed.
    Closed(String),
    /// Any other connect failure.
    Failed(String),
    /// Nothing happened within the timeout.
    TimedOut,
}

impl ProbeOutcome {
    /// Whether the server accepted the connection.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Try one connection to `url` within `timeout`.
pub async fn probe(url: &str, timeout: Duration) -> ProbeOutcome {
    log::debug!("[Probe] Testing connection to {}", url);

    let result = match tokio::time::timeout(timeout, ws::connect(url)).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("[Probe] No response from {} within {}ms", url, timeout.as_millis());
            return ProbeOutcome::TimedOut;
        }
    };

    match result {
        Ok((mut writer, _reader)) => {
            if let Err(e) = writer.close().await {
                log::debug!("[Probe] Close after successful probe failed: {:#}", e);
            }
            log::info!("[Probe] Connection to {} successful", url);
            ProbeOutcome::Connected
        }
        Err(e) if ws::is_closed_before_open(&e) => {
            log::warn!("[Probe] Connection to {} closed: {:#}", url, e);
            ProbeOutcome::Closed(format!("{e:#}"))
        }
        Err(e) => {
            log::warn!("[Probe] Connection to {} failed: {:#}", url, e);
            ProbeOutcome::Failed(format!("{e:#}"))
        }
    }
}
