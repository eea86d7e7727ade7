//! Connector-wide constants.
//!
//! Defaults for the session state machine and the connection probe. Every
//! value here can be overridden at runtime through [`crate::config::SessionConfig`].

use std::time::Duration;

// ============================================================================
// Heartbeat
// ============================================================================

/// Interval between transport-level pings while a session is open.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// How long to wait for a pong after each ping before the transport is
/// considered half-open and terminated.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Reconnection
// ============================================================================

/// Fixed delay before each reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// Reconnect attempts allowed after consecutive abnormal closes.
///
/// The counter resets on every successful open.
pub const MAX_RETRIES: u32 = 10;

// ============================================================================
// Probe
// ============================================================================

/// Upper bound on a one-shot connection test.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Wire protocol
// ============================================================================

/// Tag id that turns a read into a full cache snapshot.
pub const WILDCARD_TAG: &str = "#";

/// Separator between path and name in the wire form of a tag key.
pub const TAG_KEY_SEPARATOR: char = '/';
