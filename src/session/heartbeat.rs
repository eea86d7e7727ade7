//! Ping/pong liveness tracking for an open session.
//!
//! Pure bookkeeping: the session loop owns the timers and asks [`Heartbeat`]
//! when the pong deadline is, and whether a ping is due. Keeping the clock
//! outside makes the transitions testable with plain `Instant`s.

use std::time::Duration;

use tokio::time::Instant;

/// What the session loop should do when the heartbeat ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatTick {
    /// Send a ping; the pong deadline is now armed.
    SendPing,
    /// A ping is already outstanding; keep waiting on its deadline.
    AwaitingPong,
}

/// Heartbeat state for one open transport.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    pong_timeout: Duration,
    /// Set while a ping is outstanding.
    pong_deadline: Option<Instant>,
}

impl Heartbeat {
    pub(crate) fn new(pong_timeout: Duration) -> Self {
        Self {
            pong_timeout,
            pong_deadline: None,
        }
    }

    /// Interval tick at `now`.
    pub(crate) fn on_tick(&mut self, now: Instant) -> HeartbeatTick {
        if self.pong_deadline.is_some() {
            return HeartbeatTick::AwaitingPong;
        }
        self.pong_deadline = Some(now + self.pong_timeout);
        HeartbeatTick::SendPing
    }

    /// A pong arrived; disarm the deadline.
    pub(crate) fn on_pong(&mut self) {
        self.pong_deadline = None;
    }

    /// When the outstanding ping times out, if any.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.pong_deadline
    }

    /// Whether the outstanding ping went unanswered past its deadline.
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.pong_deadline.is_some_and(|deadline| now >= deadline)
    }
}
