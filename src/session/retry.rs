//! Bounded reconnect budget.

/// Counts reconnect attempts since the last successful open.
#[derive(Debug, Clone)]
pub(crate) struct RetryBudget {
    max: u32,
    used: u32,
}

impl RetryBudget {
    pub(crate) fn new(max: u32) -> Self {
        Self { max, used: 0 }
    }

    /// Claim one reconnect attempt.
    ///
    /// Returns the 1-based attempt number, or `None` once the budget is spent.
    pub(crate) fn try_acquire(&mut self) -> Option<u32> {
        if self.used >= self.max {
            return None;
        }
        self.used += 1;
        Some(self.used)
    }

    /// Successful open or explicit re-trigger: start over.
    pub(crate) fn reset(&mut self) {
        self.used = 0;
    }

    #[cfg(test)]
    pub(crate) fn used(&self) -> u32 {
        self.used
    }

    pub(crate) fn max(&self) -> u32 {
        self.max
    }
}
