//! Bounded retry with exponential backoff.
//!
//! A [`RetryPolicy`] hands out a [`Backoff`] per operation: an iterator over
//! the delays to wait before each retry, ending when the budget is spent.
//! The monitor uses one for connect-checks (several retries) and one for
//! uploads (a single retry).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt (0 = attempt once).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay_ms: u32,

    /// Applied to the delay after each retry.
    pub multiplier: u32,

    /// Caps exponential growth.
    pub max_delay_ms: u32,
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 0,
            multiplier: 1,
            max_delay_ms: 0,
        }
    }

    /// A single retry after `delay_ms`.
    pub const fn once(delay_ms: u32) -> Self {
        Self {
            max_retries: 1,
            initial_delay_ms: delay_ms,
            multiplier: 1,
            max_delay_ms: delay_ms,
        }
    }

    /// Doubling delays starting at `initial_delay_ms`, capped at `max_delay_ms`.
    pub const fn exponential(max_retries: u32, initial_delay_ms: u32, max_delay_ms: u32) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            multiplier: 2,
            max_delay_ms,
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            retries: 0,
            next_delay_ms: self.initial_delay_ms.min(self.max_delay_ms),
        }
    }
}

/// Delays of one retried operation.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    retries: u32,
    next_delay_ms: u32,
}

impl Backoff {
    /// Retries handed out so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }
}

impl Iterator for Backoff {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.retries >= self.policy.max_retries {
            return None;
        }
        self.retries += 1;

        let delay = self.next_delay_ms;
        self.next_delay_ms = delay
            .saturating_mul(self.policy.multiplier)
            .min(self.policy.max_delay_ms);
        Some(delay)
    }
}
