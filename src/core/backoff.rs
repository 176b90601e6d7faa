//! Purpose: Randomized truncated binary exponential backoff for rate-limited actions.
//! Exports: `BackoffPolicy`, `Backoff`.
//! Role: Per-call wait schedule used by the action executor's retry loop.
//! Invariants: The bound starts at 1 and doubles per step, never above the ceiling.
//! Invariants: Each wait is drawn uniformly from `[0, bound)` units.

use std::time::Duration;

pub const DEFAULT_CEILING: u64 = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    ceiling: u64,
    unit: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CEILING,
            unit: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// Ceiling is clamped to at least 1.
    pub fn with_ceiling(mut self, ceiling: u64) -> Self {
        self.ceiling = ceiling.max(1);
        self
    }

    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn unit(&self) -> Duration {
        self.unit
    }

    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            bound: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    bound: u64,
}

impl Backoff {
    pub fn bound(&self) -> u64 {
        self.bound
    }

    /// Doubles the bound (truncated at the ceiling) and picks the next wait.
    pub fn next_wait(&mut self) -> Duration {
        if self.bound < self.policy.ceiling {
            self.bound = self.bound.saturating_mul(2).min(self.policy.ceiling);
        }
        let steps = random_below(self.bound);
        self.policy
            .unit
            .saturating_mul(u32::try_from(steps).unwrap_or(u32::MAX))
    }
}

fn random_below(bound: u64) -> u64 {
    if bound <= 1 {
        return 0;
    }
    let mut bytes = [0u8; 8];
    match getrandom::fill(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes) % bound,
        Err(err) => {
            tracing::debug!("entropy source unavailable, using midpoint wait: {err}");
            bound / 2
        }
    }
}
