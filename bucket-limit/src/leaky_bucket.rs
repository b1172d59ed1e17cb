use std::ops::ControlFlow;
use std::time::Duration;

use super::Algorithm;
use super::ConfigError;
use super::Engine;
use super::NANOS_PER_SEC;
use super::Reason;
use super::config::validate;
use super::seconds;

/// A continuously draining bucket.
///
/// Each admitted request pours one unit of water in, and water leaks out at
/// `rate` units per second. A request is rejected if it would overflow
/// `capacity`. Draining carries on regardless of admission, so the drained
/// level is stored on rejection too.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakyBucket {
    capacity: f64,
    rate: f64,
}

/// Leaky bucket state of a single identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakyState {
    level: f64,
    last_checked: u64,
}

impl LeakyState {
    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn last_checked(&self) -> u64 {
        self.last_checked
    }
}

impl Engine for LeakyBucket {
    type State = LeakyState;

    const ALGORITHM: Algorithm = Algorithm::Leaky;

    fn initial(&self, now: u64) -> LeakyState {
        LeakyState {
            level: 0.0,
            last_checked: now,
        }
    }

    fn evaluate(&self, state: LeakyState, now: u64) -> (ControlFlow<Reason>, LeakyState) {
        let elapsed = now.saturating_sub(state.last_checked) as f64 / NANOS_PER_SEC;
        let level = (state.level - elapsed * self.rate).max(0.0);
        let last_checked = state.last_checked.max(now);

        if level + 1.0 > self.capacity {
            let retry_after = if self.capacity < 1.0 {
                Duration::MAX
            } else {
                seconds((level + 1.0 - self.capacity) / self.rate)
            };
            (
                ControlFlow::Break(Reason::Overloaded {
                    retry_after,
                }),
                LeakyState {
                    level,
                    last_checked,
                },
            )
        } else {
            (
                ControlFlow::Continue(()),
                LeakyState {
                    level: level + 1.0,
                    last_checked,
                },
            )
        }
    }

    fn last_update(state: &LeakyState) -> u64 {
        state.last_checked
    }

    fn recovery(&self) -> Duration {
        seconds(self.capacity / self.rate)
    }
}

impl LeakyBucket {
    /// Creates a new `LeakyBucket` engine.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The most water the bucket holds, i.e. the largest burst.
    /// * `rate` - Units drained per second.
    pub fn new(capacity: f64, rate: f64) -> Result<Self, ConfigError> {
        validate(capacity, rate)?;
        Ok(Self::from_validated(capacity, rate))
    }

    pub(crate) fn from_validated(capacity: f64, rate: f64) -> Self {
        Self { capacity, rate }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}
