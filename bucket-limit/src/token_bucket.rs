use std::ops::ControlFlow;
use std::time::Duration;

use super::Algorithm;
use super::ConfigError;
use super::Engine;
use super::NANOS_PER_SEC;
use super::Reason;
use super::config::validate;
use super::seconds;

/// A continuously refilling bucket.
///
/// Every identity starts with `capacity` tokens. Tokens are credited at `rate`
/// per second up to `capacity`, and each admitted request spends one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucket {
    capacity: f64,
    rate: f64,
}

/// Token bucket state of a single identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenState {
    tokens: f64,
    last_refill: u64,
}

impl TokenState {
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill(&self) -> u64 {
        self.last_refill
    }
}

impl Engine for TokenBucket {
    type State = TokenState;

    const ALGORITHM: Algorithm = Algorithm::Token;

    fn initial(&self, now: u64) -> TokenState {
        TokenState {
            tokens: self.capacity,
            last_refill: now,
        }
    }

    fn evaluate(&self, state: TokenState, now: u64) -> (ControlFlow<Reason>, TokenState) {
        let elapsed = now.saturating_sub(state.last_refill) as f64 / NANOS_PER_SEC;
        let available = (state.tokens + elapsed * self.rate).min(self.capacity);
        // Refill is credited whether or not we admit, so the clock can always advance.
        let last_refill = state.last_refill.max(now);

        if available < 1.0 {
            // A bucket that cannot hold a whole token never admits
            let retry_after = if self.capacity < 1.0 {
                Duration::MAX
            } else {
                seconds((1.0 - available) / self.rate)
            };
            (
                ControlFlow::Break(Reason::Overloaded {
                    retry_after,
                }),
                TokenState {
                    tokens: available,
                    last_refill,
                },
            )
        } else {
            (
                ControlFlow::Continue(()),
                TokenState {
                    tokens: available - 1.0,
                    last_refill,
                },
            )
        }
    }

    fn last_update(state: &TokenState) -> u64 {
        state.last_refill
    }

    fn recovery(&self) -> Duration {
        seconds(self.capacity / self.rate)
    }
}

impl TokenBucket {
    /// Creates a new `TokenBucket` engine.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The maximum number of tokens, i.e. the largest burst.
    /// * `rate` - Tokens credited per second.
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

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    const SECOND: u64 = 1_000_000_000;

    fn bucket(capacity: f64, rate: f64) -> TokenBucket {
        TokenBucket::new(capacity, rate).unwrap()
    }

    /// Runs `count` requests at `now`, returning how many were admitted.
    fn burst(rl: &TokenBucket, state: &mut TokenState, now: u64, count: usize) -> usize {
        let mut admitted = 0;
        for _ in 0..count {
            let (flow, next) = rl.evaluate(*state, now);
            *state = next;
            if flow.is_continue() {
                admitted += 1;
            }
        }
        admitted
    }

    #[test]
    fn it_enforces_limits_starting_full() {
        let rl = bucket(2.0, 1.0);
        let mut state = rl.initial(0);

        // Should be able to burst up to capacity immediately
        assert_eq!(burst(&rl, &mut state, 0, 2), 2);

        // Third request should fail (exhausted)
        let (flow, _) = rl.evaluate(state, 0);
        assert!(flow.is_break());
    }

    #[test]
    fn it_recovers_one_token_per_interval() {
        let rl = bucket(5.0, 1.0);
        let mut state = rl.initial(0);

        assert_eq!(burst(&rl, &mut state, 0, 5), 5);
        assert_eq!(burst(&rl, &mut state, 0, 1), 0);

        // One second later exactly one more request fits
        assert_eq!(burst(&rl, &mut state, SECOND, 1), 1);
        assert_eq!(burst(&rl, &mut state, SECOND, 1), 0);
    }

    #[test]
    fn it_never_refills_past_capacity() {
        let rl = bucket(3.0, 10.0);
        let mut state = rl.initial(0);
        let _ = burst(&rl, &mut state, 0, 1);

        // A long idle period refills to capacity, not beyond
        assert_eq!(burst(&rl, &mut state, 3600 * SECOND, 10), 3);
    }

    #[test]
    fn it_credits_partial_refill_across_rejections() {
        let rl = bucket(1.0, 1.0);
        let mut state = rl.initial(0);
        assert_eq!(burst(&rl, &mut state, 0, 1), 1);

        // Rejected at 0.5s, the half token is kept
        let (flow, next) = rl.evaluate(state, SECOND / 2);
        assert!(flow.is_break());
        assert_eq!(next.tokens(), 0.5);
        assert_eq!(next.last_refill(), SECOND / 2);

        // and completed by the remaining 0.5s
        let (flow, _) = rl.evaluate(next, SECOND);
        assert!(flow.is_continue());
    }

    #[test]
    fn it_never_hints_a_retry_below_one_token() {
        let rl = bucket(0.5, 1.0);
        let state = rl.initial(0);

        let (flow, state) = rl.evaluate(state, 0);
        assert_eq!(
            flow,
            ControlFlow::Break(Reason::Overloaded {
                retry_after: Duration::MAX
            })
        );

        // Waiting does not help
        let (flow, _) = rl.evaluate(state, 100 * SECOND);
        assert!(flow.is_break());
    }

    #[test]
    fn it_hints_time_until_next_token() {
        let rl = bucket(4.0, 2.0);
        let mut state = rl.initial(0);
        assert_eq!(burst(&rl, &mut state, 0, 4), 4);

        let (flow, _) = rl.evaluate(state, 0);
        assert_eq!(
            flow,
            ControlFlow::Break(Reason::Overloaded {
                retry_after: Duration::from_millis(500)
            })
        );
    }

    #[test]
    fn it_ignores_a_clock_moving_backwards() {
        let rl = bucket(2.0, 1.0);
        let mut state = rl.initial(10 * SECOND);
        assert_eq!(burst(&rl, &mut state, 10 * SECOND, 1), 1);

        // Earlier reading: no refill, no extra rejection, timestamp kept
        let (flow, next) = rl.evaluate(state, 5 * SECOND);
        assert!(flow.is_continue());
        assert_eq!(next.tokens(), 0.0);
        assert_eq!(next.last_refill(), 10 * SECOND);

        // Time lost to the anomaly is not credited afterwards either
        let (flow, _) = rl.evaluate(next, 10 * SECOND + SECOND / 2);
        assert!(flow.is_break());
    }

    #[test]
    fn it_rejects_invalid_parameters() {
        assert_eq!(
            TokenBucket::new(0.0, 1.0),
            Err(ConfigError::InvalidCapacity(0.0))
        );
        assert_eq!(
            TokenBucket::new(1.0, 0.0),
            Err(ConfigError::InvalidRate(0.0))
        );
    }

    #[test]
    fn it_recovers_after_capacity_over_rate() {
        assert_eq!(bucket(5.0, 2.0).recovery(), Duration::from_millis(2500));
    }

    proptest! {
        #[test]
        fn tokens_stay_within_bounds(
            capacity in 0.5f64..50.0,
            rate in 0.01f64..100.0,
            steps in prop::collection::vec((0u64..5 * SECOND, any::<bool>()), 1..200),
        ) {
            let rl = bucket(capacity, rate);
            let mut now = 10 * SECOND;
            let mut state = rl.initial(now);

            for (delta, backwards) in steps {
                now = if backwards { now.saturating_sub(delta) } else { now + delta };
                let (_, next) = rl.evaluate(state, now);
                prop_assert!(next.tokens() >= 0.0);
                prop_assert!(next.tokens() <= capacity);
                prop_assert!(next.last_refill() >= state.last_refill());
                state = next;
            }
        }

        #[test]
        fn earlier_readings_never_add_tokens(
            tokens_spent in 0usize..13,
            rewind in 1u64..100 * SECOND,
        ) {
            let rl = bucket(10.0, 1.0);
            let start = 100 * SECOND;
            let mut state = rl.initial(start);
            let _ = burst(&rl, &mut state, start, tokens_spent);

            let before = state.tokens();
            let (flow, next) = rl.evaluate(state, start - rewind);
            prop_assert_eq!(flow.is_continue(), before >= 1.0);
            prop_assert!(next.tokens() <= before);
        }
    }
}
